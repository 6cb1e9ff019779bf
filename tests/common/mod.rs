//! Shared fakes for the integration suite.

use async_trait::async_trait;
use fanout::{MessageId, Transport, TransportError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

static INIT: Once = Once::new();

/// Install a test subscriber once so failures come with log context.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// Transport that fails every `period`-th publish call with the supplied
/// error constructor and succeeds otherwise.
pub struct FlakyTransport {
    calls: AtomicUsize,
    period: usize,
    error: fn() -> TransportError,
}

impl FlakyTransport {
    pub fn new(period: usize, error: fn() -> TransportError) -> Self {
        Self { calls: AtomicUsize::new(0), period, error }
    }

    /// Transport that never fails.
    pub fn reliable() -> Self {
        Self::new(usize::MAX, || TransportError::Other("unused".into()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn publish(&self, _topic: &str, _payload: &str) -> Result<MessageId, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.period != usize::MAX && call % self.period == 0 {
            Err((self.error)())
        } else {
            Ok(MessageId::new(format!("m-{call}")))
        }
    }

    async fn describe_topic(&self, _topic: &str) -> Result<(), TransportError> {
        Ok(())
    }
}
