//! Per-attempt timeout for transport calls.
//!
//! Each physical publish attempt is bounded independently; the retry layer
//! treats an expired attempt as terminal. On expiry the inner future is
//! dropped, not aborted, so transport implementations should be
//! cancellation-safe.

use crate::error::PublishError;
use crate::telemetry::{NullSink, TelemetryEvent, TelemetrySink};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Deadline for one physical transport call.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutError {
    #[error("timeout duration must be > 0")]
    ZeroDuration,
}

#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    duration: Duration,
    sink: Arc<dyn TelemetrySink>,
}

impl TimeoutPolicy {
    pub fn new(duration: Duration) -> Result<Self, TimeoutError> {
        if duration.is_zero() {
            return Err(TimeoutError::ZeroDuration);
        }
        Ok(Self { duration, sink: Arc::new(NullSink) })
    }

    /// Route `sns_timeouts` events to `sink`.
    pub fn with_sink(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub async fn execute<T, Fut, Op>(&self, operation: Op) -> Result<T, PublishError>
    where
        T: Send,
        Fut: Future<Output = Result<T, PublishError>> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        let start = Instant::now();

        match tokio::time::timeout(self.duration, operation()).await {
            Ok(result) => result,
            Err(_) => {
                let elapsed = start.elapsed();
                self.sink.record(TelemetryEvent::TimeoutExpired);
                Err(PublishError::Timeout { elapsed, timeout: self.duration })
            }
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self { duration: PUBLISH_TIMEOUT, sink: Arc::new(NullSink) }
    }
}
