//! Retry policy: bounded attempts with backoff, jitter, a retriability
//! predicate, and a pluggable sleeper.
//!
//! The retry layer is the outermost policy, so it only ever observes
//! post-circuit, post-timeout results. Breaker rejections and timed-out
//! attempts are terminal here.

use crate::backoff::Backoff;
use crate::error::PublishError;
use crate::jitter::Jitter;
use crate::telemetry::{NullSink, TelemetryEvent, TelemetrySink};
use crate::time::{Sleeper, TokioSleeper};
use crate::transport::categorize;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Total attempts for a publish: the first call plus three retries.
pub const MAX_ATTEMPTS: usize = 4;

#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    should_retry: Arc<dyn Fn(&PublishError) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
    sink: Arc<dyn TelemetrySink>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("max_attempts must be > 0 (got {0})")]
    InvalidMaxAttempts(usize),
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    pub async fn execute<T, Fut, Op>(&self, mut operation: Op) -> Result<T, PublishError>
    where
        T: Send,
        Fut: Future<Output = Result<T, PublishError>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        for attempt in 0..self.max_attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !(self.should_retry)(&err) {
                        return Err(err);
                    }
                    if attempt + 1 >= self.max_attempts {
                        return Err(PublishError::RetryExhausted {
                            attempts: self.max_attempts,
                            last: Box::new(err),
                        });
                    }

                    // delay() is 1-indexed by retry number.
                    let delay = self.jitter.apply(self.backoff.delay(attempt + 1));
                    let (error_type, _) = categorize(&err);
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "publish attempt failed, retrying"
                    );
                    self.sink.record(TelemetryEvent::Retry {
                        error_type,
                        attempt: attempt + 1,
                        delay,
                    });
                    self.sleeper.sleep(delay).await;
                }
            }
        }

        unreachable!("retry loop returns before exhausting its attempts")
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::builder().build()
    }
}

pub struct RetryPolicyBuilder {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    should_retry: Arc<dyn Fn(&PublishError) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
    sink: Arc<dyn TelemetrySink>,
}

impl std::fmt::Debug for RetryPolicyBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicyBuilder")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .finish()
    }
}

impl RetryPolicyBuilder {
    pub fn new() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff: Backoff::publish_default(),
            jitter: Jitter::None,
            should_retry: Arc::new(PublishError::is_retriable),
            sleeper: Arc::new(TokioSleeper),
            sink: Arc::new(NullSink),
        }
    }

    pub fn max_attempts(mut self, attempts: usize) -> Result<Self, BuildError> {
        if attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(attempts));
        }
        self.max_attempts = attempts;
        Ok(self)
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&PublishError) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn with_sink(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            jitter: self.jitter,
            should_retry: self.should_retry,
            sleeper: self.sleeper,
            sink: self.sink,
        }
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
