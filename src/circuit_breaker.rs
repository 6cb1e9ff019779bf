//! Circuit breaker with lock-free atomics.
//!
//! Sits between the retry layer and the per-attempt timeout, so a trip
//! short-circuits the remaining retries immediately. Only the transient
//! transport failures advance the consecutive-failure count; invalid input
//! and authorization errors never trip the breaker.

use crate::error::PublishError;
use crate::telemetry::{NullSink, TelemetryEvent, TelemetrySink};
use crate::time::{Clock, MonotonicClock};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Consecutive counted failures required to open the circuit.
pub const FAILURE_THRESHOLD: usize = 10;
/// How long the circuit stays open before permitting a probe.
pub const RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Label exported on `circuit_breaker_state_changes{state}`.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: FAILURE_THRESHOLD, recovery_timeout: RECOVERY_TIMEOUT }
    }
}

struct Shared {
    state: AtomicU8,
    consecutive_failures: AtomicUsize,
    opened_at_millis: AtomicU64,
    half_open_calls: AtomicUsize,
}

/// Shared-by-clone circuit breaker; all clones observe the same circuit.
#[derive(Clone)]
pub struct CircuitBreaker {
    shared: Arc<Shared>,
    config: CircuitBreakerConfig,
    counts_failure: Arc<dyn Fn(&PublishError) -> bool + Send + Sync>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn TelemetrySink>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state())
            .field("consecutive_failures", &self.consecutive_failures())
            .field("failure_threshold", &self.config.failure_threshold)
            .field("recovery_timeout", &self.config.recovery_timeout)
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(STATE_CLOSED),
                consecutive_failures: AtomicUsize::new(0),
                opened_at_millis: AtomicU64::new(0),
                half_open_calls: AtomicUsize::new(0),
            }),
            config,
            counts_failure: Arc::new(PublishError::is_retriable),
            clock: Arc::new(MonotonicClock::default()),
            sink: Arc::new(NullSink),
        }
    }

    /// Route state-change events to `sink`.
    pub fn with_sink(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Override the clock (deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Override which failures advance the consecutive-failure count.
    pub fn with_counted_failures<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&PublishError) -> bool + Send + Sync + 'static,
    {
        self.counts_failure = Arc::new(predicate);
        self
    }

    pub fn state(&self) -> CircuitState {
        match self.shared.state.load(Ordering::Acquire) {
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub fn consecutive_failures(&self) -> usize {
        self.shared.consecutive_failures.load(Ordering::Acquire)
    }

    fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    pub async fn execute<T, Fut, Op>(&self, mut operation: Op) -> Result<T, PublishError>
    where
        T: Send,
        Fut: Future<Output = Result<T, PublishError>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        // Admission control: decide whether this call may proceed.
        loop {
            match self.shared.state.load(Ordering::Acquire) {
                STATE_OPEN => {
                    let opened_at = self.shared.opened_at_millis.load(Ordering::Acquire);
                    let elapsed = self.now_millis().saturating_sub(opened_at);

                    if elapsed >= self.config.recovery_timeout.as_millis() as u64 {
                        match self.shared.state.compare_exchange(
                            STATE_OPEN,
                            STATE_HALF_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        ) {
                            Ok(_) => {
                                // We won the race: this call is the probe.
                                self.shared.half_open_calls.store(1, Ordering::Release);
                                tracing::info!("circuit breaker: open -> half-open");
                                self.sink.record(TelemetryEvent::CircuitStateChange {
                                    state: CircuitState::HalfOpen,
                                });
                                break;
                            }
                            Err(STATE_HALF_OPEN) => continue,
                            Err(STATE_CLOSED) => break,
                            Err(_) => unreachable!("invalid circuit state"),
                        }
                    } else {
                        return Err(PublishError::CircuitOpen {
                            failure_count: self.consecutive_failures(),
                        });
                    }
                }
                STATE_HALF_OPEN => {
                    // Exactly one probe is permitted.
                    let in_flight = self.shared.half_open_calls.fetch_add(1, Ordering::AcqRel);
                    if in_flight >= 1 {
                        self.shared.half_open_calls.fetch_sub(1, Ordering::Release);
                        return Err(PublishError::CircuitOpen {
                            failure_count: self.consecutive_failures(),
                        });
                    }
                    break;
                }
                _ => break,
            }
        }

        let was_half_open = self.shared.state.load(Ordering::Acquire) == STATE_HALF_OPEN;
        let result = operation().await;

        if was_half_open {
            self.shared.half_open_calls.fetch_sub(1, Ordering::Release);
        }

        match &result {
            Ok(_) => self.on_success(),
            Err(err) => self.on_failure(err),
        }

        result
    }

    fn on_success(&self) {
        match self.shared.state.load(Ordering::Acquire) {
            STATE_HALF_OPEN => {
                if self
                    .shared
                    .state
                    .compare_exchange(
                        STATE_HALF_OPEN,
                        STATE_CLOSED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.shared.consecutive_failures.store(0, Ordering::Release);
                    self.shared.opened_at_millis.store(0, Ordering::Release);
                    tracing::info!("circuit breaker: half-open -> closed");
                    self.sink.record(TelemetryEvent::CircuitStateChange {
                        state: CircuitState::Closed,
                    });
                }
            }
            STATE_CLOSED => {
                self.shared.consecutive_failures.store(0, Ordering::Release);
            }
            _ => {}
        }
    }

    fn on_failure(&self, error: &PublishError) {
        match self.shared.state.load(Ordering::Acquire) {
            STATE_HALF_OPEN => {
                // Any probe failure reopens the circuit with a fresh window.
                if self
                    .shared
                    .state
                    .compare_exchange(
                        STATE_HALF_OPEN,
                        STATE_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.shared.opened_at_millis.store(self.now_millis(), Ordering::Release);
                    tracing::warn!(error = %error, "circuit breaker: probe failed -> open");
                    self.sink.record(TelemetryEvent::CircuitStateChange {
                        state: CircuitState::Open,
                    });
                }
            }
            STATE_CLOSED => {
                if !(self.counts_failure)(error) {
                    return;
                }
                let failures =
                    self.shared.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold
                    && self
                        .shared
                        .state
                        .compare_exchange(
                            STATE_CLOSED,
                            STATE_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                {
                    self.shared.opened_at_millis.store(self.now_millis(), Ordering::Release);
                    tracing::error!(
                        failures,
                        threshold = self.config.failure_threshold,
                        "circuit breaker: closed -> open"
                    );
                    self.sink.record(TelemetryEvent::CircuitStateChange {
                        state: CircuitState::Open,
                    });
                }
            }
            _ => {}
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
