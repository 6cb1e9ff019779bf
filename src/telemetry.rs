//! Telemetry events and sinks.
//!
//! Policies and the fan-out engine describe what happened as typed
//! [`TelemetryEvent`]s; a [`TelemetrySink`] decides where those events go.
//! Recording is synchronous and infallible by contract: it runs inline on
//! the publish path, so a sink that can fail or block internally must deal
//! with that itself rather than surface it to the caller.

use crate::circuit_breaker::CircuitState;
use crate::outcome::ErrorKind;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Everything the pipeline reports about itself, as one event vocabulary.
///
/// Counter-shaped events carry their tags inline; histogram-shaped events
/// carry the observed duration. [`TelemetryEvent::metric_name`] gives the
/// exported name for each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    /// A publish call entered the resilience stack.
    PublishAttempt,
    /// Terminal publish success; `duration` feeds `sns_publish_duration`.
    PublishSuccess { duration: Duration },
    /// Terminal publish failure, tagged with the categorized kind;
    /// `duration` feeds `sns_publish_duration`.
    PublishFailure { error_type: ErrorKind, duration: Duration },
    /// A retry is about to run after the given backoff delay.
    Retry { error_type: ErrorKind, attempt: usize, delay: Duration },
    /// A physical attempt hit the per-attempt deadline.
    TimeoutExpired,
    /// The circuit breaker changed state.
    CircuitStateChange { state: CircuitState },
    /// Records fetched from the data source.
    ItemsRetrieved { count: usize },
    /// Messages produced by the transformer.
    ItemsTransformed { count: usize },
    /// Aggregate outcome of one fan-out run.
    PublishStats { success_count: usize, failure_count: usize },
    /// Producer wait accumulated while the channel was full.
    Backpressure { total: Duration },
    /// End-to-end pipeline wall time.
    TotalProcessingTime { duration: Duration },
}

impl TelemetryEvent {
    /// Exported metric name for this event.
    pub fn metric_name(&self) -> &'static str {
        match self {
            TelemetryEvent::PublishAttempt => "sns_publish_attempts",
            TelemetryEvent::PublishSuccess { .. } => "sns_publish_successes",
            TelemetryEvent::PublishFailure { .. } => "sns_publish_failures",
            TelemetryEvent::Retry { .. } => "sns_retries",
            TelemetryEvent::TimeoutExpired => "sns_timeouts",
            TelemetryEvent::CircuitStateChange { .. } => "circuit_breaker_state_changes",
            TelemetryEvent::ItemsRetrieved { .. } => "data_items_retrieved",
            TelemetryEvent::ItemsTransformed { .. } => "data_items_transformed",
            TelemetryEvent::PublishStats { .. } => "publish_stats",
            TelemetryEvent::Backpressure { .. } => "channel_backpressure_time",
            TelemetryEvent::TotalProcessingTime { .. } => "total_processing_time",
        }
    }
}

impl fmt::Display for TelemetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEvent::PublishAttempt => write!(f, "sns_publish_attempts"),
            TelemetryEvent::PublishSuccess { duration } => {
                write!(f, "sns_publish_successes(duration={:?})", duration)
            }
            TelemetryEvent::PublishFailure { error_type, duration } => {
                write!(f, "sns_publish_failures(error_type={}, duration={:?})", error_type, duration)
            }
            TelemetryEvent::Retry { error_type, attempt, delay } => {
                write!(f, "sns_retries(error_type={}, attempt={}, delay={:?})", error_type, attempt, delay)
            }
            TelemetryEvent::TimeoutExpired => write!(f, "sns_timeouts"),
            TelemetryEvent::CircuitStateChange { state } => {
                write!(f, "circuit_breaker_state_changes(state={})", state)
            }
            TelemetryEvent::ItemsRetrieved { count } => {
                write!(f, "data_items_retrieved(count={})", count)
            }
            TelemetryEvent::ItemsTransformed { count } => {
                write!(f, "data_items_transformed(count={})", count)
            }
            TelemetryEvent::PublishStats { success_count, failure_count } => {
                write!(f, "publish_stats(success={}, failure={})", success_count, failure_count)
            }
            TelemetryEvent::Backpressure { total } => {
                write!(f, "channel_backpressure_time(total={:?})", total)
            }
            TelemetryEvent::TotalProcessingTime { duration } => {
                write!(f, "total_processing_time(duration={:?})", duration)
            }
        }
    }
}

/// Where events go. Policies hold sinks as `Arc<dyn TelemetrySink>`, so one
/// sink instance can serve a whole publisher stack.
pub trait TelemetrySink: Send + Sync + fmt::Debug {
    fn record(&self, event: TelemetryEvent);
}

impl<S: TelemetrySink + ?Sized> TelemetrySink for Arc<S> {
    fn record(&self, event: TelemetryEvent) {
        (**self).record(event)
    }
}

/// Discards all events. The default everywhere a sink is not wired.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn record(&self, _event: TelemetryEvent) {}
}

/// Forwards every event to `tracing` at info level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn record(&self, event: TelemetryEvent) {
        tracing::info!(metric = event.metric_name(), event = %event, "telemetry");
    }
}

/// Keeps every event in memory; clones share the same buffer. Mostly for
/// tests asserting what a run emitted.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, in emission order.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Number of recorded events exported under `metric_name`.
    pub fn count(&self, metric_name: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|e| e.metric_name() == metric_name)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clear();
    }
}

impl TelemetrySink for MemorySink {
    fn record(&self, event: TelemetryEvent) {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_records_and_counts_events() {
        let sink = MemorySink::new();
        sink.record(TelemetryEvent::PublishAttempt);
        sink.record(TelemetryEvent::PublishAttempt);
        sink.record(TelemetryEvent::TimeoutExpired);

        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.count("sns_publish_attempts"), 2);
        assert_eq!(sink.count("sns_timeouts"), 1);
        assert_eq!(sink.count("sns_retries"), 0);
    }

    #[test]
    fn memory_sink_clones_share_one_buffer() {
        let sink = MemorySink::new();
        let clone = sink.clone();
        clone.record(TelemetryEvent::ItemsRetrieved { count: 5 });

        assert_eq!(sink.count("data_items_retrieved"), 1);
        sink.clear();
        assert!(clone.events().is_empty());
    }

    #[test]
    fn sinks_work_behind_an_arc() {
        let memory = MemorySink::new();
        let shared: Arc<dyn TelemetrySink> = Arc::new(memory.clone());
        shared.record(TelemetryEvent::PublishAttempt);
        assert_eq!(memory.count("sns_publish_attempts"), 1);

        let null: Arc<dyn TelemetrySink> = Arc::new(NullSink);
        null.record(TelemetryEvent::TimeoutExpired);
    }

    #[test]
    fn metric_names_match_the_exported_surface() {
        assert_eq!(TelemetryEvent::PublishAttempt.metric_name(), "sns_publish_attempts");
        assert_eq!(
            TelemetryEvent::PublishSuccess { duration: Duration::ZERO }.metric_name(),
            "sns_publish_successes"
        );
        assert_eq!(
            TelemetryEvent::PublishFailure {
                error_type: ErrorKind::Throttling,
                duration: Duration::ZERO
            }
            .metric_name(),
            "sns_publish_failures"
        );
        assert_eq!(
            TelemetryEvent::CircuitStateChange { state: CircuitState::Open }.metric_name(),
            "circuit_breaker_state_changes"
        );
        assert_eq!(
            TelemetryEvent::Backpressure { total: Duration::ZERO }.metric_name(),
            "channel_backpressure_time"
        );
    }
}
