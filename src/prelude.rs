//! Convenient re-exports for common fanout types.
pub use crate::{
    backoff::Backoff,
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState},
    config::AppConfig,
    engine::{FanOutEngine, PublishStats},
    error::PublishError,
    handler::Handler,
    jitter::Jitter,
    outcome::{ErrorKind, Message, MessageId, Outcome},
    pipeline::{Pipeline, PipelineError, RecordSource, Transformer},
    publisher::{MessagePublisher, ResilientPublisher},
    retry::RetryPolicy,
    telemetry::{LogSink, MemorySink, NullSink, TelemetryEvent, TelemetrySink},
    timeout::TimeoutPolicy,
    transport::{Transport, TransportError},
};
