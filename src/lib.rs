#![forbid(unsafe_code)]

//! # fanout
//!
//! Resilient fan-out publishing for pub/sub topics: a batch pipeline that
//! fetches records, transforms them into wire messages, and drains them
//! through a pool of workers, each publishing via a composed resilience
//! stack.
//!
//! ## Features
//!
//! - **Resilient publisher**: retry with exponential backoff, circuit
//!   breaker, and per-attempt timeout, composed as
//!   `retry(breaker(timeout(publish)))`
//! - **Categorized outcomes**: every publish returns an [`Outcome`] with a
//!   stable [`ErrorKind`], never a raw transport error
//! - **Bounded fan-out**: a producer/consumer channel with measured
//!   backpressure and partial-failure accounting across workers
//! - **Telemetry sinks**: a typed event vocabulary recorded through a small
//!   sink trait, with null/log/memory sinks included
//!
//! ## Quick Start
//!
//! ```rust
//! use async_trait::async_trait;
//! use fanout::{
//!     FanOutEngine, Message, MessageId, ResilientPublisher, Transport, TransportError,
//! };
//!
//! struct StdoutTransport;
//!
//! #[async_trait]
//! impl Transport for StdoutTransport {
//!     async fn publish(&self, topic: &str, payload: &str) -> Result<MessageId, TransportError> {
//!         println!("{topic}: {payload}");
//!         Ok(MessageId::new("m-1"))
//!     }
//!
//!     async fn describe_topic(&self, _topic: &str) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let publisher = ResilientPublisher::new(
//!         StdoutTransport,
//!         "arn:aws:sns:us-east-1:123456789012:orders",
//!     );
//!     let engine = FanOutEngine::new(publisher);
//!
//!     let stats = engine.run(vec![Message::new("hello")]).await;
//!     assert_eq!(stats.success_count, 1);
//! }
//! ```

mod backoff;
mod circuit_breaker;
mod config;
mod engine;
mod error;
mod handler;
mod jitter;
mod outcome;
mod pipeline;
mod publisher;
mod retry;
pub mod telemetry;
mod time;
mod timeout;
mod transport;

// Re-exports
pub use backoff::Backoff;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, FAILURE_THRESHOLD, RECOVERY_TIMEOUT,
};
pub use config::{AppConfig, ConfigError};
pub use engine::{
    FanOutEngine, PublishStats, BACKPRESSURE_FLOOR, CHANNEL_CAPACITY, MAX_WORKERS,
    MESSAGES_PER_WORKER,
};
pub use error::PublishError;
pub use handler::Handler;
pub use jitter::Jitter;
pub use outcome::{BoxError, ErrorKind, Message, MessageId, Outcome};
pub use pipeline::{Pipeline, PipelineError, RecordSource, Transformer};
pub use publisher::{MessagePublisher, ResilientPublisher, ResilientPublisherBuilder};
pub use retry::{BuildError, RetryPolicy, RetryPolicyBuilder, MAX_ATTEMPTS};
pub use telemetry::{LogSink, MemorySink, NullSink, TelemetryEvent, TelemetrySink};
pub use time::{Clock, InstantSleeper, MonotonicClock, Sleeper, TokioSleeper, TrackingSleeper};
pub use timeout::{TimeoutError, TimeoutPolicy, PUBLISH_TIMEOUT};
pub use transport::{categorize, Transport, TransportError};

pub mod prelude;
