//! The resilient publisher: one message in, one categorized outcome out.
//!
//! Composition order is load-bearing:
//!
//! ```text
//! retry( circuit_breaker( timeout( transport.publish ) ) )
//! ```
//!
//! The timeout bounds each physical attempt, the breaker observes every
//! attempt (so a trip short-circuits the remaining retries), and the retry
//! layer only re-runs failures from the transient transport set.

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::PublishError;
use crate::outcome::{ErrorKind, Message, MessageId, Outcome};
use crate::retry::RetryPolicy;
use crate::telemetry::{NullSink, TelemetryEvent, TelemetrySink};
use crate::timeout::TimeoutPolicy;
use crate::transport::{categorize, Transport};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Capability consumed by the fan-out engine.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, message: &Message) -> Outcome<MessageId>;
}

pub struct ResilientPublisher<T> {
    transport: Arc<T>,
    topic: String,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    timeout: TimeoutPolicy,
    sink: Arc<dyn TelemetrySink>,
}

impl<T: Transport> ResilientPublisher<T> {
    /// Publisher with the stock policy stack: 4 attempts on the 200/400/800 ms
    /// schedule, a 10-failure/30 s breaker, and a 5 s per-attempt deadline.
    pub fn new(transport: T, topic: impl Into<String>) -> Self {
        Self::builder(transport, topic).build()
    }

    pub fn builder(transport: T, topic: impl Into<String>) -> ResilientPublisherBuilder<T> {
        ResilientPublisherBuilder {
            transport,
            topic: topic.into(),
            sink: Arc::new(NullSink),
            retry: None,
            breaker: None,
            timeout: None,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish one message, returning a categorized outcome.
    ///
    /// Blank messages are rejected up front: no transport call, no retry
    /// slot, no breaker effect.
    pub async fn publish(&self, message: &Message) -> Outcome<MessageId> {
        if message.is_blank() {
            tracing::warn!(topic = %self.topic, "rejected blank message");
            return Outcome::failure(ErrorKind::InvalidInput, "Message cannot be null or empty");
        }

        let span = tracing::info_span!(
            "SnsPublish",
            messaging.system = "sns",
            messaging.destination = %self.topic,
            sns.message_size = message.len(),
            sns.message_id = tracing::field::Empty,
            otel.status_code = tracing::field::Empty,
            error.r#type = tracing::field::Empty,
            error.message = tracing::field::Empty,
        );

        async {
            self.sink.record(TelemetryEvent::PublishAttempt);
            let start = Instant::now();
            let result = self.execute_stack(message).await;
            let duration = start.elapsed();

            match result {
                Ok(id) => {
                    let span = tracing::Span::current();
                    span.record("sns.message_id", tracing::field::display(&id));
                    tracing::debug!(
                        message_id = %id,
                        duration_ms = duration.as_millis() as u64,
                        "published"
                    );
                    self.sink.record(TelemetryEvent::PublishSuccess { duration });
                    Outcome::success(id)
                }
                Err(err) => {
                    let (kind, detail) = categorize(&err);
                    let span = tracing::Span::current();
                    span.record("otel.status_code", "ERROR");
                    span.record("error.type", kind.as_str());
                    span.record("error.message", detail.as_str());
                    tracing::warn!(
                        error_type = %kind,
                        detail = %detail,
                        duration_ms = duration.as_millis() as u64,
                        "publish failed"
                    );
                    self.sink.record(TelemetryEvent::PublishFailure {
                        error_type: kind,
                        duration,
                    });
                    Outcome::failure_with_cause(kind, detail, Box::new(err))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute_stack(&self, message: &Message) -> Result<MessageId, PublishError> {
        // Each layer clones what the one beneath it needs, building from the
        // inside out: retry -> breaker -> timeout -> transport.
        let transport = Arc::clone(&self.transport);
        let topic: Arc<str> = Arc::from(self.topic.as_str());
        let payload: Arc<str> = Arc::from(message.payload());
        let breaker = self.breaker.clone();
        let timeout = self.timeout.clone();

        self.retry
            .execute(move || {
                let transport = Arc::clone(&transport);
                let topic = Arc::clone(&topic);
                let payload = Arc::clone(&payload);
                let breaker = breaker.clone();
                let timeout = timeout.clone();
                async move {
                    breaker
                        .execute(move || {
                            let transport = Arc::clone(&transport);
                            let topic = Arc::clone(&topic);
                            let payload = Arc::clone(&payload);
                            let timeout = timeout.clone();
                            async move {
                                timeout
                                    .execute(move || async move {
                                        transport
                                            .publish(&topic, &payload)
                                            .await
                                            .map_err(PublishError::from)
                                    })
                                    .await
                            }
                        })
                        .await
                }
            })
            .await
    }

    /// Health probe: a direct topic-metadata lookup, deliberately outside the
    /// resilience stack.
    pub async fn is_healthy(&self) -> bool {
        match self.transport.describe_topic(&self.topic).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(topic = %self.topic, error = %err, "health probe failed");
                false
            }
        }
    }
}

pub struct ResilientPublisherBuilder<T> {
    transport: T,
    topic: String,
    sink: Arc<dyn TelemetrySink>,
    retry: Option<RetryPolicy>,
    breaker: Option<CircuitBreaker>,
    timeout: Option<TimeoutPolicy>,
}

impl<T: Transport> ResilientPublisherBuilder<T> {
    /// Route telemetry from the default-built policies to `sink`. A policy
    /// supplied explicitly keeps whatever sink it was built with.
    pub fn sink(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn timeout(mut self, timeout: TimeoutPolicy) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> ResilientPublisher<T> {
        ResilientPublisher {
            transport: Arc::new(self.transport),
            topic: self.topic,
            retry: self.retry.unwrap_or_else(|| {
                RetryPolicy::builder().with_sink(Arc::clone(&self.sink)).build()
            }),
            breaker: self.breaker.unwrap_or_else(|| {
                CircuitBreaker::new(CircuitBreakerConfig::default())
                    .with_sink(Arc::clone(&self.sink))
            }),
            timeout: self.timeout.unwrap_or_else(|| {
                TimeoutPolicy::default().with_sink(Arc::clone(&self.sink))
            }),
            sink: self.sink,
        }
    }
}

#[async_trait]
impl<T: Transport> MessagePublisher for ResilientPublisher<T> {
    async fn publish(&self, message: &Message) -> Outcome<MessageId> {
        ResilientPublisher::publish(self, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MemorySink;
    use crate::time::InstantSleeper;
    use crate::transport::TransportError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted transport: pops one response per publish; an empty script
    /// publishes successfully with a default id.
    struct MockTransport {
        responses: Mutex<VecDeque<Result<String, TransportError>>>,
        publish_calls: AtomicUsize,
        describe_response: Mutex<Option<TransportError>>,
    }

    impl MockTransport {
        fn ok() -> Self {
            Self {
                responses: Mutex::new(VecDeque::new()),
                publish_calls: AtomicUsize::new(0),
                describe_response: Mutex::new(None),
            }
        }

        fn scripted(responses: Vec<Result<String, TransportError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                publish_calls: AtomicUsize::new(0),
                describe_response: Mutex::new(None),
            }
        }

        fn failing_describe(error: TransportError) -> Self {
            Self {
                responses: Mutex::new(VecDeque::new()),
                publish_calls: AtomicUsize::new(0),
                describe_response: Mutex::new(Some(error)),
            }
        }

        fn calls(&self) -> usize {
            self.publish_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn publish(&self, _topic: &str, _payload: &str) -> Result<MessageId, TransportError> {
            self.publish_calls.fetch_add(1, Ordering::SeqCst);
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(id)) => Ok(MessageId::new(id)),
                Some(Err(e)) => Err(e),
                None => Ok(MessageId::new("default-id")),
            }
        }

        async fn describe_topic(&self, _topic: &str) -> Result<(), TransportError> {
            match self.describe_response.lock().unwrap().take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    fn throttling() -> TransportError {
        TransportError::Throttling("Rate exceeded".into())
    }

    fn internal() -> TransportError {
        TransportError::Internal("InternalError".into())
    }

    fn publisher_with_sink(
        transport: MockTransport,
        sink: MemorySink,
    ) -> ResilientPublisher<MockTransport> {
        ResilientPublisher::builder(transport, "arn:aws:sns:us-east-1:123456789012:data")
            .sink(sink.clone())
            .retry(
                RetryPolicy::builder()
                    .with_sleeper(InstantSleeper)
                    .with_sink(sink)
                    .build(),
            )
            .build()
    }

    #[tokio::test]
    async fn publishes_and_returns_the_broker_id() {
        let transport = MockTransport::scripted(vec![Ok("abc".into())]);
        let publisher = ResilientPublisher::new(transport, "topic");

        let outcome = publisher.publish(&Message::new("hello")).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.value().unwrap().as_str(), "abc");
        assert_eq!(publisher.transport.calls(), 1);
    }

    #[tokio::test]
    async fn rejects_blank_messages_without_touching_the_transport() {
        let publisher = ResilientPublisher::new(MockTransport::ok(), "topic");

        for payload in ["", "   ", "\t\n"] {
            let outcome = publisher.publish(&Message::new(payload)).await;
            assert_eq!(outcome.error_kind(), ErrorKind::InvalidInput);
            assert!(outcome.detail().unwrap().contains("Message cannot be null or empty"));
        }
        assert_eq!(publisher.transport.calls(), 0);
    }

    #[tokio::test]
    async fn retries_throttling_to_exhaustion() {
        let sink = MemorySink::new();
        let transport = MockTransport::scripted(vec![
            Err(throttling()),
            Err(throttling()),
            Err(throttling()),
            Err(throttling()),
        ]);
        let publisher = publisher_with_sink(transport, sink.clone());

        let outcome = publisher.publish(&Message::new("m")).await;

        assert_eq!(outcome.error_kind(), ErrorKind::Throttling);
        assert!(outcome.detail().unwrap().starts_with("Request throttled"));
        assert_eq!(publisher.transport.calls(), 4);
        assert_eq!(sink.count("sns_retries"), 3);
        assert_eq!(sink.count("sns_publish_failures"), 1);
    }

    #[tokio::test]
    async fn recovers_when_a_retry_succeeds() {
        let sink = MemorySink::new();
        let transport =
            MockTransport::scripted(vec![Err(internal()), Ok("ok".into())]);
        let publisher = publisher_with_sink(transport, sink.clone());

        let outcome = publisher.publish(&Message::new("m")).await;

        assert!(outcome.is_success());
        assert_eq!(publisher.transport.calls(), 2);
        assert_eq!(sink.count("sns_retries"), 1);
        assert_eq!(sink.count("sns_publish_successes"), 1);
    }

    #[tokio::test]
    async fn non_retriable_errors_are_terminal_on_the_first_call() {
        let transport =
            MockTransport::scripted(vec![Err(TransportError::Authorization("denied".into()))]);
        let publisher = ResilientPublisher::new(transport, "topic");

        let outcome = publisher.publish(&Message::new("m")).await;

        assert_eq!(outcome.error_kind(), ErrorKind::AuthorizationFailure);
        assert_eq!(publisher.transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_attempts_are_not_retried() {
        struct SlowTransport {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl Transport for SlowTransport {
            async fn publish(
                &self,
                _topic: &str,
                _payload: &str,
            ) -> Result<MessageId, TransportError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(MessageId::new("never"))
            }

            async fn describe_topic(&self, _topic: &str) -> Result<(), TransportError> {
                Ok(())
            }
        }

        let publisher =
            ResilientPublisher::new(SlowTransport { calls: AtomicUsize::new(0) }, "topic");

        let outcome = publisher.publish(&Message::new("m")).await;

        assert_eq!(outcome.error_kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(outcome.detail(), Some("Request timed out"));
        assert_eq!(publisher.transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn breaker_trips_after_ten_failures_and_fails_fast() {
        let sink = MemorySink::new();
        let responses = (0..10).map(|_| Err(internal())).collect::<Vec<_>>();
        let publisher = publisher_with_sink(MockTransport::scripted(responses), sink.clone());

        let mut outcomes = Vec::new();
        for _ in 0..10 {
            outcomes.push(publisher.publish(&Message::new("m")).await);
        }
        for outcome in &outcomes {
            assert_eq!(outcome.error_kind(), ErrorKind::ServiceUnavailable);
        }

        // The ten scripted failures all reached the transport across the
        // first publishes; the breaker is now open.
        assert_eq!(publisher.transport.calls(), 10);

        let before = publisher.transport.calls();
        let outcome = publisher.publish(&Message::new("m")).await;
        assert_eq!(outcome.error_kind(), ErrorKind::ServiceUnavailable);
        assert!(outcome.detail().unwrap().contains("Circuit breaker open"));
        assert_eq!(publisher.transport.calls(), before, "open circuit must not call transport");

        assert!(sink.count("circuit_breaker_state_changes") >= 1);
    }

    #[tokio::test]
    async fn health_probe_reports_transport_health() {
        let publisher = ResilientPublisher::new(MockTransport::ok(), "topic");
        assert!(publisher.is_healthy().await);

        let publisher = ResilientPublisher::new(
            MockTransport::failing_describe(TransportError::NotFound("no topic".into())),
            "topic",
        );
        assert!(!publisher.is_healthy().await);
    }

    #[tokio::test]
    async fn emits_attempt_and_duration_telemetry() {
        let sink = MemorySink::new();
        let publisher = publisher_with_sink(MockTransport::ok(), sink.clone());

        let _ = publisher.publish(&Message::new("m")).await;

        assert_eq!(sink.count("sns_publish_attempts"), 1);
        assert_eq!(sink.count("sns_publish_successes"), 1);
        assert_eq!(sink.count("sns_publish_failures"), 0);
    }
}
