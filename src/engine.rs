//! Bounded-channel fan-out: drain a finite batch of prepared messages
//! through a pool of workers sharing one publisher.
//!
//! The producer enqueues in input order and waits when the channel is full
//! (backpressure is measured, never dropped). Workers pull one message at a
//! time, so no message is ever visible to two workers. A failed publish is
//! terminal for that message; the retry lives inside the publisher.

use crate::outcome::Message;
use crate::publisher::MessagePublisher;
use crate::telemetry::{NullSink, TelemetryEvent, TelemetrySink};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};

/// In-flight bound for the producer/consumer channel.
pub const CHANNEL_CAPACITY: usize = 1000;
/// One worker per this many messages, up to [`MAX_WORKERS`].
pub const MESSAGES_PER_WORKER: usize = 100;
/// Cap on concurrent publishers, bounding peak load on the breaker.
pub const MAX_WORKERS: usize = 20;
/// Producer waits at or below this are treated as scheduling noise.
pub const BACKPRESSURE_FLOOR: Duration = Duration::from_millis(5);

/// Aggregate result of one fan-out run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishStats {
    pub success_count: usize,
    pub failure_count: usize,
    /// Producer wait accumulated while the channel was full.
    pub backpressure: Duration,
}

impl PublishStats {
    pub fn total(&self) -> usize {
        self.success_count + self.failure_count
    }
}

pub struct FanOutEngine<P> {
    publisher: Arc<P>,
    capacity: usize,
    backpressure_floor: Duration,
    messages_per_worker: usize,
    max_workers: usize,
    sink: Arc<dyn TelemetrySink>,
}

impl<P> FanOutEngine<P>
where
    P: MessagePublisher + 'static,
{
    pub fn new(publisher: P) -> Self {
        Self {
            publisher: Arc::new(publisher),
            capacity: CHANNEL_CAPACITY,
            backpressure_floor: BACKPRESSURE_FLOOR,
            messages_per_worker: MESSAGES_PER_WORKER,
            max_workers: MAX_WORKERS,
            sink: Arc::new(NullSink),
        }
    }

    /// Route `publish_stats` and backpressure events to `sink`.
    pub fn with_sink(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_backpressure_floor(mut self, floor: Duration) -> Self {
        self.backpressure_floor = floor;
        self
    }

    /// Sizing rule: one worker per hundred messages, clamped to `1..=20`.
    pub fn worker_count(&self, batch_len: usize) -> usize {
        (batch_len / self.messages_per_worker).clamp(1, self.max_workers)
    }

    /// Drain `messages` through the worker pool and aggregate the outcomes.
    ///
    /// Always completes for finite input: workers absorb every per-message
    /// failure (including a panicking publisher) into the failure count.
    pub async fn run(&self, messages: Vec<Message>) -> PublishStats {
        if messages.is_empty() {
            return PublishStats::default();
        }

        let workers = self.worker_count(messages.len());
        let batch_len = messages.len();
        let (tx, rx) = mpsc::channel::<Message>(self.capacity);
        let rx = Arc::new(Mutex::new(rx));

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let rx = Arc::clone(&rx);
            let publisher = Arc::clone(&self.publisher);
            handles.push(tokio::spawn(async move {
                let mut success = 0usize;
                let mut failure = 0usize;
                loop {
                    // Hold the lock only for the hand-off, not the publish.
                    let message = { rx.lock().await.recv().await };
                    let Some(message) = message else { break };

                    match AssertUnwindSafe(publisher.publish(&message)).catch_unwind().await {
                        Ok(outcome) if outcome.is_success() => success += 1,
                        Ok(outcome) => {
                            failure += 1;
                            tracing::error!(
                                worker_id,
                                error_type = %outcome.error_kind(),
                                detail = outcome.detail().unwrap_or_default(),
                                "publish failed"
                            );
                        }
                        Err(_) => {
                            failure += 1;
                            tracing::error!(worker_id, "publisher panicked, counted as failure");
                        }
                    }
                }
                (success, failure)
            }));
        }

        let mut backpressure = Duration::ZERO;
        for message in messages {
            let enqueue_start = Instant::now();
            if tx.send(message).await.is_err() {
                // All workers gone; nothing left to account the rest against.
                tracing::error!("fan-out channel closed early");
                break;
            }
            let waited = enqueue_start.elapsed();
            if waited > self.backpressure_floor {
                backpressure += waited;
            }
        }
        drop(tx);

        let mut stats = PublishStats { backpressure, ..PublishStats::default() };
        for handle in handles {
            match handle.await {
                Ok((success, failure)) => {
                    stats.success_count += success;
                    stats.failure_count += failure;
                }
                Err(err) => tracing::error!(error = %err, "fan-out worker aborted"),
            }
        }

        self.sink.record(TelemetryEvent::PublishStats {
            success_count: stats.success_count,
            failure_count: stats.failure_count,
        });
        self.sink.record(TelemetryEvent::Backpressure { total: stats.backpressure });
        tracing::info!(
            batch = batch_len,
            workers,
            success = stats.success_count,
            failure = stats.failure_count,
            backpressure_ms = stats.backpressure.as_millis() as u64,
            "fan-out run complete"
        );

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{ErrorKind, MessageId, Outcome};
    use crate::telemetry::MemorySink;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Publisher that succeeds for every payload not containing "fail" and
    /// panics for payloads containing "panic".
    struct ScriptedPublisher {
        calls: AtomicUsize,
    }

    impl ScriptedPublisher {
        fn new() -> Self {
            Self { calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl MessagePublisher for ScriptedPublisher {
        async fn publish(&self, message: &Message) -> Outcome<MessageId> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if message.payload().contains("panic") {
                panic!("scripted panic");
            }
            if message.payload().contains("fail") {
                Outcome::failure(ErrorKind::ServiceUnavailable, "AWS internal error")
            } else {
                Outcome::success(MessageId::new("id"))
            }
        }
    }

    fn batch(len: usize) -> Vec<Message> {
        (0..len).map(|i| Message::new(format!("msg-{i}"))).collect()
    }

    #[test]
    fn worker_count_follows_the_sizing_rule() {
        let engine = FanOutEngine::new(ScriptedPublisher::new());
        assert_eq!(engine.worker_count(1), 1);
        assert_eq!(engine.worker_count(99), 1);
        assert_eq!(engine.worker_count(100), 1);
        assert_eq!(engine.worker_count(199), 1);
        assert_eq!(engine.worker_count(200), 2);
        assert_eq!(engine.worker_count(1000), 10);
        assert_eq!(engine.worker_count(2000), 20);
        assert_eq!(engine.worker_count(1_000_000), 20);
    }

    #[tokio::test]
    async fn empty_input_returns_zeros_without_workers() {
        let engine = FanOutEngine::new(ScriptedPublisher::new());
        let stats = engine.run(Vec::new()).await;
        assert_eq!(stats, PublishStats::default());
        assert_eq!(engine.publisher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn publishes_a_full_batch_with_one_worker() {
        let engine = FanOutEngine::new(ScriptedPublisher::new());
        let stats = engine.run(batch(100)).await;
        assert_eq!(stats.success_count, 100);
        assert_eq!(stats.failure_count, 0);
        assert!(stats.backpressure >= Duration::ZERO);
        assert_eq!(engine.worker_count(100), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn publishes_a_large_batch_across_twenty_workers() {
        let engine = FanOutEngine::new(ScriptedPublisher::new());
        let stats = engine.run(batch(2000)).await;
        assert_eq!(stats.success_count, 2000);
        assert_eq!(stats.failure_count, 0);
        assert_eq!(engine.worker_count(2000), 20);
        assert_eq!(engine.publisher.calls.load(Ordering::SeqCst), 2000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn counts_every_message_exactly_once_under_partial_failure() {
        let engine = FanOutEngine::new(ScriptedPublisher::new());
        let mut messages = batch(300);
        for i in (0..300).step_by(3) {
            messages[i] = Message::new(format!("fail-{i}"));
        }

        let stats = engine.run(messages).await;

        assert_eq!(stats.failure_count, 100);
        assert_eq!(stats.success_count, 200);
        assert_eq!(stats.total(), 300);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn a_panicking_publisher_is_counted_not_propagated() {
        let engine = FanOutEngine::new(ScriptedPublisher::new());
        let mut messages = batch(50);
        messages[7] = Message::new("panic-7");
        messages[23] = Message::new("panic-23");

        let stats = engine.run(messages).await;

        assert_eq!(stats.failure_count, 2);
        assert_eq!(stats.success_count, 48);
        assert_eq!(stats.total(), 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn a_small_channel_still_drains_the_whole_batch() {
        let engine = FanOutEngine::new(ScriptedPublisher::new()).with_capacity(2);
        let stats = engine.run(batch(500)).await;
        assert_eq!(stats.total(), 500);
        assert_eq!(stats.failure_count, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn emits_stats_and_backpressure_telemetry() {
        let sink = MemorySink::new();
        let engine = FanOutEngine::new(ScriptedPublisher::new()).with_sink(sink.clone());
        let _ = engine.run(batch(10)).await;

        assert_eq!(sink.count("publish_stats"), 1);
        assert_eq!(sink.count("channel_backpressure_time"), 1);

        let stats = sink.events().into_iter().find_map(|e| match e {
            TelemetryEvent::PublishStats { success_count, failure_count } => {
                Some((success_count, failure_count))
            }
            _ => None,
        });
        assert_eq!(stats, Some((10, 0)));
    }
}
