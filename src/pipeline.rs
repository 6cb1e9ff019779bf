//! The pipeline driver: fetch records, transform them into messages, hand
//! the batch to the fan-out engine, and record total wall time.
//!
//! Source faults are fatal and propagate to the invoker. Everything past the
//! transform is absorbed by the engine into per-message accounting, so a run
//! that reaches the engine always completes.

use crate::engine::{FanOutEngine, PublishStats};
use crate::outcome::{BoxError, Message};
use crate::publisher::MessagePublisher;
use crate::telemetry::{NullSink, TelemetryEvent, TelemetrySink};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::Instrument;

/// Data source capability: a finite, possibly empty sequence of records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    type Record: Send;

    async fn get_records(&self) -> Result<Vec<Self::Record>, BoxError>;
}

/// Pure, total transformation from a record batch to a message batch.
pub trait Transformer<R>: Send + Sync {
    fn transform(&self, records: Vec<R>) -> Vec<Message>;
}

impl<R, F> Transformer<R> for F
where
    F: Fn(Vec<R>) -> Vec<Message> + Send + Sync,
{
    fn transform(&self, records: Vec<R>) -> Vec<Message> {
        self(records)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("data source failure: {0}")]
    Source(#[source] BoxError),
}

pub struct Pipeline<S, X, P> {
    source: S,
    transformer: X,
    engine: FanOutEngine<P>,
    sink: Arc<dyn TelemetrySink>,
}

impl<S, X, P> Pipeline<S, X, P>
where
    S: RecordSource,
    X: Transformer<S::Record>,
    P: MessagePublisher + 'static,
{
    pub fn new(source: S, transformer: X, engine: FanOutEngine<P>) -> Self {
        Self { source, transformer, engine, sink: Arc::new(NullSink) }
    }

    /// Route the pipeline's and the engine's telemetry to `sink`. The
    /// publisher keeps its own sink.
    pub fn with_sink(self, sink: impl TelemetrySink + 'static) -> Self {
        let sink: Arc<dyn TelemetrySink> = Arc::new(sink);
        Pipeline {
            source: self.source,
            transformer: self.transformer,
            engine: self.engine.with_sink(Arc::clone(&sink)),
            sink,
        }
    }

    /// Run one batch end to end. Returns the engine's aggregate stats; a
    /// data-source fault is re-raised and marks the run as errored.
    pub async fn run(&self) -> Result<PublishStats, PipelineError> {
        let span = tracing::info_span!(
            "ProcessAndPublishData",
            otel.status_code = tracing::field::Empty,
            error.message = tracing::field::Empty,
        );

        async {
            let start = Instant::now();

            let records = match self
                .source
                .get_records()
                .instrument(tracing::info_span!("DatabaseQuery"))
                .await
            {
                Ok(records) => records,
                Err(err) => {
                    let span = tracing::Span::current();
                    span.record("otel.status_code", "ERROR");
                    span.record("error.message", err.to_string().as_str());
                    tracing::error!(error = %err, "data source failed");
                    return Err(PipelineError::Source(err));
                }
            };
            self.sink.record(TelemetryEvent::ItemsRetrieved { count: records.len() });

            let messages = tracing::info_span!("TransformData")
                .in_scope(|| self.transformer.transform(records));
            self.sink.record(TelemetryEvent::ItemsTransformed { count: messages.len() });

            let stats = self.engine.run(messages).await;

            let elapsed = start.elapsed();
            self.sink.record(TelemetryEvent::TotalProcessingTime { duration: elapsed });
            tracing::info!(
                success = stats.success_count,
                failure = stats.failure_count,
                total_ms = elapsed.as_millis() as u64,
                "pipeline run complete"
            );

            Ok(stats)
        }
        .instrument(span)
        .await
    }
}
