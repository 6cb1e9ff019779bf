//! Invocation entry point. The surrounding shim (scheduler, serverless
//! runtime) hands in an opaque event; the handler ignores its payload and
//! drives one pipeline run.

use crate::engine::PublishStats;
use crate::pipeline::{Pipeline, PipelineError, RecordSource, Transformer};
use crate::publisher::MessagePublisher;

pub struct Handler<S, X, P> {
    pipeline: Pipeline<S, X, P>,
}

impl<S, X, P> Handler<S, X, P>
where
    S: RecordSource,
    X: Transformer<S::Record>,
    P: MessagePublisher + 'static,
{
    pub fn new(pipeline: Pipeline<S, X, P>) -> Self {
        Self { pipeline }
    }

    /// Run one invocation. The event payload is accepted and ignored; only a
    /// data-source fault makes the invocation fail.
    pub async fn handle(&self, event: serde_json::Value) -> Result<PublishStats, PipelineError> {
        tracing::debug!(event = %event, "invocation received");
        let stats = self.pipeline.run().await?;
        tracing::info!(
            success = stats.success_count,
            failure = stats.failure_count,
            "invocation complete"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FanOutEngine;
    use crate::outcome::{BoxError, Message, MessageId, Outcome};
    use async_trait::async_trait;
    use serde_json::json;

    struct StaticSource;

    #[async_trait]
    impl RecordSource for StaticSource {
        type Record = String;

        async fn get_records(&self) -> Result<Vec<String>, BoxError> {
            Ok(vec!["a".into(), "b".into()])
        }
    }

    struct FailingSource;

    #[async_trait]
    impl RecordSource for FailingSource {
        type Record = String;

        async fn get_records(&self) -> Result<Vec<String>, BoxError> {
            Err("query timed out".into())
        }
    }

    struct OkPublisher;

    #[async_trait]
    impl MessagePublisher for OkPublisher {
        async fn publish(&self, _message: &Message) -> Outcome<MessageId> {
            Outcome::success(MessageId::new("id"))
        }
    }

    fn to_messages(records: Vec<String>) -> Vec<Message> {
        records.into_iter().map(Message::new).collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn ignores_the_event_payload_and_runs_the_pipeline() {
        let handler = Handler::new(Pipeline::new(
            StaticSource,
            to_messages,
            FanOutEngine::new(OkPublisher),
        ));

        let stats = handler.handle(json!({"anything": ["goes", 1, null]})).await.unwrap();
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.failure_count, 0);
    }

    #[tokio::test]
    async fn source_faults_fail_the_invocation() {
        let handler = Handler::new(Pipeline::new(
            FailingSource,
            to_messages,
            FanOutEngine::new(OkPublisher),
        ));

        let err = handler.handle(json!({})).await.unwrap_err();
        assert!(matches!(err, PipelineError::Source(_)));
    }
}
