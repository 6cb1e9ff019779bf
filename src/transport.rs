//! Transport capability consumed by the publisher, and the mapping from raw
//! transport failures onto the stable [`ErrorKind`] taxonomy.

use crate::error::PublishError;
use crate::outcome::{ErrorKind, MessageId};
use async_trait::async_trait;
use thiserror::Error;

/// Abstract pub/sub transport. Implementations wrap a concrete broker client;
/// the publisher only needs these two calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish one payload to a topic, returning the broker-assigned id.
    async fn publish(&self, topic: &str, payload: &str) -> Result<MessageId, TransportError>;

    /// Lightweight topic-metadata lookup used by the health probe.
    async fn describe_topic(&self, topic: &str) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn publish(&self, topic: &str, payload: &str) -> Result<MessageId, TransportError> {
        (**self).publish(topic, payload).await
    }

    async fn describe_topic(&self, topic: &str) -> Result<(), TransportError> {
        (**self).describe_topic(topic).await
    }
}

/// Raw failure surfaced by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("authorization error: {0}")]
    Authorization(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("throttled: {0}")]
    Throttling(String),
    #[error("KMS throttled: {0}")]
    KmsThrottling(String),
    #[error("internal service error: {0}")]
    Internal(String),
    #[error("KMS key disabled: {0}")]
    KmsDisabled(String),
    #[error("KMS key not found: {0}")]
    KmsNotFound(String),
    #[error("KMS opt-in required: {0}")]
    KmsOptInRequired(String),
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// The transient subset the retry layer may re-attempt. The same set is
    /// what the circuit breaker counts toward its failure threshold.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            TransportError::Throttling(_)
                | TransportError::KmsThrottling(_)
                | TransportError::Internal(_)
                | TransportError::Http { status: 500, .. }
                | TransportError::Http { status: 503, .. }
        )
    }
}

/// Map a terminal stack failure onto `(ErrorKind, detail)`.
///
/// `RetryExhausted` is peeled first so the caller sees the kind of the last
/// real failure, not the wrapper.
pub fn categorize(error: &PublishError) -> (ErrorKind, String) {
    match error.terminal() {
        PublishError::Timeout { .. } => {
            (ErrorKind::ServiceUnavailable, "Request timed out".to_string())
        }
        PublishError::CircuitOpen { .. } => {
            (ErrorKind::ServiceUnavailable, "Circuit breaker open".to_string())
        }
        PublishError::Transport(e) => categorize_transport(e),
        PublishError::RetryExhausted { .. } => {
            unreachable!("terminal() peels RetryExhausted")
        }
    }
}

fn categorize_transport(error: &TransportError) -> (ErrorKind, String) {
    match error {
        TransportError::InvalidParameter(m) => (
            ErrorKind::InvalidInput,
            format!("Invalid message format or attributes: {m}"),
        ),
        TransportError::Authorization(m) => {
            (ErrorKind::AuthorizationFailure, format!("Authorization failure: {m}"))
        }
        TransportError::NotFound(m) => {
            (ErrorKind::ResourceNotFound, format!("Resource not found: {m}"))
        }
        TransportError::Throttling(m) | TransportError::KmsThrottling(m) => {
            (ErrorKind::Throttling, format!("Request throttled: {m}"))
        }
        TransportError::Internal(m) => {
            (ErrorKind::ServiceUnavailable, format!("AWS internal error: {m}"))
        }
        TransportError::KmsDisabled(m)
        | TransportError::KmsNotFound(m)
        | TransportError::KmsOptInRequired(m) => {
            (ErrorKind::ServiceUnavailable, format!("KMS configuration error: {m}"))
        }
        TransportError::Http { status: 500 | 503, message } => {
            (ErrorKind::ServiceUnavailable, format!("AWS internal error: {message}"))
        }
        other => (ErrorKind::Unknown, format!("Unexpected error: {other}")),
    }
}
