//! Unified error vocabulary inside the publisher's resilience stack.
//!
//! Policies speak [`PublishError`] to each other; the stack boundary
//! categorizes it into an [`crate::ErrorKind`] and the rest of the system
//! never sees this type directly.

use crate::transport::TransportError;
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum PublishError {
    /// The transport call itself failed.
    Transport(TransportError),
    /// A physical attempt exceeded the per-attempt deadline.
    Timeout { elapsed: Duration, timeout: Duration },
    /// The circuit breaker rejected the call without invoking the transport.
    CircuitOpen { failure_count: usize },
    /// All retry attempts were exhausted; carries the last real failure.
    RetryExhausted { attempts: usize, last: Box<PublishError> },
}

impl PublishError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }

    pub fn as_transport(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the retry layer may re-attempt after this failure. Timeouts
    /// and breaker rejections are terminal; only the transient transport set
    /// is retriable.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_retriable())
    }

    /// Peel `RetryExhausted` wrappers down to the terminal failure.
    pub fn terminal(&self) -> &PublishError {
        match self {
            Self::RetryExhausted { last, .. } => last.terminal(),
            other => other,
        }
    }
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{}", e),
            Self::Timeout { elapsed, timeout } => {
                write!(f, "attempt timed out after {:?} (limit: {:?})", elapsed, timeout)
            }
            Self::CircuitOpen { failure_count } => {
                write!(f, "circuit breaker open ({} consecutive failures)", failure_count)
            }
            Self::RetryExhausted { attempts, last } => {
                write!(f, "retry exhausted after {} attempts, last error: {}", attempts, last)
            }
        }
    }
}

impl std::error::Error for PublishError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::RetryExhausted { last, .. } => Some(last.as_ref()),
            _ => None,
        }
    }
}

impl From<TransportError> for PublishError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}
