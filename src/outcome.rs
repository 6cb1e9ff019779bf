//! The categorized result contract returned at component boundaries.
//!
//! Raw transport errors live inside the publisher's resilience stack; the
//! rest of the system only ever sees an [`Outcome`] carrying an [`ErrorKind`]
//! from the stable taxonomy below.

use std::fmt;

/// Boxed error used wherever a component hands an opaque cause across a seam.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Categorical error taxonomy exposed in [`Outcome`]. Stable contract for
/// callers; the `Display` label doubles as the `error_type` telemetry tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Not an error. Present only on successful outcomes.
    None,
    /// The message was rejected before reaching the transport.
    InvalidInput,
    /// The transport rejected the caller's credentials or permissions.
    AuthorizationFailure,
    /// The topic (or a dependency of it) does not exist.
    ResourceNotFound,
    /// The downstream service is unavailable, timed out, or circuit-broken.
    ServiceUnavailable,
    /// The downstream service throttled the request.
    Throttling,
    /// Anything the categorizer could not classify.
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::None => "none",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::AuthorizationFailure => "authorization_failure",
            ErrorKind::ResourceNotFound => "resource_not_found",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Throttling => "throttling",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One prepared wire message. The payload is opaque, non-empty UTF-8;
/// blank payloads are rejected by the publisher before any transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    payload: String,
}

impl Message {
    pub fn new(payload: impl Into<String>) -> Self {
        Self { payload: payload.into() }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Payload size in bytes, reported as the `sns.message_size` span tag.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Empty and all-whitespace payloads are both treated as blank.
    pub fn is_blank(&self) -> bool {
        self.payload.trim().is_empty()
    }
}

/// Broker-assigned identifier returned on a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tagged success/failure result for a single publish attempt.
///
/// Invariant: `is_success()` ⇔ `error_kind() == ErrorKind::None` ⇔ the value
/// is present. Failures carry a categorized kind, a human-readable detail,
/// and optionally the boxed cause. Outcomes are never mutated after
/// construction.
#[derive(Debug)]
pub struct Outcome<T> {
    value: Option<T>,
    kind: ErrorKind,
    detail: Option<String>,
    cause: Option<BoxError>,
}

impl<T> Outcome<T> {
    pub fn success(value: T) -> Self {
        Self { value: Some(value), kind: ErrorKind::None, detail: None, cause: None }
    }

    pub fn failure(kind: ErrorKind, detail: impl Into<String>) -> Self {
        debug_assert!(kind != ErrorKind::None, "failures must carry a real kind");
        Self { value: None, kind, detail: Some(detail.into()), cause: None }
    }

    pub fn failure_with_cause(kind: ErrorKind, detail: impl Into<String>, cause: BoxError) -> Self {
        debug_assert!(kind != ErrorKind::None, "failures must carry a real kind");
        Self { value: None, kind, detail: Some(detail.into()), cause: Some(cause) }
    }

    pub fn is_success(&self) -> bool {
        self.kind == ErrorKind::None
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    pub fn error_kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

impl<T: fmt::Debug> fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_success() {
            write!(f, "success({:?})", self.value)
        } else {
            write!(f, "failure({}: {})", self.kind, self.detail.as_deref().unwrap_or(""))
        }
    }
}
