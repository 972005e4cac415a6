//! Result of one logical remote call
//!
//! Remote calls never raise for expected conditions. A missing resource is a
//! value ([`CallOutcome::NotFound`]) and failures carry a classification the
//! caller can act on without inspecting transport errors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Diagnostic payload of a failed call
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Human-readable cause
    pub message: String,
    /// HTTP status, when the server answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Non-empty response body, when the server answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl FailureDetail {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), status: None, body: None }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach a response body; an empty body is dropped
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        self.body = (!body.is_empty()).then_some(body);
        self
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {status})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Classified outcome of a remote call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T> {
    /// The call succeeded and produced a value
    Success(T),
    /// The resource does not exist
    NotFound,
    /// Retries were exhausted or the circuit was open
    TransientFailure(FailureDetail),
    /// The call cannot succeed by repeating it
    PermanentFailure(FailureDetail),
    /// Shutdown was requested while the call was in flight
    Cancelled,
}

impl<T> CallOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Value of a successful call
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_success(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Failure detail, for either failure class
    pub fn failure(&self) -> Option<&FailureDetail> {
        match self {
            Self::TransientFailure(detail) | Self::PermanentFailure(detail) => Some(detail),
            _ => None,
        }
    }

    /// Transform the success value, keeping every other variant
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> CallOutcome<U> {
        match self {
            Self::Success(value) => CallOutcome::Success(f(value)),
            Self::NotFound => CallOutcome::NotFound,
            Self::TransientFailure(detail) => CallOutcome::TransientFailure(detail),
            Self::PermanentFailure(detail) => CallOutcome::PermanentFailure(detail),
            Self::Cancelled => CallOutcome::Cancelled,
        }
    }

    /// Short name used in log events
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::NotFound => "not_found",
            Self::TransientFailure(_) => "transient_failure",
            Self::PermanentFailure(_) => "permanent_failure",
            Self::Cancelled => "cancelled",
        }
    }
}
