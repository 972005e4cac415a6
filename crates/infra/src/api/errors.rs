//! API-specific error types
//!
//! Provides failure classification for calls to the resource server.

use tally_common::resilience::Classify;
use tally_domain::FailureDetail;
use thiserror::Error;

/// Whether repeating a failed call might succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network errors, timeouts, 5xx, open circuit - retried and counted by
    /// the circuit breaker
    Transient,
    /// 4xx and undecodable responses - surfaced immediately
    Permanent,
}

/// Transport operation errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error: HTTP {status}")]
    Server { status: u16, body: String },

    #[error("Client error: HTTP {status}")]
    Client { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    /// A 2xx reply whose body does not match the expected shape
    #[error("Undecodable response body: {reason}")]
    UnexpectedBody { status: u16, body: String, reason: String },

    #[error("Invalid request: {0}")]
    Request(String),

    #[error("Circuit breaker open")]
    CircuitOpen,

    #[error("Operation cancelled")]
    Cancelled,
}

impl TransportError {
    /// Classify an unsuccessful HTTP status
    ///
    /// 408 Request Timeout is treated like a transport timeout.
    pub fn from_status(status: u16, body: String) -> Self {
        if status >= 500 || status == 408 {
            Self::Server { status, body }
        } else {
            Self::Client { status, body }
        }
    }

    /// Get the failure class for this error
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Timeout(_) | Self::Network(_) | Self::Server { .. } | Self::CircuitOpen => {
                FailureClass::Transient
            }
            Self::Client { .. }
            | Self::Decode(_)
            | Self::UnexpectedBody { .. }
            | Self::Request(_)
            | Self::Cancelled => FailureClass::Permanent,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. }
            | Self::Client { status, .. }
            | Self::UnexpectedBody { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Server { body, .. }
            | Self::Client { body, .. }
            | Self::UnexpectedBody { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Diagnostic detail for a `CallOutcome`
    pub fn detail(&self) -> FailureDetail {
        let mut detail = FailureDetail::new(self.to_string());
        if let Some(status) = self.status() {
            detail = detail.with_status(status);
        }
        if let Some(body) = self.body() {
            detail = detail.with_body(body);
        }
        detail
    }
}

impl Classify for TransportError {
    fn is_transient(&self) -> bool {
        self.class() == FailureClass::Transient
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_builder() {
            Self::Request(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            // connect, request, body and redirect failures
            Self::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let class = |status| TransportError::from_status(status, String::new()).class();
        assert_eq!(class(500), FailureClass::Transient);
        assert_eq!(class(503), FailureClass::Transient);
        assert_eq!(class(408), FailureClass::Transient);
        assert_eq!(class(400), FailureClass::Permanent);
        assert_eq!(class(401), FailureClass::Permanent);
        assert_eq!(class(404), FailureClass::Permanent);
    }

    #[test]
    fn test_transport_failures_are_transient() {
        assert!(TransportError::Timeout("30s".into()).is_transient());
        assert!(TransportError::Network("refused".into()).is_transient());
        assert!(TransportError::CircuitOpen.is_transient());
        assert!(!TransportError::Decode("expected uuid".into()).is_transient());
    }

    #[test]
    fn test_unexpected_body_is_permanent_with_detail() {
        let error = TransportError::UnexpectedBody {
            status: 200,
            body: "garbage".to_string(),
            reason: "expected value at line 1 column 1".to_string(),
        };
        let detail = error.detail();

        assert!(!error.is_transient());
        assert_eq!(detail.status, Some(200));
        assert_eq!(detail.body.as_deref(), Some("garbage"));
        assert!(detail.message.starts_with("Undecodable response body"));
    }

    #[test]
    fn test_detail_carries_status_and_body() {
        let error = TransportError::from_status(401, "Invalid value for header".to_string());
        let detail = error.detail();

        assert_eq!(detail.status, Some(401));
        assert_eq!(detail.body.as_deref(), Some("Invalid value for header"));
        assert!(!error.is_not_found());
        assert!(TransportError::from_status(404, String::new()).is_not_found());
    }
}
