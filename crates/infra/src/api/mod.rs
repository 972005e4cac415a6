//! Resource server API
//!
//! [`HttpAccountGateway`] implements the `AccountGateway` port over the
//! [`ResilientTransport`](crate::http::ResilientTransport), and
//! [`TransportError`] classifies what can go wrong on the wire.

pub mod errors;
pub mod gateway;

pub use errors::{FailureClass, TransportError};
pub use gateway::HttpAccountGateway;
