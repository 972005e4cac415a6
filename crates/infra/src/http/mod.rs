//! HTTP client infrastructure
//!
//! A single-attempt [`HttpClient`] and the [`ResilientTransport`] that runs
//! it under the shared retry and circuit breaker policies.

pub mod client;
pub mod transport;

pub use client::{HttpClient, HttpClientBuilder, HttpReply};
pub use transport::{policies_from, ResilientTransport};
