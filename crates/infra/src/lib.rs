//! # Tally Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - Configuration loading (files and `TALLY_*` environment overrides)
//! - The single-attempt HTTP client and the resilient transport around it
//! - The HTTP account gateway
//! - Logging initialization
//!
//! ## Architecture
//! - Implements traits defined in `tally-core`
//! - Depends on `tally-domain`, `tally-common` and `tally-core`
//! - Contains all "impure" code (network, filesystem, environment)

pub mod api;
pub mod config;
pub mod errors;
pub mod http;
pub mod observability;

// Re-export commonly used items
pub use api::{FailureClass, HttpAccountGateway, TransportError};
pub use errors::InfraError;
pub use http::{HttpClient, HttpReply, ResilientTransport};
