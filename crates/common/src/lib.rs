//! Modular common utilities shared across Tally crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: serialization helpers
//! - `runtime`: async infrastructure (resilience policies and their registry)
//! - `observability`: tracing (pulled in by `runtime`)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod utils;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, Classify, Clock, ConfigError,
    DecorrelatedJitter, MockClock, PolicyKey, PolicyRegistry, ResilienceError, ResiliencePipeline,
    RetryConfig, RetryError, RetryPolicy, SystemClock,
};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;
