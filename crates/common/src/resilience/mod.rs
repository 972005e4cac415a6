//! Resilience patterns for calls to an unreliable remote dependency
//!
//! This module provides **generic, reusable** resilience patterns:
//! - **Circuit Breaker**: stops calling a dependency that keeps failing and
//!   tests it again with a single trial call once a cool-down has passed
//! - **Retry**: re-issues transient failures with decorrelated jitter backoff
//! - **Pipeline**: the two composed, retry outside and breaker inside
//! - **Registry**: named, idempotently registered policy instances
//!
//! ## Failure Classification
//!
//! Errors opt in through [`Classify`]. Transient errors are retried and count
//! against the breaker. Permanent errors are returned immediately and leave
//! breaker accounting untouched.
//!
//! ## Data Flow
//!
//! ```text
//! caller ──▶ RetryPolicy ──(attempt n)──▶ CircuitBreaker ──▶ operation
//!                ▲                              │
//!                └──── transient / CircuitOpen ─┘
//! ```
//!
//! All implementations are generic over the operation error type and take a
//! [`Clock`] so breaker timing can be driven by [`MockClock`] in tests.

pub mod circuit_breaker;
pub mod classify;
pub mod pipeline;
pub mod registry;
pub mod retry;

// Re-export circuit breaker types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerMetrics,
    CircuitState, Clock, ConfigError, ConfigResult, MockClock, Permit, ResilienceError,
    SystemClock,
};
pub use classify::Classify;
pub use pipeline::ResiliencePipeline;
pub use registry::{PolicyKey, PolicyKind, PolicyRegistry, RegistryError};
// Re-export retry types
pub use retry::{
    DecorrelatedJitter, RetryConfig, RetryConfigBuilder, RetryError, RetryPolicy, RetryResult,
};
