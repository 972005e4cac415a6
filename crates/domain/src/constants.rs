//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! application.

// Lifecycle
pub const DEFAULT_DELETE_AFTER_UPDATES: u32 = 10;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

// HTTP policies
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 7;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_BREAKER_FAILURE_THRESHOLD: u32 = 7;
pub const DEFAULT_BREAKER_OPEN_DURATION_MS: u64 = 10_000;

// API client
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/v1.0";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Header the resource server checks on every request
pub const API_HEADER_KEY: &str = "X-SECURITY-HEADER";
pub const API_HEADER_VALUE: &str = "SOME-SECRET-PASSWORD";

// Worker
pub const WORKER_JOIN_TIMEOUT_MS: u64 = 5_000;
