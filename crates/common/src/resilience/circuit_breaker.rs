//! Circuit breaker for protecting a remote dependency
//!
//! The breaker counts consecutive transient failures. Once the configured
//! threshold is reached it opens and rejects every call without invoking the
//! operation. After the open duration has elapsed the next caller becomes the
//! single half-open trial: its success closes the circuit, its transient
//! failure re-opens it with a fresh open time.
//!
//! ```text
//! Closed ──(failure_threshold consecutive failures)──▶ Open
//! Open ──(open_duration elapsed, next call)──▶ HalfOpen
//! HalfOpen ──(trial succeeds)──▶ Closed
//! HalfOpen ──(trial fails)──▶ Open
//! ```
//!
//! All state lives behind a single mutex so every transition is atomic with
//! respect to concurrent callers sharing the same breaker.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::classify::Classify;

//==============================================================================
// Time Abstraction for Testability
//==============================================================================

/// Trait for time operations to enable deterministic testing
///
/// Circuit breakers use real monotonic time in production and controlled mock
/// time in tests, so open-duration behaviour can be tested without sleeping.
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Implement Clock for Arc<T> where T: Clock for convenient cloning
impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Mock clock for deterministic testing
///
/// Clones share the same elapsed time, so a test can hand one clone to a
/// breaker and advance another.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current instant
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Advance the mock clock by milliseconds (convenience method)
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Set the mock clock to a specific elapsed time
    pub fn set_elapsed(&self, duration: Duration) {
        *self.elapsed.lock() = duration;
    }

    /// Get the current elapsed time
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }
}

//==============================================================================
// Error Types
//==============================================================================

/// Simple configuration error for validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A policy setting is out of range
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Result type for configuration validation
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors produced by a breaker-protected call
///
/// Generic over the operation error so the original failure is preserved.
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Circuit breaker is open (or a half-open trial is in flight)
    #[error("Circuit breaker is open, rejecting calls")]
    CircuitOpen,

    /// The underlying operation failed
    #[error("Operation failed: {source}")]
    OperationFailed {
        #[source]
        source: E,
    },
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Returns the operation error, if the operation actually ran.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::CircuitOpen => None,
            Self::OperationFailed { source } => Some(source),
        }
    }
}

/// A rejection by an open breaker counts as a transient failure for callers
/// higher up (notably the retry policy).
impl<E> Classify for ResilienceError<E>
where
    E: std::error::Error + Classify + Send + Sync + 'static,
{
    fn is_transient(&self) -> bool {
        match self {
            Self::CircuitOpen => true,
            Self::OperationFailed { source } => source.is_transient(),
        }
    }
}

//==============================================================================
// Configuration
//==============================================================================

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, allowing a single trial request
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive transient failures before opening the circuit
    pub failure_threshold: u32,
    /// Time to stay open before admitting a half-open trial
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 7, open_duration: Duration::from_secs(10) }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerConfigBuilder {
    /// Start from the default configuration
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    /// Consecutive transient failures that open the circuit
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// How long the circuit stays open before admitting a trial call
    pub fn open_duration(mut self, duration: Duration) -> Self {
        self.config.open_duration = duration;
        self
    }

    /// Validate and return the configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` for a zero failure threshold.
    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//==============================================================================
// Circuit Breaker
//==============================================================================

/// Circuit breaker metrics for monitoring
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    /// Current state
    pub state: CircuitState,
    /// Transient failures since the last success
    pub consecutive_failures: u32,
    /// Calls admitted or rejected since creation
    pub total_calls: u64,
    /// Calls rejected while open
    pub rejected_calls: u64,
    /// When the circuit last opened, if it is open
    pub opened_at: Option<Instant>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_in_flight: false,
        }
    }
}

/// How the breaker should account for a finished call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Success,
    Failure,
    Neutral,
}

/// Admission ticket for one call through the breaker
///
/// Dropping a permit without settling it (for example when the caller's
/// future is cancelled mid-flight) releases a half-open trial slot without
/// changing state, so the breaker can never wedge in half-open.
#[must_use = "a permit must be settled with the call result"]
pub struct Permit<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    trial: bool,
    settled: bool,
}

impl<C: Clock> Permit<'_, C> {
    /// Whether this permit is the half-open trial call
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// Record a successful call
    pub fn success(mut self) {
        self.settle(Verdict::Success);
    }

    /// Record a transient failure
    pub fn failure(mut self) {
        self.settle(Verdict::Failure);
    }

    /// Record a result that must not influence breaker accounting
    pub fn neutral(mut self) {
        self.settle(Verdict::Neutral);
    }

    fn settle(&mut self, verdict: Verdict) {
        self.settled = true;
        self.breaker.record(self.trial, verdict);
    }
}

impl<C: Clock> Drop for Permit<'_, C> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record(self.trial, Verdict::Neutral);
        }
    }
}

/// Thread-safe circuit breaker shared by every caller of one remote endpoint
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    total_calls: AtomicU64,
    rejected_calls: AtomicU64,
    clock: C,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a new circuit breaker using the system clock
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a new circuit breaker with a custom clock (useful for testing)
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: C,
    ) -> ConfigResult<Self> {
        config.validate()?;

        Ok(Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::closed()),
            total_calls: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
            clock,
        })
    }

    /// Name under which this breaker was registered
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Breaker configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Ask for admission of one call.
    ///
    /// Returns `None` when the circuit is open, or half-open with the trial
    /// already in flight. An open circuit whose open duration has elapsed
    /// moves to half-open here and hands out the trial permit.
    pub fn try_acquire(&self) -> Option<Permit<'_, C>> {
        let mut inner = self.inner.lock();

        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map_or(Duration::MAX, |opened| self.clock.now().duration_since(opened));
                if elapsed < self.config.open_duration {
                    drop(inner);
                    self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                info!(breaker = %self.name, "Circuit breaker half-open, admitting trial call");
                true
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    drop(inner);
                    self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                inner.trial_in_flight = true;
                true
            }
        };

        drop(inner);
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        Some(Permit { breaker: self, trial, settled: false })
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// Transient errors count as failures, permanent errors are neutral, and
    /// `Ok` closes or keeps the circuit closed.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Classify + Send + Sync + 'static,
    {
        let Some(permit) = self.try_acquire() else {
            debug!(breaker = %self.name, state = %self.state(), "Circuit breaker rejecting call");
            return Err(ResilienceError::CircuitOpen);
        };

        match operation().await {
            Ok(value) => {
                permit.success();
                Ok(value)
            }
            Err(error) => {
                if error.is_transient() {
                    permit.failure();
                } else {
                    permit.neutral();
                }
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    fn record(&self, trial: bool, verdict: Verdict) {
        let mut inner = self.inner.lock();

        if trial {
            inner.trial_in_flight = false;
            match verdict {
                Verdict::Success => {
                    *inner = BreakerState::closed();
                    info!(breaker = %self.name, "Circuit breaker closed after successful trial");
                }
                Verdict::Failure => {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(self.clock.now());
                    warn!(breaker = %self.name, "Circuit breaker re-opened after failed trial");
                }
                Verdict::Neutral => {}
            }
            return;
        }

        // Calls admitted while closed only count if the circuit is still closed
        // when they finish.
        if inner.state != CircuitState::Closed {
            return;
        }

        match verdict {
            Verdict::Success => inner.consecutive_failures = 0,
            Verdict::Failure => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(self.clock.now());
                    warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        open_for_ms = self.config.open_duration.as_millis() as u64,
                        "Circuit breaker opened"
                    );
                }
            }
            Verdict::Neutral => {}
        }
    }

    /// Get the current state of the circuit breaker
    ///
    /// This is a snapshot; an open circuit whose duration has elapsed still
    /// reports `Open` until the next call is admitted as the trial.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Get circuit breaker metrics
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        CircuitBreakerMetrics {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
            opened_at: inner.opened_at,
        }
    }
}
