//! Retry policy with decorrelated jitter backoff
//!
//! A [`RetryPolicy`] re-issues one logical operation after transient
//! failures, up to `max_attempts` total attempts. Permanent failures are
//! returned on the spot. Waits between attempts follow the decorrelated
//! jitter scheme: each delay is drawn uniformly between the base delay and
//! three times the previous delay, capped at `max_delay`. Because every draw
//! depends on the caller's own previous delay, independent callers drift
//! apart instead of retrying in lockstep.
//!
//! Backoff waits and in-flight attempts race against a
//! [`CancellationToken`], so shutdown never waits out a backoff sequence.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::circuit_breaker::{ConfigError, ConfigResult};
use super::classify::Classify;

/// Errors that can occur during retry operations
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// All attempts failed with transient errors
    #[error("All retry attempts exhausted after {attempts} tries: {last}")]
    AttemptsExhausted { attempts: u32, last: E },

    /// The operation failed with a non-retryable error
    #[error("Operation failed with non-retryable error: {error}")]
    NonRetryable { attempts: u32, error: E },

    /// The cancellation token fired before the operation completed
    #[error("Retry cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Number of attempts that were started
    pub fn attempts(&self) -> u32 {
        match self {
            Self::AttemptsExhausted { attempts, .. }
            | Self::NonRetryable { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total number of attempts, the initial try included
    pub max_attempts: u32,
    /// Lower bound of every backoff draw, and the seed of the first one
    pub base_delay: Duration,
    /// Upper bound of every backoff draw
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 7,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                message: "max_attempts must be greater than 0".to_string(),
            });
        }

        if self.max_delay < self.base_delay {
            return Err(ConfigError::Invalid {
                message: "max_delay must not be shorter than base_delay".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    /// Start from the default configuration
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    /// Total attempts, counting the first call
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Lower bound of each backoff delay
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    /// Upper bound of each backoff delay
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    /// Validate and return the configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` for zero attempts or a max delay below
    /// the base delay.
    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Decorrelated jitter delay sequence for one retry run
///
/// `next = min(cap, uniform(base, previous * 3))`, with `previous`
/// starting at `base`.
#[derive(Debug, Clone)]
pub struct DecorrelatedJitter {
    base: Duration,
    cap: Duration,
    previous: Duration,
}

impl DecorrelatedJitter {
    /// New sequence; a `cap` below `base` is raised to `base`
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap: cap.max(base), previous: base }
    }

    /// Draw the next delay using the supplied random source
    pub fn next_delay<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        let low = self.base.as_millis() as u64;
        let high = (self.previous.as_millis() as u64).saturating_mul(3).max(low);

        let drawn = if high > low { rng.gen_range(low..=high) } else { low };
        let delay = Duration::from_millis(drawn).min(self.cap);

        self.previous = delay;
        delay
    }
}

/// Shared retry policy
///
/// Stateless apart from its configuration; each [`execute`](Self::execute)
/// call runs its own jitter sequence.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    name: String,
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy after validating the configuration
    pub fn new(name: impl Into<String>, config: RetryConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { name: name.into(), config })
    }

    /// Name under which this policy was registered
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Policy configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation, retrying transient failures.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn execute<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> RetryResult<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Classify + Send + Sync + 'static,
    {
        let mut backoff = DecorrelatedJitter::new(self.config.base_delay, self.config.max_delay);
        let mut attempt = 0_u32;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            attempt += 1;

            debug!(
                policy = %self.name,
                attempt,
                max_attempts = self.config.max_attempts,
                "Executing operation"
            );

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                result = operation(attempt) => result,
            };

            let error = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(policy = %self.name, attempt, "Operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_transient() {
                debug!(policy = %self.name, attempt, error = %error, "Non-retryable failure");
                return Err(RetryError::NonRetryable { attempts: attempt, error });
            }

            if attempt >= self.config.max_attempts {
                warn!(
                    policy = %self.name,
                    attempts = attempt,
                    error = %error,
                    "All retry attempts exhausted"
                );
                return Err(RetryError::AttemptsExhausted { attempts: attempt, last: error });
            }

            let delay = backoff.next_delay(&mut rand::thread_rng());
            warn!(
                policy = %self.name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient failure, retrying"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
