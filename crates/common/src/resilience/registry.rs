//! Named policy registry
//!
//! Holds the retry and circuit breaker policies shared by every outbound call
//! to one remote resource. Registration is idempotent: asking for a name that
//! already exists hands back the stored instance, so a breaker's state is
//! never reset by registering it a second time. The registry is an ordinary
//! value threaded through construction; there is no global instance.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, Clock, ConfigError, SystemClock};
use super::pipeline::ResiliencePipeline;
use super::retry::{RetryConfig, RetryPolicy};

/// Well-known policy names provisioned at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKey {
    /// The shared retry policy
    Retry,
    /// The shared circuit breaker
    CircuitBreaker,
}

impl PolicyKey {
    /// Registry name of the policy
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::CircuitBreaker => "circuit-breaker",
        }
    }
}

impl fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a stored policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// A [`RetryPolicy`]
    Retry,
    /// A [`CircuitBreaker`]
    CircuitBreaker,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retry => f.write_str("retry"),
            Self::CircuitBreaker => f.write_str("circuit breaker"),
        }
    }
}

enum Policy<C: Clock> {
    Retry(Arc<RetryPolicy>),
    CircuitBreaker(Arc<CircuitBreaker<C>>),
}

impl<C: Clock> Policy<C> {
    fn kind(&self) -> PolicyKind {
        match self {
            Self::Retry(_) => PolicyKind::Retry,
            Self::CircuitBreaker(_) => PolicyKind::CircuitBreaker,
        }
    }
}

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The name holds a policy of another kind
    #[error("policy '{name}' is registered as a {found}, not a {expected}")]
    KindMismatch { name: String, expected: PolicyKind, found: PolicyKind },

    /// Nothing is registered under the name
    #[error("policy '{name}' is not registered")]
    Missing { name: String },

    /// The policy configuration failed validation
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Thread-safe store of named resilience policies
pub struct PolicyRegistry<C: Clock + Clone = SystemClock> {
    policies: DashMap<String, Policy<C>>,
    clock: C,
}

impl<C: Clock + Clone> fmt::Debug for PolicyRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.policies.iter().map(|entry| entry.key().clone()).collect();
        f.debug_struct("PolicyRegistry").field("policies", &names).finish()
    }
}

impl PolicyRegistry<SystemClock> {
    /// Empty registry on the system clock
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for PolicyRegistry<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock + Clone> PolicyRegistry<C> {
    /// Create a registry whose breakers read time from `clock`
    pub fn with_clock(clock: C) -> Self {
        Self { policies: DashMap::new(), clock }
    }

    /// Register the standard `retry` and `circuit-breaker` policies.
    ///
    /// Existing registrations are kept as they are.
    pub fn provision(
        &self,
        retry: RetryConfig,
        breaker: CircuitBreakerConfig,
    ) -> Result<ResiliencePipeline<C>, RegistryError> {
        let retry = self.retry_or_insert(PolicyKey::Retry.as_str(), retry)?;
        let breaker = self.circuit_breaker_or_insert(PolicyKey::CircuitBreaker.as_str(), breaker)?;
        Ok(ResiliencePipeline::new(retry, breaker))
    }

    /// Return the retry policy called `name`, registering it from `config`
    /// when absent.
    pub fn retry_or_insert(
        &self,
        name: &str,
        config: RetryConfig,
    ) -> Result<Arc<RetryPolicy>, RegistryError> {
        let policy = match self.policies.entry(name.to_owned()) {
            Entry::Occupied(entry) => entry.into_ref().downgrade(),
            Entry::Vacant(entry) => {
                let policy = RetryPolicy::new(name, config)?;
                debug!(policy = name, "Registered retry policy");
                entry.insert(Policy::Retry(Arc::new(policy))).downgrade()
            }
        };

        match policy.value() {
            Policy::Retry(retry) => Ok(Arc::clone(retry)),
            other => Err(RegistryError::KindMismatch {
                name: name.to_owned(),
                expected: PolicyKind::Retry,
                found: other.kind(),
            }),
        }
    }

    /// Return the circuit breaker called `name`, registering it from
    /// `config` when absent.
    pub fn circuit_breaker_or_insert(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
    ) -> Result<Arc<CircuitBreaker<C>>, RegistryError> {
        let policy = match self.policies.entry(name.to_owned()) {
            Entry::Occupied(entry) => entry.into_ref().downgrade(),
            Entry::Vacant(entry) => {
                let breaker = CircuitBreaker::with_clock(name, config, self.clock.clone())?;
                debug!(policy = name, "Registered circuit breaker policy");
                entry.insert(Policy::CircuitBreaker(Arc::new(breaker))).downgrade()
            }
        };

        match policy.value() {
            Policy::CircuitBreaker(breaker) => Ok(Arc::clone(breaker)),
            other => Err(RegistryError::KindMismatch {
                name: name.to_owned(),
                expected: PolicyKind::CircuitBreaker,
                found: other.kind(),
            }),
        }
    }

    /// Look up a registered retry policy
    pub fn retry(&self, name: &str) -> Result<Arc<RetryPolicy>, RegistryError> {
        let policy = self
            .policies
            .get(name)
            .ok_or_else(|| RegistryError::Missing { name: name.to_owned() })?;
        match policy.value() {
            Policy::Retry(retry) => Ok(Arc::clone(retry)),
            other => Err(RegistryError::KindMismatch {
                name: name.to_owned(),
                expected: PolicyKind::Retry,
                found: other.kind(),
            }),
        }
    }

    /// Look up a registered circuit breaker
    pub fn circuit_breaker(&self, name: &str) -> Result<Arc<CircuitBreaker<C>>, RegistryError> {
        let policy = self
            .policies
            .get(name)
            .ok_or_else(|| RegistryError::Missing { name: name.to_owned() })?;
        match policy.value() {
            Policy::CircuitBreaker(breaker) => Ok(Arc::clone(breaker)),
            other => Err(RegistryError::KindMismatch {
                name: name.to_owned(),
                expected: PolicyKind::CircuitBreaker,
                found: other.kind(),
            }),
        }
    }

    /// Build a pipeline from two registered policies
    pub fn pipeline(
        &self,
        retry: &str,
        breaker: &str,
    ) -> Result<ResiliencePipeline<C>, RegistryError> {
        Ok(ResiliencePipeline::new(self.retry(retry)?, self.circuit_breaker(breaker)?))
    }

    /// Whether any policy is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.policies.contains_key(name)
    }

    /// Number of registered policies
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether no policy is registered
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
