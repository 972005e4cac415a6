//! Configuration model
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a runnable configuration. Durations are written as
//! milliseconds or unit-suffixed strings (`"10s"`).

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally_common::duration_millis;
use url::Url;

use crate::constants::{
    API_HEADER_KEY, API_HEADER_VALUE, DEFAULT_BASE_URL, DEFAULT_BREAKER_FAILURE_THRESHOLD,
    DEFAULT_BREAKER_OPEN_DURATION_MS, DEFAULT_DELETE_AFTER_UPDATES, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_ATTEMPTS,
    DEFAULT_RETRY_MAX_DELAY_MS,
};
use crate::errors::{Result, TallyError};

/// Top-level worker configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    /// Reconciliation rules and cadence
    pub lifecycle: LifecycleConfig,
    /// Retry and breaker policies shared by all calls
    pub http_policies: HttpPoliciesConfig,
    /// Resource server endpoint
    pub api_client: ApiClientConfig,
}

impl TallyConfig {
    /// Reject values the worker cannot run with.
    ///
    /// # Errors
    /// Returns `TallyError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.lifecycle.validate()?;
        self.http_policies.validate()?;
        self.api_client.validate()
    }
}

/// Account lifecycle policy and loop pacing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Counter value at which an account is deleted instead of updated
    pub delete_after_updates: u32,
    /// Pause between two reconciliation cycles
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            delete_after_updates: DEFAULT_DELETE_AFTER_UPDATES,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl LifecycleConfig {
    fn validate(&self) -> Result<()> {
        if self.delete_after_updates == 0 {
            return Err(TallyError::Config(
                "lifecycle.delete_after_updates must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Retry and circuit breaker parameters for outbound HTTP calls
///
/// When `breaker_failure_threshold` is lower than `retry_max_attempts` the
/// circuit opens before retries run out, and the remaining attempts fail
/// fast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpPoliciesConfig {
    /// Total attempts per logical call, the first one included
    pub retry_max_attempts: u32,
    /// Lower bound of each backoff delay
    #[serde(with = "duration_millis")]
    pub retry_base_delay: Duration,
    /// Upper bound of each backoff delay
    #[serde(with = "duration_millis")]
    pub retry_max_delay: Duration,
    /// Consecutive transient failures that open the circuit
    pub breaker_failure_threshold: u32,
    /// Time the circuit stays open before a trial call
    #[serde(with = "duration_millis")]
    pub breaker_open_duration: Duration,
}

impl Default for HttpPoliciesConfig {
    fn default() -> Self {
        Self {
            retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            retry_max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
            breaker_failure_threshold: DEFAULT_BREAKER_FAILURE_THRESHOLD,
            breaker_open_duration: Duration::from_millis(DEFAULT_BREAKER_OPEN_DURATION_MS),
        }
    }
}

impl HttpPoliciesConfig {
    fn validate(&self) -> Result<()> {
        if self.retry_max_attempts == 0 {
            return Err(TallyError::Config(
                "http_policies.retry_max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.retry_max_delay < self.retry_base_delay {
            return Err(TallyError::Config(
                "http_policies.retry_max_delay must not be shorter than retry_base_delay"
                    .to_string(),
            ));
        }
        if self.breaker_failure_threshold == 0 {
            return Err(TallyError::Config(
                "http_policies.breaker_failure_threshold must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP client settings for the resource server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiClientConfig {
    /// Absolute base URL; resource paths are appended to it
    pub base_url: String,
    /// Per-request timeout
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Headers sent with every request
    pub headers: BTreeMap<String, String>,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            headers: BTreeMap::from([(API_HEADER_KEY.to_string(), API_HEADER_VALUE.to_string())]),
        }
    }
}

impl ApiClientConfig {
    /// Parsed base URL
    ///
    /// # Errors
    /// Returns `TallyError::Config` when the URL is not absolute http(s).
    pub fn parsed_base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            TallyError::Config(format!("api_client.base_url '{}' is invalid: {e}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TallyError::Config(format!(
                "api_client.base_url '{}' must use http or https",
                self.base_url
            )));
        }
        Ok(url)
    }

    fn validate(&self) -> Result<()> {
        self.parsed_base_url()?;
        if self.timeout.is_zero() {
            return Err(TallyError::Config(
                "api_client.timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
