//! Logging subscriber initialization
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Standard filter directives (default `tally=info`)
//! - `TALLY_LOG_FORMAT`: `json`, `pretty` or `compact` (default `compact`)

use std::str::FromStr;
use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

const DEFAULT_FILTER: &str = "tally=info";

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, for log shippers
    Json,
    /// Multi-line human readable output
    Pretty,
    /// Single-line human readable output
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" | "" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl LogFormat {
    /// Format selected by `TALLY_LOG_FORMAT`, falling back to the default
    pub fn from_env() -> Self {
        std::env::var("TALLY_LOG_FORMAT").ok().and_then(|raw| raw.parse().ok()).unwrap_or_default()
    }
}

/// Initialize logging with the format chosen by the environment.
pub fn init() {
    init_logging(LogFormat::from_env());
}

/// Initialize logging once; later calls are no-ops.
///
/// An already installed global subscriber (for example from a test harness)
/// is left in place.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let registry = tracing_subscriber::registry().with(env_filter);

        let installed = match format {
            LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
            LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
            LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
        };

        if installed.is_err() {
            tracing::debug!("Global subscriber already installed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_format() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert_eq!("".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_init_is_idempotent() {
        init_logging(LogFormat::Compact);
        init_logging(LogFormat::Json);
        tracing::info!(account_id = "test", "logging initialized");
    }
}
