//! Configuration loader
//!
//! Loads worker configuration from a file, then layers environment variable
//! overrides on top.
//!
//! ## Loading Strategy
//! 1. If `TALLY_CONFIG` is set, load that file (it must exist)
//! 2. Otherwise search the standard locations for a config file
//! 3. Fall back to built-in defaults when no file is found
//! 4. Apply `TALLY_*` environment overrides
//! 5. Validate the result
//!
//! ## Environment Variables
//! - `TALLY_CONFIG`: Path to a JSON or TOML config file
//! - `TALLY_DELETE_AFTER_UPDATES`: Counter value that triggers deletion
//! - `TALLY_POLL_INTERVAL`: Pause between cycles (`1500`, `"2s"`)
//! - `TALLY_RETRY_MAX_ATTEMPTS`: Total attempts per call
//! - `TALLY_RETRY_BASE_DELAY`: Lower bound of retry backoff
//! - `TALLY_RETRY_MAX_DELAY`: Upper bound of retry backoff
//! - `TALLY_BREAKER_FAILURE_THRESHOLD`: Consecutive failures that open the
//!   circuit
//! - `TALLY_BREAKER_OPEN_DURATION`: Time the circuit stays open
//! - `TALLY_BASE_URL`: Resource server base URL
//! - `TALLY_REQUEST_TIMEOUT`: Per-request timeout
//!
//! ## File Locations
//! The loader searches the following paths (in order, current working
//! directory first, then next to the executable):
//! 1. `tally.toml`
//! 2. `tally.json`
//! 3. `config.toml`
//! 4. `config.json`

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tally_common::duration_millis::parse_duration;
use tally_domain::{Result, TallyConfig, TallyError};

const CONFIG_FILE_NAMES: [&str; 4] = ["tally.toml", "tally.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `TallyError::Config` if:
/// - `TALLY_CONFIG` points to a missing or unreadable file
/// - File format is invalid
/// - An override variable has an invalid value
/// - The merged configuration fails validation
pub fn load() -> Result<TallyConfig> {
    let mut config = match std::env::var_os("TALLY_CONFIG") {
        Some(path) => load_from_file(Some(PathBuf::from(path)))?,
        None => match discover_config_path() {
            Some(path) => load_from_file(Some(path))?,
            None => {
                tracing::info!("No config file found, using defaults");
                TallyConfig::default()
            }
        },
    };

    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, searches the standard locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `TallyError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<TallyConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(TallyError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => discover_config_path().ok_or_else(|| {
            TallyError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| TallyError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
///
/// # Errors
/// Returns `TallyError::Config` if format is invalid or parsing fails.
pub fn parse_config(contents: &str, path: &Path) -> Result<TallyConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| TallyError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| TallyError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(TallyError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Find the first configuration file in the standard paths
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn discover_config_path() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(CONFIG_FILE_NAMES.iter().map(|name| cwd.join(name)));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(CONFIG_FILE_NAMES.iter().map(|name| exe_dir.join(name)));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Apply `TALLY_*` environment overrides from the process environment
///
/// # Errors
/// Returns `TallyError::Config` naming the variable with an invalid value.
pub fn apply_env_overrides(config: &mut TallyConfig) -> Result<()> {
    apply_overrides(config, |key| std::env::var(key).ok())
}

/// Apply overrides read through `lookup`
///
/// # Errors
/// Returns `TallyError::Config` naming the variable with an invalid value.
pub fn apply_overrides<F>(config: &mut TallyConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let lifecycle = &mut config.lifecycle;
    override_parsed(&lookup, "TALLY_DELETE_AFTER_UPDATES", &mut lifecycle.delete_after_updates)?;
    override_duration(&lookup, "TALLY_POLL_INTERVAL", &mut lifecycle.poll_interval)?;

    let policies = &mut config.http_policies;
    override_parsed(&lookup, "TALLY_RETRY_MAX_ATTEMPTS", &mut policies.retry_max_attempts)?;
    override_duration(&lookup, "TALLY_RETRY_BASE_DELAY", &mut policies.retry_base_delay)?;
    override_duration(&lookup, "TALLY_RETRY_MAX_DELAY", &mut policies.retry_max_delay)?;
    override_parsed(
        &lookup,
        "TALLY_BREAKER_FAILURE_THRESHOLD",
        &mut policies.breaker_failure_threshold,
    )?;
    override_duration(&lookup, "TALLY_BREAKER_OPEN_DURATION", &mut policies.breaker_open_duration)?;

    let client = &mut config.api_client;
    if let Some(base_url) = lookup("TALLY_BASE_URL") {
        client.base_url = base_url;
    }
    override_duration(&lookup, "TALLY_REQUEST_TIMEOUT", &mut client.timeout)?;

    Ok(())
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| TallyError::Config(format!("Invalid value for {key}: {e}")))?;
        tracing::debug!(variable = key, "Applied environment override");
    }
    Ok(())
}

fn override_duration<F>(lookup: &F, key: &str, target: &mut Duration) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = parse_duration(&raw)
            .map_err(|e| TallyError::Config(format!("Invalid value for {key}: {e}")))?;
        tracing::debug!(variable = key, "Applied environment override");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_overrides_replace_only_named_fields() {
        let mut config = TallyConfig::default();
        let lookup = lookup_from(&[
            ("TALLY_DELETE_AFTER_UPDATES", "4"),
            ("TALLY_BREAKER_OPEN_DURATION", "3s"),
            ("TALLY_BASE_URL", "http://accounts.internal/v1.0"),
            ("TALLY_POLL_INTERVAL", "250"),
        ]);

        apply_overrides(&mut config, lookup).expect("overrides apply");

        assert_eq!(config.lifecycle.delete_after_updates, 4);
        assert_eq!(config.lifecycle.poll_interval, Duration::from_millis(250));
        assert_eq!(config.http_policies.breaker_open_duration, Duration::from_secs(3));
        assert_eq!(config.api_client.base_url, "http://accounts.internal/v1.0");
        assert_eq!(config.http_policies.retry_max_attempts, 7);
    }

    #[test]
    fn test_invalid_override_names_variable() {
        let mut config = TallyConfig::default();
        let lookup = lookup_from(&[("TALLY_RETRY_MAX_ATTEMPTS", "many")]);

        match apply_overrides(&mut config, lookup) {
            Err(TallyError::Config(message)) => {
                assert!(message.contains("TALLY_RETRY_MAX_ATTEMPTS"), "{message}");
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_duration_override() {
        let mut config = TallyConfig::default();
        let lookup = lookup_from(&[("TALLY_REQUEST_TIMEOUT", "soon")]);
        assert!(apply_overrides(&mut config, lookup).is_err());
    }

    #[test]
    fn test_parse_config_by_extension() {
        let toml = parse_config("[lifecycle]\ndelete_after_updates = 2\n", Path::new("tally.toml"))
            .expect("toml");
        assert_eq!(toml.lifecycle.delete_after_updates, 2);

        let json = parse_config(r#"{"lifecycle":{"delete_after_updates":5}}"#, Path::new("c.json"))
            .expect("json");
        assert_eq!(json.lifecycle.delete_after_updates, 5);

        assert!(parse_config("", Path::new("tally.yaml")).is_err());
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/tally.toml")));
        assert!(matches!(result, Err(TallyError::Config(_))));
    }
}
