//! Configuration loading and management
//!
//! This module provides utilities for loading worker configuration from
//! files and environment variables.

pub mod loader;

// Re-export commonly used items
pub use loader::{apply_env_overrides, discover_config_path, load, load_from_file, parse_config};
