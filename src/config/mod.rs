//! Configuration file loading and parsing.
//!
//! This module handles loading the probe configuration file from disk and
//! parsing it into validated, type-safe structures.
//!
//! # Configuration File Locations
//!
//! The configuration file is resolved in the following order:
//!
//! 1. Path specified via `--harness-config` CLI flag
//! 2. Default location, if the file exists:
//!    - **Linux/macOS:** `~/.mcp-stdio-probe/config.json`
//!    - **Windows:** `%USERPROFILE%\.mcp-stdio-probe\config.json`
//! 3. Built-in defaults
//!
//! CLI flags are applied on top of whatever was loaded.

mod settings;

pub use settings::{ClientInfoConfig, HarnessConfig, LoggingConfig};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.mcp-stdio-probe/`
/// - **Windows:** `%USERPROFILE%\.mcp-stdio-probe\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".mcp-stdio-probe"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads and parses the configuration file.
///
/// If `path` is `None`, the default location is used when a file exists
/// there; otherwise the built-in defaults are returned.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly named configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - Fields are invalid
pub fn load_config(path: Option<&Path>) -> Result<HarnessConfig, ConfigError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound {
                    path: p.to_path_buf(),
                });
            }
            p.to_path_buf()
        }
        None => match default_config_path().filter(|p| p.exists()) {
            Some(p) => p,
            None => return Ok(HarnessConfig::default()),
        },
    };

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;

    let config: HarnessConfig =
        serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: config_path.clone(),
            source: e,
        })?;

    // Validate the configuration
    config.validate()?;

    Ok(config)
}
