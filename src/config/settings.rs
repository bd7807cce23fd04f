//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
/// Every field has a default, so `{}` is a complete configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Path to the server executable under test.
    #[serde(default = "default_server_path")]
    pub server_path: PathBuf,

    /// Config file handed to the server as `--config <path>`.
    #[serde(default = "default_server_config")]
    pub server_config: PathBuf,

    /// Protocol version string sent in `initialize`.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,

    /// Client identification sent in `initialize`.
    #[serde(default)]
    pub client_info: ClientInfoConfig,

    /// Tool that must be listed and is then invoked.
    #[serde(default = "default_required_tool")]
    pub required_tool: String,

    /// Arguments for the tool call. Must be a JSON object.
    #[serde(default = "default_tool_arguments")]
    pub tool_arguments: Value,

    /// Per-response timeout in seconds. Absent means wait forever.
    #[serde(default)]
    pub response_timeout_secs: Option<u64>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            _schema: None,
            _comment: None,
            server_path: default_server_path(),
            server_config: default_server_config(),
            protocol_version: default_protocol_version(),
            client_info: ClientInfoConfig::default(),
            required_tool: default_required_tool(),
            tool_arguments: default_tool_arguments(),
            response_timeout_secs: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.required_tool.trim().is_empty() {
            return Err(invalid("required_tool cannot be empty"));
        }
        if self.protocol_version.trim().is_empty() {
            return Err(invalid("protocol_version cannot be empty"));
        }
        if self.client_info.name.trim().is_empty() {
            return Err(invalid("client_info.name cannot be empty"));
        }
        if !self.tool_arguments.is_object() {
            return Err(invalid("tool_arguments must be a JSON object"));
        }
        if self.response_timeout_secs == Some(0) {
            return Err(invalid("response_timeout_secs must be greater than zero"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            });
        }
        Ok(())
    }

    /// Returns the per-response timeout, if one is configured.
    #[must_use]
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_secs.map(Duration::from_secs)
    }

    /// Returns the arguments the server is launched with.
    #[must_use]
    pub fn server_args(&self) -> Vec<OsString> {
        vec![
            OsString::from("--config"),
            self.server_config.clone().into_os_string(),
        ]
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError {
        message: message.to_string(),
    }
}

fn default_server_path() -> PathBuf {
    PathBuf::from("./target/debug/proxmox-mcp-rs")
}

fn default_server_config() -> PathBuf {
    PathBuf::from("./config.toml")
}

fn default_protocol_version() -> String {
    "0.1.0".to_string()
}

fn default_required_tool() -> String {
    "list_nodes".to_string()
}

fn default_tool_arguments() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Client identification for the `initialize` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientInfoConfig {
    /// Client name.
    #[serde(default = "default_client_name")]
    pub name: String,

    /// Client version.
    #[serde(default = "default_client_version")]
    pub version: String,
}

impl Default for ClientInfoConfig {
    fn default() -> Self {
        Self {
            name: default_client_name(),
            version: default_client_version(),
        }
    }
}

fn default_client_name() -> String {
    "test-client".to_string()
}

fn default_client_version() -> String {
    "1.0".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
