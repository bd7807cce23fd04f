//! Error types for mcp-stdio-probe.
//!
//! Two families of errors exist:
//!
//! - [`ConfigError`] for loading and validating the probe configuration.
//! - [`HarnessError`] for hard failures while driving the server under test.
//!
//! A JSON-RPC `error` object returned by the server is *not* a Rust error.
//! It is reported as data through [`crate::harness::StepOutcome::Soft`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Reasons a single response line could not be decoded.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The line was empty.
    #[error("empty response line")]
    Empty,

    /// The line was not valid JSON.
    #[error("invalid JSON")]
    Json(#[from] serde_json::Error),

    /// The line was not valid UTF-8.
    #[error("response line is not valid UTF-8")]
    InvalidUtf8,

    /// The line was JSON but not a JSON-RPC 2.0 response.
    #[error("not a JSON-RPC 2.0 response: {0}")]
    NotAResponse(&'static str),
}

/// Hard failures while driving the server under test.
///
/// Every variant ends the run. The server process is still terminated.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// The server executable does not exist.
    #[error("server executable not found: {path}")]
    ExecutableNotFound {
        /// Path that was checked.
        path: PathBuf,
    },

    /// The OS refused to start the server process.
    #[error("failed to spawn server: {path}")]
    Spawn {
        /// Path of the executable.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Reading from or writing to the server pipes failed.
    #[error("server pipe I/O failed")]
    Io(#[from] std::io::Error),

    /// The server closed its stdout where a response was expected.
    #[error("no response from server to `{method}`")]
    NoResponse {
        /// Method of the unanswered request.
        method: &'static str,
    },

    /// The response line could not be decoded.
    #[error("malformed response to `{method}`")]
    MalformedResponse {
        /// Method of the request being answered.
        method: &'static str,
        /// What was wrong with the line.
        #[source]
        source: DecodeError,
    },

    /// The response did not echo the request id.
    #[error("response id mismatch: expected {expected}, got {actual}")]
    UnexpectedId {
        /// The id that was sent.
        expected: String,
        /// The id that came back (`null` if absent).
        actual: String,
    },

    /// A successful response lacked the fields the method requires.
    #[error("malformed `{method}` result: {reason}")]
    MalformedResult {
        /// Method of the request being answered.
        method: &'static str,
        /// Which field was missing or mistyped.
        reason: String,
    },

    /// No response line arrived within the configured timeout.
    #[error("timed out after {after:?} waiting for `{method}` response")]
    Timeout {
        /// Method of the unanswered request.
        method: &'static str,
        /// The configured timeout.
        after: Duration,
    },
}

impl HarnessError {
    /// Returns `true` if the error happened before any protocol traffic.
    #[must_use]
    pub const fn is_pre_launch(&self) -> bool {
        matches!(self, Self::ExecutableNotFound { .. } | Self::Spawn { .. })
    }
}
