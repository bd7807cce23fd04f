//! mcp-stdio-probe: conformance probe for MCP servers speaking stdio
//!
//! This library launches an MCP server as a child process and drives it
//! through a fixed conversation over its stdin/stdout:
//!
//! 1. `initialize` request
//! 2. `notifications/initialized` notification
//! 3. `tools/list` request, checking for a required tool
//! 4. `tools/call` request for that tool
//!
//! Each response is checked for shape and id, and the outcome of every
//! step is collected in a [`harness::RunReport`]. The server is always
//! terminated before the run returns.
//!
//! # Modules
//!
//! - [`config`] — Configuration loading and validation
//! - [`error`] — Error types
//! - [`harness`] — Handshake sequencer and run report
//! - [`mcp`] — JSON-RPC message codec and stdio transport

pub mod config;
pub mod error;
pub mod harness;
pub mod mcp;
