//! What a probe run observed.

use serde_json::Value;

use crate::error::HarnessError;
use crate::harness::sequencer::{Phase, StepOutcome};
use crate::mcp::protocol::JsonRpcErrorObject;

/// Server identification taken from the `initialize` result.
///
/// Fields are optional: the probe records what the server sent and does
/// not negotiate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerSummary {
    /// `result.protocolVersion`.
    pub protocol_version: Option<String>,
    /// `result.serverInfo.name`.
    pub name: Option<String>,
    /// `result.serverInfo.version`.
    pub version: Option<String>,
}

impl ServerSummary {
    pub(crate) fn from_result(result: &Value) -> Self {
        let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);
        let info = result.get("serverInfo");
        Self {
            protocol_version: text(result.get("protocolVersion")),
            name: text(info.and_then(|i| i.get("name"))),
            version: text(info.and_then(|i| i.get("version"))),
        }
    }
}

/// Tools reported by `tools/list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInventory {
    /// Tool names in the order the server listed them.
    pub tool_names: Vec<String>,
    /// Whether the required tool was among them.
    pub required_present: bool,
}

/// Outcome of `tools/list`. Neither variant aborts the run.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolListing {
    /// The server returned a `result`.
    Listed(ToolInventory),
    /// The server returned no `result`; the error object, if it sent one.
    Failed(Option<JsonRpcErrorObject>),
}

/// First content item of a `tools/call` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// `result.content[0].text`.
    pub text: String,
    /// `result.isError`, false when absent.
    pub is_error: bool,
}

/// How the run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every step ran.
    Completed,
    /// `initialize` returned an error, so nothing further was sent.
    Stopped,
    /// A hard failure ended the run.
    Failed(HarnessError),
}

/// Everything one run observed.
#[derive(Debug)]
pub struct RunReport {
    /// Phase the sequencer finished in.
    pub phase: Phase,
    /// Phase that was active when a hard failure hit.
    pub failed_in: Option<Phase>,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// `initialize` result or error.
    pub initialize: Option<StepOutcome<ServerSummary>>,
    /// `tools/list` outcome.
    pub tool_listing: Option<ToolListing>,
    /// `tools/call` output or error.
    pub tool_call: Option<StepOutcome<ToolOutput>>,
}

impl RunReport {
    pub(crate) const fn new() -> Self {
        Self {
            phase: Phase::NotStarted,
            failed_in: None,
            outcome: RunOutcome::Completed,
            initialize: None,
            tool_listing: None,
            tool_call: None,
        }
    }

    /// Returns the hard failure, if the run had one.
    #[must_use]
    pub const fn failure(&self) -> Option<&HarnessError> {
        match &self.outcome {
            RunOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the tool output text, if the call succeeded.
    #[must_use]
    pub fn tool_text(&self) -> Option<&str> {
        match &self.tool_call {
            Some(StepOutcome::Ok(output)) => Some(output.text.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn server_summary_reads_initialize_result() {
        let summary = ServerSummary::from_result(&json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": {"name": "proxmox-mcp-rs", "version": "0.1.0"},
            "capabilities": {"tools": {}}
        }));
        assert_eq!(summary.protocol_version.as_deref(), Some("2024-11-05"));
        assert_eq!(summary.name.as_deref(), Some("proxmox-mcp-rs"));
        assert_eq!(summary.version.as_deref(), Some("0.1.0"));
    }

    #[test]
    fn server_summary_tolerates_missing_fields() {
        assert_eq!(ServerSummary::from_result(&json!({})), ServerSummary::default());
        assert_eq!(ServerSummary::from_result(&Value::Null), ServerSummary::default());
    }
}
