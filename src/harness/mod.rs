//! Probe harness: launches the server and drives the handshake.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Harness                             │
//! │                                                              │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │   │   Config    │───▶│  Sequencer  │───▶│  RunReport  │      │
//! │   └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                            │                                 │
//! │                            ▼                                 │
//! │   ┌──────────────────────────────────────────────────┐       │
//! │   │     ServerProcess (child stdin/stdout, JSON)     │       │
//! │   └──────────────────────────────────────────────────┘       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The server is terminated exactly once after the sequence returns,
//! whichever way it ended.

mod report;
mod sequencer;

pub use report::{RunOutcome, RunReport, ServerSummary, ToolInventory, ToolListing, ToolOutput};
pub use sequencer::{Phase, Sequencer, StepOutcome};

use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::mcp::transport::{ServerProcess, Transport};

/// Launches the configured server and runs the probe against it.
///
/// # Errors
///
/// Returns [`HarnessError::ExecutableNotFound`] or [`HarnessError::Spawn`]
/// if the server could not be started. Every later failure is recorded in
/// the returned report instead.
pub async fn run(config: &HarnessConfig) -> Result<RunReport, HarnessError> {
    info!(
        server = %config.server_path.display(),
        config = %config.server_config.display(),
        "Starting server"
    );
    let mut process = ServerProcess::spawn(&config.server_path, &config.server_args())?;

    Ok(drive(&mut process, config).await)
}

/// Runs the probe over an already-open transport, then terminates it.
pub async fn drive<T: Transport>(transport: &mut T, config: &HarnessConfig) -> RunReport {
    let report = Sequencer::new(transport, config).run().await;

    if let Err(e) = transport.terminate().await {
        warn!(error = %e, "Failed to terminate server");
    }

    report
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;

    use serde_json::{json, Value};

    use super::*;
    use crate::error::DecodeError;

    /// Replays canned response lines and records what was written.
    #[derive(Default)]
    struct ScriptedTransport {
        responses: VecDeque<io::Result<String>>,
        written: Vec<String>,
        reads: usize,
        terminations: usize,
    }

    impl ScriptedTransport {
        fn new(responses: &[Value]) -> Self {
            Self {
                responses: responses.iter().map(|v| Ok(v.to_string())).collect(),
                ..Self::default()
            }
        }

        fn with_raw(mut self, line: &str) -> Self {
            self.responses.push_back(Ok(line.to_string()));
            self
        }

        fn with_read_error(mut self, kind: io::ErrorKind) -> Self {
            self.responses.push_back(Err(io::Error::new(kind, "scripted read failure")));
            self
        }

        fn sent(&self) -> Vec<Value> {
            self.written
                .iter()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    impl Transport for ScriptedTransport {
        async fn write_line(&mut self, line: &str) -> io::Result<()> {
            assert!(!line.contains('\n'));
            self.written.push(line.to_string());
            Ok(())
        }

        async fn read_line(&mut self) -> io::Result<Option<String>> {
            self.reads += 1;
            self.responses.pop_front().transpose()
        }

        async fn terminate(&mut self) -> io::Result<()> {
            self.terminations += 1;
            Ok(())
        }
    }

    fn init_ok() -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "protocolVersion": "2024-11-05",
                "serverInfo": {"name": "proxmox-mcp-rs", "version": "0.1.0"},
                "capabilities": {"tools": {}}
            }
        })
    }

    fn tools_ok(names: &[&str]) -> Value {
        let tools: Vec<Value> = names.iter().map(|n| json!({"name": n})).collect();
        json!({"jsonrpc": "2.0", "id": 2, "result": {"tools": tools}})
    }

    fn call_ok(text: &str) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 3,
            "result": {"content": [{"type": "text", "text": text}]}
        })
    }

    #[tokio::test]
    async fn full_handshake_completes() {
        let config = HarnessConfig::default();
        let mut transport = ScriptedTransport::new(&[
            init_ok(),
            tools_ok(&["list_nodes", "list_vms"]),
            call_ok("node1 node2"),
        ]);

        let report = drive(&mut transport, &config).await;

        assert!(matches!(report.outcome, RunOutcome::Completed));
        assert_eq!(report.phase, Phase::Done);
        assert_eq!(report.tool_text(), Some("node1 node2"));
        assert_eq!(
            report.tool_listing,
            Some(ToolListing::Listed(ToolInventory {
                tool_names: vec!["list_nodes".to_string(), "list_vms".to_string()],
                required_present: true,
            }))
        );
        let Some(StepOutcome::Ok(summary)) = &report.initialize else {
            panic!("Expected initialize result");
        };
        assert_eq!(summary.name.as_deref(), Some("proxmox-mcp-rs"));
        assert_eq!(transport.terminations, 1);
    }

    #[tokio::test]
    async fn writes_expected_messages_in_order() {
        let config = HarnessConfig::default();
        let mut transport =
            ScriptedTransport::new(&[init_ok(), tools_ok(&["list_nodes"]), call_ok("ok")]);

        drive(&mut transport, &config).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 4);
        assert_eq!(
            sent[0],
            json!({
                "jsonrpc": "2.0",
                "method": "initialize",
                "params": {
                    "protocolVersion": "0.1.0",
                    "capabilities": {},
                    "clientInfo": {"name": "test-client", "version": "1.0"}
                },
                "id": 1
            })
        );
        assert_eq!(
            sent[1],
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
        );
        assert_eq!(
            sent[2],
            json!({"jsonrpc": "2.0", "method": "tools/list", "params": {}, "id": 2})
        );
        assert_eq!(
            sent[3],
            json!({
                "jsonrpc": "2.0",
                "method": "tools/call",
                "params": {"name": "list_nodes", "arguments": {}},
                "id": 3
            })
        );
    }

    #[tokio::test]
    async fn notification_is_not_followed_by_a_read() {
        let config = HarnessConfig::default();
        let mut transport =
            ScriptedTransport::new(&[init_ok(), tools_ok(&["list_nodes"]), call_ok("ok")]);

        drive(&mut transport, &config).await;

        // Three requests, three reads; the notification adds none.
        assert_eq!(transport.written.len(), 4);
        assert_eq!(transport.reads, 3);
    }

    #[tokio::test]
    async fn missing_required_tool_is_a_warning() {
        let config = HarnessConfig::default();
        let mut transport = ScriptedTransport::new(&[
            init_ok(),
            tools_ok(&["list_vms"]),
            call_ok("still called"),
        ]);

        let report = drive(&mut transport, &config).await;

        assert!(matches!(report.outcome, RunOutcome::Completed));
        let Some(ToolListing::Listed(inventory)) = &report.tool_listing else {
            panic!("Expected tool listing");
        };
        assert!(!inventory.required_present);
        assert_eq!(report.tool_text(), Some("still called"));
    }

    #[tokio::test]
    async fn empty_tool_list_reports_absence() {
        let config = HarnessConfig::default();
        let mut transport = ScriptedTransport::new(&[
            init_ok(),
            json!({"jsonrpc": "2.0", "id": 2, "result": {}}),
            call_ok("ok"),
        ]);

        let report = drive(&mut transport, &config).await;

        assert_eq!(
            report.tool_listing,
            Some(ToolListing::Listed(ToolInventory {
                tool_names: Vec::new(),
                required_present: false,
            }))
        );
        assert_eq!(report.phase, Phase::Done);
    }

    #[tokio::test]
    async fn tool_listing_error_does_not_abort() {
        let config = HarnessConfig::default();
        let mut transport = ScriptedTransport::new(&[
            init_ok(),
            json!({"jsonrpc": "2.0", "id": 2, "error": {"code": -32601, "message": "Method not found"}}),
            call_ok("ok"),
        ]);

        let report = drive(&mut transport, &config).await;

        let Some(ToolListing::Failed(Some(err))) = &report.tool_listing else {
            panic!("Expected failed listing");
        };
        assert_eq!(err.code, -32601);
        assert_eq!(report.tool_text(), Some("ok"));
        assert!(matches!(report.outcome, RunOutcome::Completed));
    }

    #[tokio::test]
    async fn tool_call_error_is_surfaced_not_raised() {
        let config = HarnessConfig::default();
        let mut transport = ScriptedTransport::new(&[
            init_ok(),
            tools_ok(&["list_nodes"]),
            json!({"jsonrpc": "2.0", "id": 3, "error": {"code": -32000, "message": "unreachable"}}),
        ]);

        let report = drive(&mut transport, &config).await;

        assert!(matches!(report.outcome, RunOutcome::Completed));
        let Some(StepOutcome::Soft(err)) = &report.tool_call else {
            panic!("Expected tool call error");
        };
        assert_eq!(err.code, -32000);
        assert_eq!(err.message, "unreachable");
        assert_eq!(transport.terminations, 1);
    }

    #[tokio::test]
    async fn initialize_error_stops_the_run() {
        let config = HarnessConfig::default();
        let mut transport = ScriptedTransport::new(&[json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32602, "message": "Unsupported protocol version"}
        })]);

        let report = drive(&mut transport, &config).await;

        assert!(matches!(report.outcome, RunOutcome::Stopped));
        assert!(matches!(report.initialize, Some(StepOutcome::Soft(_))));
        assert!(report.tool_listing.is_none());
        assert_eq!(transport.written.len(), 1);
        assert_eq!(transport.terminations, 1);
    }

    #[tokio::test]
    async fn closed_stream_before_initialize_is_no_response() {
        let config = HarnessConfig::default();
        let mut transport = ScriptedTransport::new(&[]);

        let report = drive(&mut transport, &config).await;

        assert!(matches!(
            report.failure(),
            Some(HarnessError::NoResponse {
                method: "initialize"
            })
        ));
        assert_eq!(report.phase, Phase::Failed);
        assert_eq!(report.failed_in, Some(Phase::Initializing));
        assert_eq!(transport.terminations, 1);
    }

    #[tokio::test]
    async fn malformed_line_fails_the_run() {
        let config = HarnessConfig::default();
        let mut transport = ScriptedTransport::new(&[init_ok()]).with_raw("this is not json");

        let report = drive(&mut transport, &config).await;

        assert!(matches!(
            report.failure(),
            Some(HarnessError::MalformedResponse {
                method: "tools/list",
                ..
            })
        ));
        assert_eq!(report.failed_in, Some(Phase::ListingTools));
        assert_eq!(transport.terminations, 1);
    }

    #[tokio::test]
    async fn empty_content_is_malformed_result() {
        let config = HarnessConfig::default();
        let mut transport = ScriptedTransport::new(&[
            init_ok(),
            tools_ok(&["list_nodes"]),
            json!({"jsonrpc": "2.0", "id": 3, "result": {"content": []}}),
        ]);

        let report = drive(&mut transport, &config).await;

        assert!(matches!(
            report.failure(),
            Some(HarnessError::MalformedResult {
                method: "tools/call",
                ..
            })
        ));
        assert_eq!(report.failed_in, Some(Phase::CallingTool));
        assert_eq!(transport.terminations, 1);
    }

    #[tokio::test]
    async fn mismatched_id_fails_the_run() {
        let config = HarnessConfig::default();
        let mut transport = ScriptedTransport::new(&[json!({
            "jsonrpc": "2.0",
            "id": 7,
            "result": {}
        })]);

        let report = drive(&mut transport, &config).await;

        let Some(HarnessError::UnexpectedId { expected, actual }) = report.failure() else {
            panic!("Expected id mismatch");
        };
        assert_eq!(expected, "1");
        assert_eq!(actual, "7");
    }

    #[tokio::test]
    async fn configured_tool_and_arguments_are_sent() {
        let mut config = HarnessConfig::default();
        config.required_tool = "list_vms".to_string();
        config.tool_arguments = json!({"node": "pve1"});
        let mut transport =
            ScriptedTransport::new(&[init_ok(), tools_ok(&["list_vms"]), call_ok("100 101")]);

        let report = drive(&mut transport, &config).await;

        assert_eq!(
            transport.sent()[3]["params"],
            json!({"name": "list_vms", "arguments": {"node": "pve1"}})
        );
        let Some(ToolListing::Listed(inventory)) = &report.tool_listing else {
            panic!("Expected tool listing");
        };
        assert!(inventory.required_present);
    }

    #[tokio::test]
    async fn tool_listing_error_without_code_is_a_soft_failure() {
        let config = HarnessConfig::default();
        let mut transport = ScriptedTransport::new(&[init_ok()])
            .with_raw(r#"{"jsonrpc":"2.0","id":2,"error":{"message":"tools disabled"}}"#)
            .with_raw(&call_ok("ok").to_string());

        let report = drive(&mut transport, &config).await;

        assert!(matches!(report.outcome, RunOutcome::Completed));
        let Some(ToolListing::Failed(Some(err))) = &report.tool_listing else {
            panic!("Expected failed tool listing with error");
        };
        assert_eq!(err.message, "tools disabled");
        assert_eq!(report.tool_text(), Some("ok"));
        assert_eq!(transport.terminations, 1);
    }

    #[tokio::test]
    async fn string_error_to_initialize_stops_the_run() {
        let config = HarnessConfig::default();
        let mut transport = ScriptedTransport::default()
            .with_raw(r#"{"jsonrpc":"2.0","id":1,"error":"unsupported"}"#);

        let report = drive(&mut transport, &config).await;

        assert!(matches!(report.outcome, RunOutcome::Stopped));
        let Some(StepOutcome::Soft(err)) = &report.initialize else {
            panic!("Expected initialize error");
        };
        assert_eq!(err.message, "unsupported");
        assert_eq!(transport.written.len(), 1);
        assert_eq!(transport.terminations, 1);
    }

    #[tokio::test]
    async fn tool_listing_without_result_continues() {
        let config = HarnessConfig::default();
        let mut transport = ScriptedTransport::new(&[
            init_ok(),
            json!({"jsonrpc": "2.0", "id": 2}),
            call_ok("ok"),
        ]);

        let report = drive(&mut transport, &config).await;

        assert!(matches!(report.outcome, RunOutcome::Completed));
        assert!(matches!(report.tool_listing, Some(ToolListing::Failed(None))));
        assert_eq!(transport.written.len(), 4);
        assert_eq!(transport.terminations, 1);
    }

    #[tokio::test]
    async fn initialize_without_result_is_malformed() {
        let config = HarnessConfig::default();
        let mut transport = ScriptedTransport::new(&[json!({"jsonrpc": "2.0", "id": 1})]);

        let report = drive(&mut transport, &config).await;

        assert!(matches!(
            report.failure(),
            Some(HarnessError::MalformedResult {
                method: "initialize",
                ..
            })
        ));
        assert_eq!(report.failed_in, Some(Phase::Initializing));
        assert_eq!(transport.written.len(), 1);
        assert_eq!(transport.terminations, 1);
    }

    #[tokio::test]
    async fn invalid_utf8_is_malformed_response() {
        let config = HarnessConfig::default();
        let mut transport =
            ScriptedTransport::new(&[init_ok()]).with_read_error(io::ErrorKind::InvalidData);

        let report = drive(&mut transport, &config).await;

        assert!(matches!(
            report.failure(),
            Some(HarnessError::MalformedResponse {
                method: "tools/list",
                source: DecodeError::InvalidUtf8,
            })
        ));
        assert_eq!(report.failed_in, Some(Phase::ListingTools));
        assert_eq!(transport.terminations, 1);
    }

    #[tokio::test]
    async fn other_read_errors_stay_io() {
        let config = HarnessConfig::default();
        let mut transport =
            ScriptedTransport::default().with_read_error(io::ErrorKind::BrokenPipe);

        let report = drive(&mut transport, &config).await;

        assert!(matches!(report.failure(), Some(HarnessError::Io(_))));
        assert_eq!(transport.terminations, 1);
    }
}
