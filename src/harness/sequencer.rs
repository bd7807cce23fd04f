//! The handshake state machine.
//!
//! The sequencer moves strictly forward through [`Phase`]:
//!
//! ```text
//! NotStarted -> Initializing -> InitializedSent -> ListingTools -> CallingTool -> Done
//!      \______________\________________\_______________\______________\-> Failed
//! ```
//!
//! Each request is written, then exactly one line is read before anything
//! else is sent. The `initialized` notification is never answered, so no
//! read follows it.

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::HarnessConfig;
use crate::error::{DecodeError, HarnessError};
use crate::harness::report::{
    RunOutcome, RunReport, ServerSummary, ToolInventory, ToolListing, ToolOutput,
};
use crate::mcp::protocol::{
    decode_response, encode, methods, JsonRpcErrorObject, RequestIdCounter, ResponsePayload,
};
use crate::mcp::transport::Transport;

/// Sequencer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Nothing sent yet.
    NotStarted,
    /// `initialize` sent, awaiting its response.
    Initializing,
    /// `notifications/initialized` sent.
    InitializedSent,
    /// `tools/list` sent, awaiting its response.
    ListingTools,
    /// `tools/call` sent, awaiting its response.
    CallingTool,
    /// All steps ran.
    Done,
    /// A hard failure ended the run.
    Failed,
}

/// Result of one protocol step that the server answered.
///
/// Hard failures travel separately as `Err(HarnessError)`.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<T> {
    /// The server returned a usable `result`.
    Ok(T),
    /// The server returned a JSON-RPC `error`.
    Soft(JsonRpcErrorObject),
}

enum SequenceEnd {
    Completed,
    Stopped,
}

/// Drives one server through the handshake.
pub struct Sequencer<'a, T> {
    transport: &'a mut T,
    config: &'a HarnessConfig,
    ids: RequestIdCounter,
    phase: Phase,
}

impl<'a, T: Transport> Sequencer<'a, T> {
    /// Creates a sequencer over `transport`.
    pub fn new(transport: &'a mut T, config: &'a HarnessConfig) -> Self {
        Self {
            transport,
            config,
            ids: RequestIdCounter::new(),
            phase: Phase::NotStarted,
        }
    }

    /// Runs every step and reports what happened.
    ///
    /// Hard failures are caught here, once, and recorded in the report.
    /// The transport is left open; the caller terminates it.
    pub async fn run(&mut self) -> RunReport {
        let mut report = RunReport::new();

        match self.sequence(&mut report).await {
            Ok(SequenceEnd::Completed) => {
                self.advance(Phase::Done);
                report.outcome = RunOutcome::Completed;
            }
            Ok(SequenceEnd::Stopped) => {
                report.outcome = RunOutcome::Stopped;
            }
            Err(e) => {
                error!(phase = ?self.phase, error = %e, "Probe failed");
                report.failed_in = Some(self.phase);
                self.advance(Phase::Failed);
                report.outcome = RunOutcome::Failed(e);
            }
        }

        report.phase = self.phase;
        report
    }

    async fn sequence(&mut self, report: &mut RunReport) -> Result<SequenceEnd, HarnessError> {
        self.advance(Phase::Initializing);
        let init = self.initialize().await?;
        let stop = matches!(init, StepOutcome::Soft(_));
        report.initialize = Some(init);
        if stop {
            return Ok(SequenceEnd::Stopped);
        }

        self.notify(methods::INITIALIZED).await?;
        self.advance(Phase::InitializedSent);

        self.advance(Phase::ListingTools);
        report.tool_listing = Some(self.list_tools().await?);

        self.advance(Phase::CallingTool);
        report.tool_call = Some(self.call_tool().await?);

        Ok(SequenceEnd::Completed)
    }

    async fn initialize(&mut self) -> Result<StepOutcome<ServerSummary>, HarnessError> {
        let params = json!({
            "protocolVersion": self.config.protocol_version,
            "capabilities": {},
            "clientInfo": {
                "name": self.config.client_info.name,
                "version": self.config.client_info.version,
            },
        });

        match self.request(methods::INITIALIZE, params).await? {
            ResponsePayload::Error(err) => {
                warn!(error = %err, "Server returned error to initialize");
                Ok(StepOutcome::Soft(err))
            }
            ResponsePayload::Result(result) => {
                let summary = ServerSummary::from_result(&result);
                info!(
                    server = summary.name.as_deref().unwrap_or("<unnamed>"),
                    version = summary.version.as_deref().unwrap_or("<unknown>"),
                    protocol_version = summary.protocol_version.as_deref().unwrap_or("<unset>"),
                    "Received initialize response"
                );
                Ok(StepOutcome::Ok(summary))
            }
            ResponsePayload::Missing => Err(HarnessError::MalformedResult {
                method: methods::INITIALIZE,
                reason: "response has neither result nor error".to_string(),
            }),
        }
    }

    async fn list_tools(&mut self) -> Result<ToolListing, HarnessError> {
        let result = match self.request(methods::TOOLS_LIST, json!({})).await? {
            ResponsePayload::Result(result) => result,
            ResponsePayload::Error(err) => {
                warn!(error = %err, "Error listing tools");
                return Ok(ToolListing::Failed(Some(err)));
            }
            ResponsePayload::Missing => {
                warn!("Error listing tools: response has no result");
                return Ok(ToolListing::Failed(None));
            }
        };

        let tool_names = tool_names(&result)?;
        let required = self.config.required_tool.as_str();
        let required_present = tool_names.iter().any(|name| name == required);

        info!(count = tool_names.len(), "Listed tools");
        if required_present {
            info!(tool = required, "Required tool is present");
        } else {
            warn!(tool = required, "Required tool is missing");
        }

        Ok(ToolListing::Listed(ToolInventory {
            tool_names,
            required_present,
        }))
    }

    async fn call_tool(&mut self) -> Result<StepOutcome<ToolOutput>, HarnessError> {
        let params = json!({
            "name": self.config.required_tool,
            "arguments": self.config.tool_arguments,
        });

        match self.request(methods::TOOLS_CALL, params).await? {
            ResponsePayload::Result(result) => {
                let output = tool_output(&result)?;
                info!(
                    tool = %self.config.required_tool,
                    is_error = output.is_error,
                    "Tool returned content"
                );
                Ok(StepOutcome::Ok(output))
            }
            ResponsePayload::Error(err) => {
                warn!(tool = %self.config.required_tool, error = %err, "Tool call returned error");
                Ok(StepOutcome::Soft(err))
            }
            ResponsePayload::Missing => Err(HarnessError::MalformedResult {
                method: methods::TOOLS_CALL,
                reason: "response has neither result nor error".to_string(),
            }),
        }
    }

    /// Sends a request and reads exactly one response line for it.
    async fn request(
        &mut self,
        method: &'static str,
        params: Value,
    ) -> Result<ResponsePayload, HarnessError> {
        let id = self.ids.next_id();
        let line = encode(method, Some(params), Some(id.clone())).map_err(|e| {
            HarnessError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;

        info!(method, %id, "Sending request");
        self.transport.write_line(&line).await?;

        let line = self.read_response_line(method).await?;
        debug!(method, line = %line, "Received response");

        let response = decode_response(&line)
            .map_err(|source| HarnessError::MalformedResponse { method, source })?;

        if response.id.as_ref() != Some(&id) {
            return Err(HarnessError::UnexpectedId {
                expected: id.to_string(),
                actual: response
                    .id
                    .map_or_else(|| "null".to_string(), |id| id.to_string()),
            });
        }

        Ok(response.payload)
    }

    /// Sends a notification. Nothing is read afterwards.
    async fn notify(&mut self, method: &'static str) -> Result<(), HarnessError> {
        let line = encode(method, None, None).map_err(|e| {
            HarnessError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;

        info!(method, "Sending notification");
        self.transport.write_line(&line).await?;
        Ok(())
    }

    async fn read_response_line(&mut self, method: &'static str) -> Result<String, HarnessError> {
        let read = match self.config.response_timeout() {
            Some(after) => tokio::time::timeout(after, self.transport.read_line())
                .await
                .map_err(|_| HarnessError::Timeout { method, after })?,
            None => self.transport.read_line().await,
        };

        match read {
            Ok(line) => line.ok_or(HarnessError::NoResponse { method }),
            // tokio reports a non-UTF-8 line as InvalidData
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                Err(HarnessError::MalformedResponse {
                    method,
                    source: DecodeError::InvalidUtf8,
                })
            }
            Err(e) => Err(HarnessError::Io(e)),
        }
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(next > self.phase, "phase must move forward");
        debug!(from = ?self.phase, to = ?next, "Phase transition");
        self.phase = next;
    }
}

/// Extracts `result.tools[*].name`. A missing `tools` field is an empty list.
fn tool_names(result: &Value) -> Result<Vec<String>, HarnessError> {
    let malformed = |reason: &str| HarnessError::MalformedResult {
        method: methods::TOOLS_LIST,
        reason: reason.to_string(),
    };

    let Some(tools) = result.get("tools") else {
        return Ok(Vec::new());
    };
    let tools = tools
        .as_array()
        .ok_or_else(|| malformed("tools is not an array"))?;

    tools
        .iter()
        .map(|tool| {
            tool.get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| malformed("tool entry has no string name"))
        })
        .collect()
}

/// Extracts `result.content[0].text` and `result.isError`.
fn tool_output(result: &Value) -> Result<ToolOutput, HarnessError> {
    let malformed = |reason: &str| HarnessError::MalformedResult {
        method: methods::TOOLS_CALL,
        reason: reason.to_string(),
    };

    let first = result
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("content is missing"))?
        .first()
        .ok_or_else(|| malformed("content is empty"))?;

    let text = first
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("first content item has no text"))?;

    Ok(ToolOutput {
        text: text.to_string(),
        is_error: result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}
