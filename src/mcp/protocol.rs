//! JSON-RPC 2.0 message types for the client side of MCP.
//!
//! This module defines the messages the probe writes to the server and the
//! responses it reads back, plus the line codec between them.
//!
//! # Message Types
//!
//! - **Request**: A message expecting a response (has `id`)
//! - **Notification**: A one-way message (no `id`, no response expected)
//! - **Response**: A reply to a request (exactly one of `result` or `error`)
//!
//! # Framing
//!
//! Every message is one JSON value on one line. `serde_json::to_string`
//! never emits newlines, so an encoded message is safe to write as-is.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// The JSON-RPC version tag carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method names used by the handshake, in the order they are sent.
pub mod methods {
    /// Opens the session.
    pub const INITIALIZE: &str = "initialize";
    /// Confirms the session is ready (notification).
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Lists the tools the server exposes.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Invokes one tool.
    pub const TOOLS_CALL: &str = "tools/call";
}

/// A JSON-RPC 2.0 request ID.
///
/// Per the MCP specification, IDs must be strings or integers, never `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// String request ID.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// Hands out request ids for one probe run: 1, 2, 3, ...
#[derive(Debug)]
pub struct RequestIdCounter {
    next: i64,
}

impl RequestIdCounter {
    /// Creates a counter whose first id is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 1 }
    }

    /// Returns the next unused id.
    pub fn next_id(&mut self) -> RequestId {
        let id = self.next;
        self.next += 1;
        RequestId::Number(id)
    }
}

impl Default for RequestIdCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// An outgoing JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The method to invoke.
    pub method: String,

    /// Parameters for the method (an empty object when there are none).
    pub params: Value,

    /// Unique request identifier.
    pub id: RequestId,
}

impl JsonRpcRequest {
    /// Creates a new request. `None` params become `{}`.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params: params.unwrap_or_else(|| Value::Object(Map::new())),
            id,
        }
    }
}

/// An outgoing JSON-RPC 2.0 notification.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingNotification {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The notification method.
    pub method: String,

    /// Optional parameters for the notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl OutgoingNotification {
    /// Creates a new outgoing notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

/// Standard JSON-RPC 2.0 error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid Request object.
    InvalidRequest,
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
    /// Server-defined error.
    ServerError(i64),
}

impl ErrorCode {
    /// Classifies a numeric error code.
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            other => Self::ServerError(other),
        }
    }

    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ServerError(code) => code,
        }
    }

    /// Returns the default message for this error code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ServerError(_) => "Server error",
        }
    }
}

/// A JSON-RPC 2.0 error object as returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    /// The error code.
    pub code: i64,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorObject {
    /// Returns the standard classification of this error's code.
    #[must_use]
    pub const fn kind(&self) -> ErrorCode {
        ErrorCode::from_code(self.code)
    }

    /// Builds an error object from whatever the server put in `error`.
    ///
    /// A value that is not a well-formed error object still yields one:
    /// a missing code becomes `InternalError`, a missing message is taken
    /// from the raw value, and the raw value is kept in `data`.
    #[must_use]
    pub fn from_raw(raw: Value) -> Self {
        if let Ok(err) = serde_json::from_value::<Self>(raw.clone()) {
            return err;
        }

        let code = raw
            .get("code")
            .and_then(Value::as_i64)
            .unwrap_or_else(|| ErrorCode::InternalError.code());
        let message = match raw.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => match &raw {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        };

        Self {
            code,
            message,
            data: Some(raw),
        }
    }
}

impl std::fmt::Display for JsonRpcErrorObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.kind().default_message(), self.message)
    }
}

/// The body of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    /// The request succeeded.
    Result(Value),
    /// The request failed.
    Error(JsonRpcErrorObject),
    /// Neither `result` nor `error` was present.
    Missing,
}

/// A decoded JSON-RPC 2.0 response.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcResponse {
    /// The id echoed by the server (`None` if `null` or absent).
    pub id: Option<RequestId>,

    /// Result, error, or neither.
    pub payload: ResponsePayload,
}

/// Encodes a request (`id` given) or notification (`id` omitted) as one line.
///
/// The returned string carries no trailing newline; the transport adds it.
///
/// # Errors
///
/// Returns an error if `params` cannot be serialised.
pub fn encode(
    method: &str,
    params: Option<Value>,
    id: Option<RequestId>,
) -> Result<String, serde_json::Error> {
    match id {
        Some(id) => serde_json::to_string(&JsonRpcRequest::new(method, params, id)),
        None => serde_json::to_string(&OutgoingNotification::new(method, params)),
    }
}

/// Decodes one response line.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the line is empty, is not JSON, or is not
/// a JSON-RPC 2.0 response object.
pub fn decode_response(line: &str) -> Result<JsonRpcResponse, DecodeError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(DecodeError::Empty);
    }

    // First, parse as generic JSON to check structure
    let value: Value = serde_json::from_str(line)?;
    let Value::Object(mut obj) = value else {
        return Err(DecodeError::NotAResponse("message is not a JSON object"));
    };

    if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(DecodeError::NotAResponse("jsonrpc field must be \"2.0\""));
    }

    let id: Option<RequestId> = match obj.remove("id") {
        None | Some(Value::Null) => None,
        Some(raw) => Some(
            serde_json::from_value(raw)
                .map_err(|_| DecodeError::NotAResponse("id must be a string or integer"))?,
        ),
    };

    let payload = match (obj.remove("result"), obj.remove("error")) {
        (Some(_), Some(_)) => {
            return Err(DecodeError::NotAResponse(
                "result and error are mutually exclusive",
            ))
        }
        (Some(result), None) => ResponsePayload::Result(result),
        (None, Some(error)) => ResponsePayload::Error(JsonRpcErrorObject::from_raw(error)),
        (None, None) => ResponsePayload::Missing,
    };

    Ok(JsonRpcResponse { id, payload })
}
