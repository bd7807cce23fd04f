//! Integration tests for the JSON-RPC message codec.
//!
//! These tests exercise the public encode/decode API the way a server's
//! real traffic looks: requests the probe writes and the responses a
//! stdio MCP server sends back.

use mcp_stdio_probe::error::DecodeError;
use mcp_stdio_probe::mcp::protocol::{
    decode_response, encode, methods, RequestId, RequestIdCounter, ResponsePayload,
};
use serde_json::{json, Value};

// =============================================================================
// Encoding Tests
// =============================================================================

#[test]
fn test_encode_initialize_request() {
    let params = json!({
        "protocolVersion": "0.1.0",
        "capabilities": {},
        "clientInfo": {"name": "test-client", "version": "1.0"}
    });
    let line = encode(methods::INITIALIZE, Some(params.clone()), Some(RequestId::Number(1))).unwrap();

    assert!(!line.contains('\n'));
    let value: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(value["jsonrpc"], "2.0");
    assert_eq!(value["method"], "initialize");
    assert_eq!(value["id"], 1);
    assert_eq!(value["params"], params);
}

#[test]
fn test_encode_initialized_notification() {
    let line = encode(methods::INITIALIZED, None, None).unwrap();
    let value: Value = serde_json::from_str(&line).unwrap();

    assert_eq!(value, json!({"jsonrpc": "2.0", "method": "notifications/initialized"}));
    assert!(value.get("id").is_none());
}

#[test]
fn test_ids_are_unique_per_run() {
    let mut ids = RequestIdCounter::new();
    let sent: Vec<RequestId> = (0..3).map(|_| ids.next_id()).collect();
    assert_eq!(
        sent,
        vec![RequestId::Number(1), RequestId::Number(2), RequestId::Number(3)]
    );
}

// =============================================================================
// Decoding Tests
// =============================================================================

#[test]
fn test_decode_initialize_response() {
    let line = r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","serverInfo":{"name":"proxmox-mcp-rs","version":"0.1.0"},"capabilities":{"tools":{},"resources":{}}}}"#;

    let response = decode_response(line).unwrap();
    assert_eq!(response.id, Some(RequestId::Number(1)));
    let ResponsePayload::Result(result) = response.payload else {
        panic!("Expected Result");
    };
    assert_eq!(result["serverInfo"]["name"], "proxmox-mcp-rs");
}

#[test]
fn test_decode_tool_call_error() {
    let line = r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32603,"message":"Connection refused"}}"#;

    let response = decode_response(line).unwrap();
    let ResponsePayload::Error(err) = response.payload else {
        panic!("Expected Error");
    };
    assert_eq!(err.code, -32603);
    assert_eq!(err.message, "Connection refused");
}

#[test]
fn test_decode_invalid_json() {
    assert!(matches!(
        decode_response("not valid json"),
        Err(DecodeError::Json(_))
    ));
}

#[test]
fn test_decode_missing_jsonrpc_version() {
    assert!(matches!(
        decode_response(r#"{"id": 1, "result": {}}"#),
        Err(DecodeError::NotAResponse(_))
    ));
}

#[test]
fn test_decode_error_without_message() {
    let response = decode_response(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-1}}"#).unwrap();
    let ResponsePayload::Error(err) = response.payload else {
        panic!("Expected Error");
    };
    assert_eq!(err.code, -1);
    assert_eq!(err.message, r#"{"code":-1}"#);
}
