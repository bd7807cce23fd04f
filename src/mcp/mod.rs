//! Client side of the Model Context Protocol (MCP) stdio transport.
//!
//! The probe plays the client role: it writes JSON-RPC 2.0 requests and
//! notifications to a server's stdin and reads responses from its stdout,
//! one JSON object per line.

pub mod protocol;
pub mod transport;

pub use protocol::{
    decode_response, encode, JsonRpcErrorObject, JsonRpcResponse, RequestId, ResponsePayload,
};
pub use transport::{ServerProcess, Transport};
