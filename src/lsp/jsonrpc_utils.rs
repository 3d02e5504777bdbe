//! JSON-RPC 2.0 protocol utilities
//!
//! Provides constants and builders for outbound JSON-RPC 2.0 messages
//! (see https://www.jsonrpc.org)

use crate::lsp::protocol::{
    JsonRpcErrorCode, JsonRpcErrorObject, JsonRpcNotification, JsonRpcResponse,
};
use serde_json::Value;

// ============================================================================
// JSON-RPC 2.0 Constants
// ============================================================================

/// JSON-RPC 2.0 version identifier
pub const JSONRPC_VERSION: &str = "2.0";

// ============================================================================
// JSON-RPC Response Builders
// ============================================================================

/// Create a successful JSON-RPC response
pub fn success_response(id: Value, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id,
        result: Some(result),
        error: None,
    }
}

/// Create a JSON-RPC error response
pub fn error_response(
    id: Value,
    code: JsonRpcErrorCode,
    message: String,
    data: Option<Value>,
) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id,
        result: None,
        error: Some(JsonRpcErrorObject {
            code: code.code(),
            message,
            data,
        }),
    }
}

/// Create an error response from a prepared error object
pub fn failure_response(id: Value, error: impl Into<JsonRpcErrorObject>) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id,
        result: None,
        error: Some(error.into()),
    }
}

/// Create a server-to-client notification
pub fn notification(method: &str, params: Value) -> JsonRpcNotification {
    JsonRpcNotification {
        jsonrpc: JSONRPC_VERSION.to_string(),
        method: method.to_string(),
        params: Some(params),
    }
}
