//! JSON-RPC 2.0 protocol layer
//!
//! Wire envelopes for the server side of the protocol and the decoding of
//! raw payloads into requests, notifications and (ignored) responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// JSON-RPC Types
// ============================================================================

/// JSON-RPC 2.0 response message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Request identifier (matches the request)
    pub id: Value,

    /// Result (present if successful)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error (present if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorObject>,
}

/// JSON-RPC 2.0 notification message (no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Method name
    pub method: String,

    /// Optional parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    /// Error code
    pub code: i32,

    /// Error message
    pub message: String,

    /// Optional additional data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ============================================================================
// JSON-RPC Error Codes
// ============================================================================

/// Error codes defined by JSON-RPC and the Language Server Protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum JsonRpcErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
    ServerNotInitialized = -32002,
    RequestFailed = -32803,
}

impl JsonRpcErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

// ============================================================================
// Inbound Messages
// ============================================================================

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// Method call that expects a response correlated by `id`
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    /// Method call without an id; never answered
    Notification { method: String, params: Value },
    /// A response to something the server sent; the server issues no requests
    Response { id: Value },
}

/// Why an inbound payload could not be decoded
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Structurally invalid; `id` is echoed back when it could be recovered
    #[error("Invalid request: {reason}")]
    InvalidRequest { id: Value, reason: String },
}

impl IncomingMessage {
    /// Decode a raw payload
    pub fn decode(payload: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(payload)?;

        let Value::Object(mut object) = value else {
            return Err(DecodeError::InvalidRequest {
                id: Value::Null,
                reason: "message is not a JSON object".to_string(),
            });
        };

        let id = object.remove("id");
        let params = object.remove("params").unwrap_or(Value::Null);

        match object.remove("method") {
            Some(Value::String(method)) => match id {
                Some(id) if is_valid_id(&id) => Ok(Self::Request { id, method, params }),
                Some(id) => Err(DecodeError::InvalidRequest {
                    id: Value::Null,
                    reason: format!("invalid request id: {id}"),
                }),
                None => Ok(Self::Notification { method, params }),
            },
            Some(other) => Err(DecodeError::InvalidRequest {
                id: id.filter(is_valid_id).unwrap_or(Value::Null),
                reason: format!("method must be a string, got {other}"),
            }),
            None if object.contains_key("result") || object.contains_key("error") => {
                Ok(Self::Response {
                    id: id.unwrap_or(Value::Null),
                })
            }
            None => Err(DecodeError::InvalidRequest {
                id: id.filter(is_valid_id).unwrap_or(Value::Null),
                reason: "missing method".to_string(),
            }),
        }
    }
}

/// Request ids are integers or strings
fn is_valid_id(id: &Value) -> bool {
    matches!(id, Value::Number(_) | Value::String(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_request() {
        let message = IncomingMessage::decode(
            r#"{"jsonrpc":"2.0","id":7,"method":"shutdown"}"#,
        )
        .unwrap();

        assert_eq!(
            message,
            IncomingMessage::Request {
                id: json!(7),
                method: "shutdown".to_string(),
                params: Value::Null,
            }
        );
    }

    #[test]
    fn test_decode_notification_with_params() {
        let message = IncomingMessage::decode(
            r#"{"jsonrpc":"2.0","method":"textDocument/didClose","params":{"textDocument":{"uri":"file:///a"}}}"#,
        )
        .unwrap();

        match message {
            IncomingMessage::Notification { method, params } => {
                assert_eq!(method, "textDocument/didClose");
                assert_eq!(params["textDocument"]["uri"], "file:///a");
            }
            other => panic!("Expected notification, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_string_id() {
        let message =
            IncomingMessage::decode(r#"{"jsonrpc":"2.0","id":"abc","method":"initialize"}"#)
                .unwrap();
        assert!(matches!(message, IncomingMessage::Request { id, .. } if id == json!("abc")));
    }

    #[test]
    fn test_decode_response() {
        let message =
            IncomingMessage::decode(r#"{"jsonrpc":"2.0","id":3,"result":null}"#).unwrap();
        assert_eq!(message, IncomingMessage::Response { id: json!(3) });
    }

    #[test]
    fn test_decode_parse_error() {
        assert!(matches!(
            IncomingMessage::decode("{not json"),
            Err(DecodeError::Parse(_))
        ));
    }

    #[test]
    fn test_decode_invalid_requests() {
        match IncomingMessage::decode(r#"[1, 2]"#) {
            Err(DecodeError::InvalidRequest { id, .. }) => assert_eq!(id, Value::Null),
            other => panic!("Expected invalid request, got {other:?}"),
        }

        match IncomingMessage::decode(r#"{"jsonrpc":"2.0","id":4}"#) {
            Err(DecodeError::InvalidRequest { id, .. }) => assert_eq!(id, json!(4)),
            other => panic!("Expected invalid request, got {other:?}"),
        }

        match IncomingMessage::decode(r#"{"jsonrpc":"2.0","id":5,"method":12}"#) {
            Err(DecodeError::InvalidRequest { id, .. }) => assert_eq!(id, json!(5)),
            other => panic!("Expected invalid request, got {other:?}"),
        }

        assert!(matches!(
            IncomingMessage::decode(r#"{"jsonrpc":"2.0","id":{"x":1},"method":"initialize"}"#),
            Err(DecodeError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(JsonRpcErrorCode::MethodNotFound.code(), -32601);
        assert_eq!(JsonRpcErrorCode::ServerNotInitialized.code(), -32002);
        assert_eq!(JsonRpcErrorCode::RequestFailed.code(), -32803);
    }
}
