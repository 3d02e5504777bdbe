use serde_json::Value;
use thiserror::Error;

use crate::completion::BackendError;
use crate::lsp::protocol::{JsonRpcErrorCode, JsonRpcErrorObject};
use crate::workspace::WorkspaceError;

/// Failure of a single request handler
///
/// Every variant is reported to the client as a JSON-RPC error object for
/// the request that caused it; none of them stop the dispatcher.
#[derive(Error, Debug)]
pub enum LspError {
    #[error("Server not initialized. Send an initialize request first.")]
    NotInitialized,

    #[error("Server is already initialized")]
    AlreadyInitialized,

    #[error("Method not available while shutting down: {0}")]
    ShuttingDown(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(#[from] serde_json::Error),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("Completion backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LspError {
    /// JSON-RPC error code reported for this failure
    pub fn code(&self) -> JsonRpcErrorCode {
        match self {
            LspError::NotInitialized => JsonRpcErrorCode::ServerNotInitialized,
            LspError::AlreadyInitialized | LspError::ShuttingDown(_) => {
                JsonRpcErrorCode::InvalidRequest
            }
            LspError::MethodNotFound(_) => JsonRpcErrorCode::MethodNotFound,
            LspError::InvalidParams(_) => JsonRpcErrorCode::InvalidParams,
            LspError::Workspace(_) | LspError::Backend(_) => JsonRpcErrorCode::RequestFailed,
            LspError::Internal(_) => JsonRpcErrorCode::InternalError,
        }
    }
}

impl From<LspError> for JsonRpcErrorObject {
    fn from(error: LspError) -> Self {
        let data = match &error {
            LspError::ShuttingDown(method) | LspError::MethodNotFound(method) => {
                Some(Value::String(method.clone()))
            }
            _ => None,
        };

        JsonRpcErrorObject {
            code: error.code().code(),
            message: error.to_string(),
            data,
        }
    }
}
