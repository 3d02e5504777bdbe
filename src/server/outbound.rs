//! Outbound message queue
//!
//! Handlers on the dispatcher loop and jobs on pool threads all hand their
//! messages to an [`Outbound`]; the dispatcher loop is the single consumer
//! and the only writer to the transport.

use lsp_types::{LogMessageParams, MessageType};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{Level, debug, error};

use crate::log_lsp_message;
use crate::lsp::jsonrpc_utils;
use crate::lsp::protocol::{JsonRpcNotification, JsonRpcResponse};

#[derive(Debug, Clone)]
pub struct Outbound {
    sender: mpsc::UnboundedSender<String>,
}

impl Outbound {
    pub fn new(sender: mpsc::UnboundedSender<String>) -> Self {
        Self { sender }
    }

    pub fn send_response(&self, response: JsonRpcResponse) {
        log_lsp_message!(Level::DEBUG, "outgoing", "response", &response.id);
        self.enqueue(&response);
    }

    pub fn send_notification(&self, notification: JsonRpcNotification) {
        log_lsp_message!(
            Level::DEBUG,
            "outgoing",
            notification.method.as_str(),
            &notification.params
        );
        self.enqueue(&notification);
    }

    /// `window/logMessage` to the client
    pub fn log_message(&self, typ: MessageType, message: impl Into<String>) {
        let params = LogMessageParams {
            typ,
            message: message.into(),
        };

        match serde_json::to_value(params) {
            Ok(params) => {
                self.send_notification(jsonrpc_utils::notification("window/logMessage", params))
            }
            Err(e) => error!("Failed to serialize log message: {}", e),
        }
    }

    fn enqueue<T: Serialize>(&self, message: &T) {
        let encoded = match serde_json::to_string(message) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("Failed to serialize outbound message: {}", e);
                return;
            }
        };

        // The queue outlives the connection only while the server is tearing down
        if self.sender.send(encoded).is_err() {
            debug!("Dropping outbound message, dispatcher has exited");
        }
    }
}
