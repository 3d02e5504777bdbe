//! Request dispatcher
//!
//! One loop per connection owns the framing layer, the workspace and the
//! lifecycle state. It alternates between writing queued outbound messages
//! and decoding the next inbound one, strictly in arrival order. Handlers
//! that answer with [`HandlerOutcome::Deferred`] are moved to the
//! [`WorkerPool`] and answer through the [`Outbound`] queue when done.

pub mod capabilities;
pub mod handlers;
pub mod lifecycle;
pub mod outbound;
pub mod pool;

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};

use crate::completion::{BackendContext, CompletionPipeline};
use crate::io::{FileSystemTrait, RealFileSystem, Transport};
use crate::log_lsp_message;
use crate::lsp::jsonrpc_utils::{error_response, failure_response, success_response};
use crate::lsp::protocol::DecodeError;
use crate::lsp::{IncomingMessage, JsonRpcErrorCode, LspError, LspFraming};
use crate::workspace::Workspace;

pub use handlers::HandlerOutcome;
pub use lifecycle::{Admission, Lifecycle};
pub use outbound::Outbound;
pub use pool::WorkerPool;

/// Process-level switches from the command line
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Exit when the process id given at initialize disappears
    pub check_parent_process: bool,
}

/// State that exists once `initialize` has been handled
struct Session<F: FileSystemTrait> {
    workspace: Workspace<F>,
    pipeline: CompletionPipeline,
    pool: WorkerPool,
}

pub struct LanguageServer<F: FileSystemTrait = RealFileSystem> {
    options: ServerOptions,
    backend: Arc<BackendContext>,
    fs: F,
    lifecycle: Lifecycle,
    session: Option<Session<F>>,
    outbound: Outbound,
    outbound_receiver: mpsc::UnboundedReceiver<String>,
    /// Cancelled by the watchdog to force an exit, and by the loop when it ends
    exit_token: CancellationToken,
}

impl LanguageServer<RealFileSystem> {
    pub fn new(options: ServerOptions, backend: Arc<BackendContext>) -> Self {
        Self::with_file_system(options, backend, RealFileSystem)
    }
}

impl<F: FileSystemTrait> LanguageServer<F> {
    pub fn with_file_system(options: ServerOptions, backend: Arc<BackendContext>, fs: F) -> Self {
        let (sender, outbound_receiver) = mpsc::unbounded_channel();

        Self {
            options,
            backend,
            fs,
            lifecycle: Lifecycle::new(),
            session: None,
            outbound: Outbound::new(sender),
            outbound_receiver,
            exit_token: CancellationToken::new(),
        }
    }

    /// Token that ends the dispatcher as if the client had sent `shutdown` and `exit`
    #[cfg(test)]
    pub fn exit_token(&self) -> CancellationToken {
        self.exit_token.clone()
    }

    /// Serve one connection until `exit`, stream closure or a forced exit
    ///
    /// Returns the process exit status: 0 for `exit` after `shutdown`,
    /// 1 otherwise.
    pub async fn serve<T: Transport>(mut self, transport: T) -> i32 {
        let mut framing = LspFraming::new(transport);
        info!("Language server running");

        let code = loop {
            tokio::select! {
                biased;

                Some(message) = self.outbound_receiver.recv() => {
                    if let Err(e) = framing.send(&message).await {
                        error!("Failed to write message: {}", e);
                        self.lifecycle.exit();
                        break 1;
                    }
                }

                _ = self.exit_token.cancelled() => {
                    warn!("Forced exit requested");
                    self.lifecycle.begin_shutdown();
                    break self.lifecycle.exit();
                }

                received = framing.receive() => match received {
                    Ok(body) => {
                        if let Some(code) = self.handle_body(body) {
                            break code;
                        }
                    }
                    Err(e) => {
                        error!("Input stream closed: {}", e);
                        self.lifecycle.exit();
                        break 1;
                    }
                },
            }
        };

        self.teardown(&mut framing).await;
        code
    }

    /// Decode and dispatch one message body; returns the exit status once `exit` arrives
    fn handle_body(&mut self, body: Vec<u8>) -> Option<i32> {
        let payload = match String::from_utf8(body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Discarding message that is not UTF-8: {}", e);
                self.outbound.send_response(error_response(
                    Value::Null,
                    JsonRpcErrorCode::ParseError,
                    format!("Parse error: {}", e),
                    None,
                ));
                return None;
            }
        };

        let message = match IncomingMessage::decode(&payload) {
            Ok(message) => message,
            Err(DecodeError::Parse(e)) => {
                warn!("Discarding unparseable message: {}", e);
                self.outbound.send_response(error_response(
                    Value::Null,
                    JsonRpcErrorCode::ParseError,
                    format!("Parse error: {}", e),
                    None,
                ));
                return None;
            }
            Err(DecodeError::InvalidRequest { id, reason }) => {
                warn!("Discarding invalid message: {}", reason);
                self.outbound.send_response(error_response(
                    id,
                    JsonRpcErrorCode::InvalidRequest,
                    reason,
                    None,
                ));
                return None;
            }
        };

        match message {
            IncomingMessage::Request { id, method, params } => {
                log_lsp_message!(Level::DEBUG, "incoming", method.as_str(), &id);
                self.dispatch_request(id, &method, params);
                None
            }
            IncomingMessage::Notification { method, params } => {
                log_lsp_message!(Level::DEBUG, "incoming", method.as_str(), &params);
                self.dispatch_notification(&method, params)
            }
            IncomingMessage::Response { id } => {
                debug!("Ignoring response to request {}", id);
                None
            }
        }
    }

    fn dispatch_request(&mut self, id: Value, method: &str, params: Value) {
        let outcome = match self.lifecycle.admit(method) {
            Admission::Accept => self.route_request(method, params),
            Admission::Reject => Err(LspError::ShuttingDown(method.to_string())),
        };

        match outcome {
            Ok(HandlerOutcome::Immediate(result)) => {
                self.outbound.send_response(success_response(id, result));
            }
            Ok(HandlerOutcome::Deferred(job)) => self.schedule(id, job),
            Err(e) => {
                debug!("Request {} ({}) failed: {}", id, method, e);
                self.outbound.send_response(failure_response(id, e));
            }
        }
    }

    fn dispatch_notification(&mut self, method: &str, params: Value) -> Option<i32> {
        if method == "exit" {
            return Some(self.lifecycle.exit());
        }

        if self.lifecycle.admit(method) == Admission::Reject {
            debug!("Dropping {} while {:?}", method, self.lifecycle.state());
            return None;
        }
        if self.session.is_none() {
            debug!("Dropping {} before initialize", method);
            return None;
        }

        self.handle_notification(method, params);
        None
    }

    fn schedule(&mut self, id: Value, job: handlers::DeferredHandler) {
        let Some(session) = &self.session else {
            self.outbound
                .send_response(failure_response(id, LspError::NotInitialized));
            return;
        };

        let outbound = self.outbound.clone();
        session.pool.spawn(job, move |result| {
            let response = match result {
                Ok(Ok(value)) => success_response(id, value),
                Ok(Err(e)) => failure_response(id, e),
                Err(e) => error_response(
                    id,
                    JsonRpcErrorCode::InternalError,
                    e.to_string(),
                    None,
                ),
            };
            outbound.send_response(response);
        });
    }

    /// Stop the pool and watchdog, flush what is queued and close the stream
    async fn teardown<T: Transport>(&mut self, framing: &mut LspFraming<T>) {
        if let Some(session) = &self.session {
            session.pool.close();
        }
        self.exit_token.cancel();

        while let Ok(message) = self.outbound_receiver.try_recv() {
            if framing.send(&message).await.is_err() {
                break;
            }
        }

        if let Err(e) = framing.close().await {
            debug!("Error closing transport: {}", e);
        }
        info!("Language server stopped");
    }
}

#[cfg(test)]
mod tests;
