//! Method handlers
//!
//! Request handlers return a [`HandlerOutcome`]: either the finished result,
//! or a closure the dispatcher runs on the worker pool. Handlers themselves
//! always run on the dispatcher loop and are the only code that touches the
//! workspace.

use lsp_types::{
    ClientCapabilities, CompletionParams, CompletionResponse, DidChangeTextDocumentParams,
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, InitializeResult, MessageType,
    ServerInfo,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};

use super::capabilities::server_capabilities;
use super::pool::WorkerPool;
use super::{LanguageServer, Session};
use crate::completion::CompletionPipeline;
use crate::config::ServerConfig;
use crate::io::FileSystemTrait;
use crate::lsp::LspError;
use crate::watchdog::ParentWatchdog;
use crate::workspace::{Workspace, uris};

pub type DeferredHandler = Box<dyn FnOnce() -> Result<Value, LspError> + Send + 'static>;

/// How a request handler produced its answer
pub enum HandlerOutcome {
    /// Answer the request now
    Immediate(Value),
    /// Run on the worker pool and answer when it finishes
    Deferred(DeferredHandler),
}

/// The parts of `InitializeParams` the server reads
///
/// Every field is optional so minimal clients are still accepted.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct InitializeRequest {
    process_id: Option<u32>,
    root_uri: Option<String>,
    root_path: Option<String>,
    initialization_options: Option<Value>,
    capabilities: ClientCapabilities,
}

fn parse_params<P: DeserializeOwned>(params: Value) -> Result<P, LspError> {
    Ok(serde_json::from_value(params)?)
}

impl<F: FileSystemTrait> LanguageServer<F> {
    // ========================================================================
    // Requests
    // ========================================================================

    pub(super) fn route_request(
        &mut self,
        method: &str,
        params: Value,
    ) -> Result<HandlerOutcome, LspError> {
        match method {
            "initialize" => self.initialize(parse_params(params)?),
            _ if self.session.is_none() => Err(LspError::NotInitialized),
            "shutdown" => self.shutdown(),
            "textDocument/completion" => self.completion(parse_params(params)?),
            _ => Err(LspError::MethodNotFound(method.to_string())),
        }
    }

    fn initialize(&mut self, params: InitializeRequest) -> Result<HandlerOutcome, LspError> {
        if self.session.is_some() {
            return Err(LspError::AlreadyInitialized);
        }

        let config = ServerConfig::from_initialization_options(params.initialization_options.as_ref());
        let root_uri = params
            .root_uri
            .or_else(|| {
                params
                    .root_path
                    .as_deref()
                    .and_then(|path| uris::from_fs_path(Path::new(path)))
            })
            .unwrap_or_default();

        debug!("Server configuration: {:?}", config);

        let workspace = Workspace::new(
            root_uri,
            self.fs.clone(),
            config.markers.clone(),
            self.outbound.clone(),
        );
        let pipeline = CompletionPipeline::new(self.backend.clone(), &config);
        let pool = WorkerPool::new(config.max_workers);

        info!(
            "Initializing for root {:?} (parent pid {:?}, {} workers)",
            workspace.root_uri(),
            params.process_id,
            pool.capacity()
        );
        if !workspace.is_local() {
            info!("Workspace root is not a local directory; context paths are disabled");
        }

        let backend = self.backend.clone();
        pool.spawn(
            move || backend.warm_up(),
            |result| match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Backend warm-up failed: {}", e),
                Err(e) => warn!("Backend warm-up did not run: {}", e),
            },
        );

        if self.options.check_parent_process {
            match params.process_id {
                Some(pid) => {
                    ParentWatchdog::new(pid, config.watch_interval(), self.exit_token.clone())
                        .spawn();
                }
                None => warn!("Parent process check requested but the client sent no process id"),
            }
        }

        let result = InitializeResult {
            capabilities: server_capabilities(&params.capabilities),
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        };

        self.session = Some(Session {
            workspace,
            pipeline,
            pool,
        });

        Ok(HandlerOutcome::Immediate(serde_json::to_value(result).map_err(
            |e| LspError::Internal(e.to_string()),
        )?))
    }

    fn shutdown(&mut self) -> Result<HandlerOutcome, LspError> {
        self.lifecycle.begin_shutdown();
        Ok(HandlerOutcome::Immediate(Value::Null))
    }

    fn completion(&mut self, params: CompletionParams) -> Result<HandlerOutcome, LspError> {
        let session = self.session.as_mut().ok_or(LspError::NotInitialized)?;
        let position = params.text_document_position;

        let job = session.pipeline.prepare(
            &mut session.workspace,
            position.text_document.uri.as_str(),
            position.position,
        )?;

        Ok(HandlerOutcome::Deferred(Box::new(move || {
            let list = job.run()?;
            serde_json::to_value(CompletionResponse::List(list))
                .map_err(|e| LspError::Internal(e.to_string()))
        })))
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Handle a notification other than `exit`
    pub(super) fn handle_notification(&mut self, method: &str, params: Value) {
        let result = match method {
            "initialized" | "textDocument/didSave" => Ok(()),
            "textDocument/didOpen" => parse_params(params).and_then(|p| self.did_open(p)),
            "textDocument/didChange" => parse_params(params).and_then(|p| self.did_change(p)),
            "textDocument/didClose" => parse_params(params).and_then(|p| self.did_close(p)),
            _ if method.starts_with("$/") => Ok(()),
            _ => {
                debug!("Ignoring unhandled notification {}", method);
                Ok(())
            }
        };

        if let Err(e) = result {
            let message = format!("{} failed: {}", method, e);
            warn!("{}", message);
            self.outbound.log_message(MessageType::ERROR, message);
        }
    }

    fn workspace_mut(&mut self) -> Result<&mut Workspace<F>, LspError> {
        self.session
            .as_mut()
            .map(|session| &mut session.workspace)
            .ok_or(LspError::NotInitialized)
    }

    fn did_open(&mut self, params: DidOpenTextDocumentParams) -> Result<(), LspError> {
        let document = params.text_document;
        let workspace = self.workspace_mut()?;
        if workspace.contains(document.uri.as_str()) {
            debug!("Reopening {}, replacing its buffer", document.uri.as_str());
        }
        workspace.put_document(
            document.uri.as_str(),
            document.text,
            Some(document.version),
        )?;
        Ok(())
    }

    /// Changes are applied in order, each against the text left by the previous one
    fn did_change(&mut self, params: DidChangeTextDocumentParams) -> Result<(), LspError> {
        let uri = params.text_document.uri;
        let version = Some(params.text_document.version);
        let workspace = self.workspace_mut()?;

        for change in &params.content_changes {
            workspace.update_document(uri.as_str(), change, version)?;
        }
        Ok(())
    }

    fn did_close(&mut self, params: DidCloseTextDocumentParams) -> Result<(), LspError> {
        let workspace = self.workspace_mut()?;
        if let Some(document) = workspace.remove_document(params.text_document.uri.as_str()) {
            debug!("Closed {} ({} documents left)", document.uri(), workspace.len());
        }
        Ok(())
    }
}
