//! Workspace: the set of documents the client is working on
//!
//! The workspace is owned by the dispatcher loop and only ever touched from
//! there, so it carries no locking of its own. Documents the client never
//! opened are created on demand as disk-backed placeholders.

pub mod document;
pub mod paths;
pub mod uris;

use lsp_types::{MessageType, TextDocumentContentChangeEvent};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::io::{FileSystemTrait, RealFileSystem};
use crate::server::Outbound;

pub use document::Document;
pub use paths::DEFAULT_MARKERS;

/// Workspace-level failures
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("No open document for {0}")]
    DocumentNotFound(String),

    #[error("Invalid document URI: {0:?}")]
    InvalidUri(String),
}

pub struct Workspace<F: FileSystemTrait = RealFileSystem> {
    root_uri: String,
    root_path: Option<PathBuf>,
    documents: HashMap<String, Document<F>>,
    markers: Vec<String>,
    outbound: Outbound,
    fs: F,
}

impl<F: FileSystemTrait> Workspace<F> {
    pub fn new(root_uri: impl Into<String>, fs: F, markers: Vec<String>, outbound: Outbound) -> Self {
        let root_uri = root_uri.into();
        let root_path = uris::to_fs_path(&root_uri);

        debug!(
            "Workspace root {:?} resolved to {:?}",
            root_uri,
            root_path.as_deref()
        );

        Self {
            root_uri,
            root_path,
            documents: HashMap::new(),
            markers,
            outbound,
            fs,
        }
    }

    pub fn root_uri(&self) -> &str {
        &self.root_uri
    }

    /// Whether the root names a directory that exists on this host
    pub fn is_local(&self) -> bool {
        self.root_path
            .as_deref()
            .is_some_and(|path| self.fs.exists(path))
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.documents.contains_key(uri)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Register client-owned text for `uri`, replacing any previous buffer
    pub fn put_document(
        &mut self,
        uri: &str,
        text: String,
        version: Option<i32>,
    ) -> Result<(), WorkspaceError> {
        validate_uri(uri)?;

        let document = Document::new(
            uri,
            uris::to_fs_path(uri),
            Some(text),
            version,
            self.fs.clone(),
        );
        self.documents.insert(uri.to_string(), document);
        Ok(())
    }

    /// Buffer for `uri`, creating a disk-backed placeholder when it is not open
    pub fn get_document(&mut self, uri: &str) -> Result<&mut Document<F>, WorkspaceError> {
        validate_uri(uri)?;

        let fs = &self.fs;
        let document = self.documents.entry(uri.to_string()).or_insert_with(|| {
            debug!("Creating placeholder document for {}", uri);
            Document::new(uri, uris::to_fs_path(uri), None, None, fs.clone())
        });
        Ok(document)
    }

    /// Forget the buffer for `uri`; unknown URIs are ignored
    pub fn remove_document(&mut self, uri: &str) -> Option<Document<F>> {
        self.documents.remove(uri)
    }

    /// Apply one content change to an existing buffer
    pub fn update_document(
        &mut self,
        uri: &str,
        change: &TextDocumentContentChangeEvent,
        version: Option<i32>,
    ) -> Result<(), WorkspaceError> {
        let document = self
            .documents
            .get_mut(uri)
            .ok_or_else(|| WorkspaceError::DocumentNotFound(uri.to_string()))?;

        document.apply_change(change.range, &change.text);
        document.set_version(version);
        trace!("Applied change to {} (now version {:?})", uri, document.version());
        Ok(())
    }

    /// Project directories that give context to `uri`
    ///
    /// The closest directory between the document and the root holding one
    /// of the marker files. Resolved once per buffer and cached on it.
    pub fn context_paths(&mut self, uri: &str) -> Result<Vec<PathBuf>, WorkspaceError> {
        self.get_document(uri)?;
        let document = self
            .documents
            .get_mut(uri)
            .ok_or_else(|| WorkspaceError::DocumentNotFound(uri.to_string()))?;

        if let Some(paths) = document.extra_context_paths() {
            return Ok(paths.to_vec());
        }

        let paths = match (self.root_path.as_deref(), document.path()) {
            (Some(root), Some(path)) if path.starts_with(root) => {
                find_context_dir(&self.fs, root, path, &self.markers)
                    .into_iter()
                    .collect()
            }
            (Some(root), Some(_)) => {
                let message = format!(
                    "Document {} is outside the workspace root {}",
                    uri,
                    root.display()
                );
                warn!("{}", message);
                self.outbound.log_message(MessageType::WARNING, message);
                Vec::new()
            }
            _ => Vec::new(),
        };

        document.set_extra_context_paths(paths.clone());
        Ok(paths)
    }
}

fn validate_uri(uri: &str) -> Result<(), WorkspaceError> {
    if uris::is_valid_uri(uri) {
        Ok(())
    } else {
        Err(WorkspaceError::InvalidUri(uri.to_string()))
    }
}

/// Directory holding the closest marker file
fn find_context_dir<F: FileSystemTrait>(
    fs: &F,
    root: &Path,
    path: &Path,
    markers: &[String],
) -> Option<PathBuf> {
    paths::find_parents(fs, root, path, markers)
        .first()
        .and_then(|marker| marker.parent())
        .map(Path::to_path_buf)
}
