//! Completion: copy text out of the workspace, then generate off-thread
//!
//! [`CompletionPipeline::prepare`] runs on the dispatcher loop and is the only
//! step that reads the workspace. The returned [`CompletionJob`] owns copies
//! of everything it needs and can run on any worker thread.

use lsp_types::{CompletionItem, CompletionItemKind, CompletionList, Position};
use std::sync::Arc;
use tracing::debug;

use super::backend::{BackendContext, BackendError, Prompt};
use crate::config::ServerConfig;
use crate::io::FileSystemTrait;
use crate::workspace::{Workspace, WorkspaceError};

pub struct CompletionPipeline {
    backend: Arc<BackendContext>,
    context_window: usize,
    generation_length: usize,
}

/// Copied-out inputs for one completion
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSnapshot {
    /// Token under the cursor
    pub word: String,
    pub prompt: Prompt,
}

/// Deferred half of a completion request
pub struct CompletionJob {
    snapshot: CompletionSnapshot,
    backend: Arc<BackendContext>,
}

impl CompletionPipeline {
    pub fn new(backend: Arc<BackendContext>, config: &ServerConfig) -> Self {
        Self {
            backend,
            context_window: config.context_window,
            generation_length: config.generation_length,
        }
    }

    /// Read the cursor context for `uri` and package it for a worker
    pub fn prepare<F: FileSystemTrait>(
        &self,
        workspace: &mut Workspace<F>,
        uri: &str,
        position: Position,
    ) -> Result<CompletionJob, WorkspaceError> {
        let context_paths = workspace.context_paths(uri)?;
        let document = workspace.get_document(uri)?;

        let snapshot = CompletionSnapshot {
            word: document.word_at(position),
            prompt: Prompt {
                text: document.read_before(position, self.context_window),
                max_words: self.generation_length,
                context_paths,
            },
        };

        debug!(
            "Prepared completion for {} at {}:{} (word {:?}, {} chars of context)",
            uri,
            position.line,
            position.character,
            snapshot.word,
            snapshot.prompt.text.chars().count()
        );

        Ok(CompletionJob {
            snapshot,
            backend: self.backend.clone(),
        })
    }
}

impl CompletionJob {
    #[cfg(test)]
    pub fn snapshot(&self) -> &CompletionSnapshot {
        &self.snapshot
    }

    /// Generate under the backend gate; blocks the calling thread
    pub fn run(self) -> Result<CompletionList, BackendError> {
        let generated = self.backend.generate(&self.snapshot.prompt)?;
        Ok(completion_list(&self.snapshot.word, &generated))
    }
}

/// A single text item continuing the word at the cursor
fn completion_list(word: &str, generated: &str) -> CompletionList {
    let label = format!("{} {}", word, generated).trim().to_string();

    CompletionList {
        is_incomplete: false,
        items: vec![CompletionItem {
            label,
            kind: Some(CompletionItemKind::TEXT),
            ..Default::default()
        }],
    }
}
