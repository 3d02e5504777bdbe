//! Generation backend capability and the context that owns it

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use thiserror::Error;
use tracing::{Level, debug, info};

use crate::log_timing;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Backend initialization failed: {0}")]
    Initialization(String),

    #[error("Generation failed: {0}")]
    Generation(String),
}

/// Input handed to a backend for one completion
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    /// Text immediately before the cursor
    pub text: String,
    /// Upper bound on generated words
    pub max_words: usize,
    /// Project directories the document belongs to
    pub context_paths: Vec<PathBuf>,
}

/// A text generator that may be slow and is not reentrant
///
/// Implementations are called from worker threads, one call at a time.
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// One-time warm-up; called before the first generation
    fn initialize(&self) -> Result<(), BackendError>;

    /// Produce a continuation of `prompt.text`
    fn generate(&self, prompt: &Prompt) -> Result<String, BackendError>;
}

/// Process-wide handle on the backend
///
/// Constructed once at startup and shared by every completion. All backend
/// calls, including warm-up, run under a single-flight gate; waiting callers
/// get no ordering guarantee.
pub struct BackendContext {
    backend: Arc<dyn CompletionBackend>,
    gate: Mutex<()>,
    /// Only read or written while holding `gate`
    initialized: AtomicBool,
}

impl BackendContext {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            gate: Mutex::new(()),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Initialize the backend if that has not happened yet; safe to repeat
    pub fn warm_up(&self) -> Result<(), BackendError> {
        let _guard = self.enter();
        self.ensure_initialized()
    }

    /// Run one generation under the gate
    pub fn generate(&self, prompt: &Prompt) -> Result<String, BackendError> {
        let _guard = self.enter();
        self.ensure_initialized()?;

        let start = Instant::now();
        let result = self.backend.generate(prompt);
        log_timing!(Level::DEBUG, "generate", start.elapsed());
        result
    }

    /// Blocks until no other backend call is in flight
    fn enter(&self) -> MutexGuard<'_, ()> {
        // Poisoning is irrelevant for a unit gate
        self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_initialized(&self) -> Result<(), BackendError> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let start = Instant::now();
        self.backend.initialize()?;
        self.initialized.store(true, Ordering::Release);

        info!("Completion backend '{}' initialized", self.backend.name());
        debug!("Backend warm-up took {:?}", start.elapsed());
        Ok(())
    }
}
