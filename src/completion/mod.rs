//! Completion generation
//!
//! - **Backend**: the [`CompletionBackend`] capability and the shared
//!   [`BackendContext`] that serializes access to it
//! - **Pipeline**: splitting a completion request into a workspace read on
//!   the dispatcher loop and a generation on the worker pool
//! - **Bigram**: the built-in backend

pub mod backend;
pub mod bigram;
pub mod pipeline;

pub use backend::{BackendContext, BackendError};
#[cfg(test)]
pub use backend::{CompletionBackend, Prompt};
pub use bigram::BigramBackend;
pub use pipeline::CompletionPipeline;
