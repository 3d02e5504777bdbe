//! I/O layer - Generic abstractions for transport and file access
//!
//! This module provides fundamental I/O abstractions that are not specific to any protocol:
//!
//! - **Transport**: Pure I/O layer for bidirectional message exchange
//! - **File system**: Injectable file access for disk-backed documents
//!
//! These abstractions are used by the protocol and workspace layers.

pub mod file_system;
pub mod transport;

pub use file_system::{FileSystemTrait, RealFileSystem};
#[cfg(test)]
pub use transport::MockTransport;
pub use transport::{StreamTransport, Transport};
