//! File system abstraction layer
//!
//! Provides trait-based abstractions for the handful of file system
//! operations the workspace needs, so disk-backed documents and marker-file
//! lookups can be tested against an in-memory tree.

use std::path::Path;

// ============================================================================
// File System Trait
// ============================================================================

/// Trait for file system operations
pub trait FileSystemTrait: Clone + Send + Sync {
    /// Check if a file or directory exists
    fn exists(&self, path: &Path) -> bool;

    /// Read file contents as bytes
    fn read(&self, path: &Path) -> Result<Vec<u8>, std::io::Error>;

    /// Read file contents as text
    ///
    /// A UTF-8 byte order mark is stripped; bytes that are not valid UTF-8
    /// are decoded as Latin-1 so legacy files still produce usable text.
    fn read_to_string(&self, path: &Path) -> Result<String, std::io::Error> {
        let bytes = self.read(path)?;
        Ok(decode_text(&bytes))
    }
}

/// Decode raw file bytes into text
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(content) => content.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

// ============================================================================
// Real File System Implementation
// ============================================================================

/// Real file system implementation using std::fs
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystemTrait for RealFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, std::io::Error> {
        std::fs::read(path)
    }
}

// ============================================================================
// Test File System Implementation
// ============================================================================


#[cfg(test)]
pub use test_filesystem::TestFileSystem;

// ============================================================================
// Tests
// ============================================================================
