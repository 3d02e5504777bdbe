//! Text buffer for one document
//!
//! Positions are zero-based `(line, character)` pairs where a character is
//! one Unicode scalar value. Offsets returned by [`Document::offset_at`] are
//! character offsets into the source, never byte offsets.

use lsp_types::{Position, Range};
use std::path::PathBuf;
use tracing::debug;

use crate::io::{FileSystemTrait, RealFileSystem};

/// One document's text plus its derived line index
///
/// A document created without text is a disk-backed placeholder; its source
/// is read from disk the first time anything looks at it.
#[derive(Debug)]
pub struct Document<F: FileSystemTrait = RealFileSystem> {
    uri: String,
    /// Filesystem location, when the URI has one
    path: Option<PathBuf>,
    source: Option<String>,
    /// Always the decomposition of `source` at line terminators
    lines: Vec<String>,
    version: Option<i32>,
    /// Auxiliary project directories, resolved on first use
    extra_context_paths: Option<Vec<PathBuf>>,
    fs: F,
}

impl<F: FileSystemTrait> Document<F> {
    pub fn new(
        uri: impl Into<String>,
        path: Option<PathBuf>,
        source: Option<String>,
        version: Option<i32>,
        fs: F,
    ) -> Self {
        let mut document = Self {
            uri: uri.into(),
            path,
            source: None,
            lines: Vec::new(),
            version,
            extra_context_paths: None,
            fs,
        };
        if let Some(source) = source {
            document.set_source(source);
        }
        document
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn version(&self) -> Option<i32> {
        self.version
    }

    pub fn set_version(&mut self, version: Option<i32>) {
        if version.is_some() {
            self.version = version;
        }
    }

    /// Whether the source is held in memory (client-owned or already read from disk)
    #[cfg(test)]
    pub fn is_materialized(&self) -> bool {
        self.source.is_some()
    }

    #[cfg(test)]
    pub fn source(&mut self) -> &str {
        self.materialize();
        self.source.as_deref().unwrap_or_default()
    }

    #[cfg(test)]
    pub fn lines(&mut self) -> &[String] {
        self.materialize();
        &self.lines
    }

    pub(crate) fn extra_context_paths(&self) -> Option<&[PathBuf]> {
        self.extra_context_paths.as_deref()
    }

    pub(crate) fn set_extra_context_paths(&mut self, paths: Vec<PathBuf>) {
        self.extra_context_paths = Some(paths);
    }

    /// Linear character offset of a position
    ///
    /// Lines past the end resolve to the end of the document and characters
    /// past the end of a line resolve to the end of that line's content.
    pub fn offset_at(&mut self, position: Position) -> usize {
        self.materialize();
        offset_in_lines(&self.lines, position)
    }

    /// The identifier-like token touching the cursor, or "" when there is none
    pub fn word_at(&mut self, position: Position) -> String {
        let offset = self.offset_at(position);
        let source = self.source.as_deref().unwrap_or_default();
        let split = byte_index(source, offset);

        let (before, after) = source.split_at(split);
        let start = before
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_word_char(*c))
            .last()
            .map_or(split, |(index, _)| index);
        let end = after
            .char_indices()
            .find(|(_, c)| !is_word_char(*c))
            .map_or(source.len(), |(index, _)| split + index);

        source[start..end].to_string()
    }

    /// At most `max_chars` characters immediately preceding the position
    pub fn read_before(&mut self, position: Position, max_chars: usize) -> String {
        let offset = self.offset_at(position);
        let source = self.source.as_deref().unwrap_or_default();

        let start = byte_index(source, offset.saturating_sub(max_chars));
        let end = byte_index(source, offset);
        source[start..end].to_string()
    }

    /// Splice `new_text` over `range`, or replace the whole text when `range` is absent
    pub fn apply_change(&mut self, range: Option<Range>, new_text: &str) {
        let Some(range) = range else {
            self.set_source(new_text.to_string());
            return;
        };

        let start = self.offset_at(range.start);
        let end = self.offset_at(range.end);
        let (start, end) = if start <= end { (start, end) } else { (end, start) };

        let source = self.source.as_deref().unwrap_or_default();
        let start = byte_index(source, start);
        let end = byte_index(source, end);

        let mut updated = String::with_capacity(source.len() - (end - start) + new_text.len());
        updated.push_str(&source[..start]);
        updated.push_str(new_text);
        updated.push_str(&source[end..]);

        self.set_source(updated);
    }

    fn set_source(&mut self, source: String) {
        self.lines = split_lines(&source);
        self.source = Some(source);
    }

    /// Read a placeholder's text from disk; missing files read as empty
    fn materialize(&mut self) {
        if self.source.is_some() {
            return;
        }

        let source = match &self.path {
            Some(path) => self.fs.read_to_string(path).unwrap_or_else(|e| {
                debug!("Document {} not readable from {}: {}", self.uri, path.display(), e);
                String::new()
            }),
            None => String::new(),
        };
        self.set_source(source);
    }
}

// ============================================================================
// Line and offset arithmetic
// ============================================================================

/// Split text into lines, each keeping its terminator (`\n`, `\r\n` or `\r`)
pub fn split_lines(source: &str) -> Vec<String> {
    let bytes = source.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut index = 0;

    while index < bytes.len() {
        match bytes[index] {
            b'\n' => {
                lines.push(source[start..=index].to_string());
                start = index + 1;
            }
            b'\r' => {
                if bytes.get(index + 1) == Some(&b'\n') {
                    index += 1;
                }
                lines.push(source[start..=index].to_string());
                start = index + 1;
            }
            _ => {}
        }
        index += 1;
    }

    if start < bytes.len() {
        lines.push(source[start..].to_string());
    }
    lines
}

fn offset_in_lines(lines: &[String], position: Position) -> usize {
    let line = position.line as usize;
    if line >= lines.len() {
        return lines.iter().map(|l| l.chars().count()).sum();
    }

    let before: usize = lines[..line].iter().map(|l| l.chars().count()).sum();
    before + (position.character as usize).min(content_length(&lines[line]))
}

/// Character count of a line without its terminator
fn content_length(line: &str) -> usize {
    line.trim_end_matches(['\r', '\n']).chars().count()
}

/// Byte index of a character offset, clamped to the end of the text
fn byte_index(source: &str, char_offset: usize) -> usize {
    source
        .char_indices()
        .nth(char_offset)
        .map_or(source.len(), |(index, _)| index)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
