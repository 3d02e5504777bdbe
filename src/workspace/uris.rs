//! Conversions between `file://` URIs and filesystem paths

use std::path::{Path, PathBuf};
use url::Url;

/// Whether a string parses as an absolute URI
pub fn is_valid_uri(uri: &str) -> bool {
    Url::parse(uri).is_ok()
}

/// Filesystem path named by a `file://` URI; other schemes have none
pub fn to_fs_path(uri: &str) -> Option<PathBuf> {
    let url = Url::parse(uri).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    url.to_file_path().ok()
}

/// `file://` URI for an absolute path
pub fn from_fs_path(path: &Path) -> Option<String> {
    Url::from_file_path(path).ok().map(String::from)
}
