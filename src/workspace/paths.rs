//! Marker-file lookup between a document and the workspace root

use std::path::{Path, PathBuf};
use tracing::warn;

use crate::io::FileSystemTrait;

/// Marker files that identify a project directory
pub const DEFAULT_MARKERS: &[&str] = &["setup.py", "pyproject.toml", "Cargo.toml", "package.json"];

/// Find the marker files closest to `path`
///
/// Walks from the directory containing `path` up to and including `root`,
/// stopping at the first directory that holds any of `names`. Returns the
/// existing marker paths in that directory, or nothing when `path` is not
/// under `root` or no directory on the way has a marker.
pub fn find_parents<F: FileSystemTrait>(
    fs: &F,
    root: &Path,
    path: &Path,
    names: &[String],
) -> Vec<PathBuf> {
    if !path.starts_with(root) {
        warn!("Path {} not in {}", path.display(), root.display());
        return Vec::new();
    }

    let Some(start) = path.parent() else {
        return Vec::new();
    };

    for dir in start.ancestors().take_while(|dir| dir.starts_with(root)) {
        let found: Vec<PathBuf> = names
            .iter()
            .map(|name| dir.join(name))
            .filter(|candidate| fs.exists(candidate))
            .collect();

        if !found.is_empty() {
            return found;
        }
    }

    Vec::new()
}
