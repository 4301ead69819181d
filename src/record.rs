//! Path classification for filter evaluation
//!
//! Every entry visited by a walker is classified once into a [`FileRecord`]:
//! the absolute path, the path relative to the tree root, and the bare
//! filename, each rendered as a string with a trailing `/` when the entry is
//! a directory. The suffix is load-bearing: it lets exact-match and end-with
//! rules distinguish a directory `build/` from a file `build` without any
//! extra syntax.

use crate::utils::suffix_directory;
use std::path::{Path, PathBuf};

/// A normalized view of one filesystem entry, as seen by the filter
///
/// Built once per visited entry and never mutated. The string fields are the
/// only thing most matchers look at; `absolute_path` is kept for the lazy
/// matchers (`max-size:`, `has-sibling:`, `symbolic-link`) that go back to
/// the filesystem at evaluation time.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Whether the entry is a directory (stat, following symlinks; false when
    /// the entry cannot be stat'd)
    pub is_directory: bool,
    /// The absolute path on disk
    pub absolute_path: PathBuf,
    /// Absolute path as a string, directory-suffixed
    pub absolute: String,
    /// Path relative to the tree root as a string, directory-suffixed
    pub relative: String,
    /// Final path component as a string, directory-suffixed
    pub filename: String,
}

impl FileRecord {
    /// Classify an entry from its absolute path and its tree-relative path
    pub fn new(absolute: &Path, relative: &Path) -> FileRecord {
        let is_directory = absolute.is_dir();
        let filename = absolute
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        FileRecord {
            is_directory,
            absolute_path: absolute.to_path_buf(),
            absolute: suffix_directory(&absolute.to_string_lossy(), is_directory),
            relative: suffix_directory(&relative.to_string_lossy(), is_directory),
            filename: suffix_directory(&filename, is_directory),
        }
    }
}
