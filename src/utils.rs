//! Small path helpers shared across the walkers
//!
//! Traversal starts from the synthetic `.` root, so naive `Path::join` would
//! sprinkle `./` prefixes over every relative path. `resolve` joins two paths
//! while treating `.` as the identity on either side, which keeps relative
//! paths clean for display, filtering and destination resolution.

use std::path::{Path, PathBuf};

/// The synthetic root of every traversal
pub const DOT: &str = ".";

/// Join `parent` and `child`, treating `.` as the identity element
///
/// # Example
///
/// ```rust
/// use shadow_copy::utils::resolve;
/// use std::path::Path;
///
/// assert_eq!(resolve(Path::new("."), Path::new("a")), Path::new("a").to_path_buf());
/// assert_eq!(resolve(Path::new("a"), Path::new(".")), Path::new("a").to_path_buf());
/// assert_eq!(resolve(Path::new("a"), Path::new("b")), Path::new("a/b").to_path_buf());
/// ```
pub fn resolve(parent: &Path, child: &Path) -> PathBuf {
    if parent == Path::new(DOT) {
        child.to_path_buf()
    } else if child == Path::new(DOT) {
        parent.to_path_buf()
    } else {
        parent.join(child)
    }
}

/// Append a `/` to `path` when it names a directory and does not already end
/// with one
///
/// The suffix disambiguates directories from same-named files in exact-match
/// and end-with filter rules and in diff output.
pub fn suffix_directory(path: &str, is_directory: bool) -> String {
    if is_directory && !path.ends_with(std::path::MAIN_SEPARATOR) {
        format!("{}{}", path, std::path::MAIN_SEPARATOR)
    } else {
        path.to_string()
    }
}
