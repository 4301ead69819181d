//! Snapshot directory naming, listing and retention
//!
//! Snapshots live directly under a history root and are named
//! `YYYY.MM.DD-HHhMM-N`, where `N` is the smallest positive integer not yet
//! taken for that minute. The fixed-width date part makes lexicographic
//! filename order identical to chronological order, so listing, the 1-based
//! "most recent first" index addressing, and retention all reduce to one
//! sorted directory listing.
//!
//! Naming takes the timestamp as an explicit argument instead of reading a
//! clock, so callers (and tests) control it.

use crate::error::{Result, ShadowError};
use chrono::NaiveDateTime;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, trace};

/// Snapshots kept by `purge` when no count is given
pub const DEFAULT_RETENTION: usize = 10;

/// Strftime pattern for the date part of a snapshot name
const NAME_DATE_FORMAT: &str = "%Y.%m.%d-%Hh%M";

/// Full-match pattern for snapshot directory names
fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\d{4,}\.\d{2}\.\d{2}-\d{2}h\d{2}-\d+$").expect("valid name pattern")
    })
}

/// Whether `name` is a snapshot directory name
pub fn is_snapshot_name(name: &str) -> bool {
    name_pattern().is_match(name)
}

/// Create a fresh snapshot directory under `history_root` for instant `at`
///
/// The history root itself is created when absent. The sequence number
/// starts at 1 and is probed upward until a free name is found, so two
/// snapshots within the same minute get distinct names.
pub fn create_snapshot_dir(history_root: &Path, at: NaiveDateTime) -> Result<PathBuf> {
    if !history_root.is_dir() {
        fs::create_dir(history_root)?;
    }
    let date = at.format(NAME_DATE_FORMAT).to_string();
    let mut index = 1u32;
    let mut snapshot = history_root.join(format!("{}-{}", date, index));
    while snapshot.is_dir() {
        index += 1;
        snapshot = history_root.join(format!("{}-{}", date, index));
    }
    fs::create_dir(&snapshot)?;
    debug!(path = %snapshot.display(), "created snapshot directory");
    Ok(snapshot)
}

/// All snapshot directories under `history_root`, oldest first
///
/// Children whose names do not match the snapshot pattern are ignored; a
/// missing history root yields an empty list.
pub fn history(history_root: &Path) -> Result<Vec<PathBuf>> {
    if !history_root.is_dir() {
        return Ok(Vec::new());
    }
    let mut snapshots: Vec<PathBuf> = fs::read_dir(history_root)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .map(|name| is_snapshot_name(&name.to_string_lossy()))
                .unwrap_or(false)
        })
        .collect();
    snapshots.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    trace!(count = snapshots.len(), "listed snapshot history");
    Ok(snapshots)
}

/// Look up a snapshot by its 1-based history index
///
/// Index 1 is the most recent snapshot, index `k` the k-th most recent. Any
/// index below 1 is the "no prior snapshot" sentinel and yields `None`, as
/// does an index beyond the number of existing snapshots.
pub fn find_by_index(history_root: &Path, index: i32) -> Result<Option<PathBuf>> {
    if index < 1 {
        return Ok(None);
    }
    let snapshots = history(history_root)?;
    let position = snapshots.len() as i64 - index as i64;
    if position < 0 {
        return Ok(None);
    }
    Ok(snapshots.into_iter().nth(position as usize))
}

/// Delete every snapshot older than the `keep` most recent ones
///
/// Returns the deleted snapshot paths, oldest first.
pub fn purge(history_root: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    let snapshots = history(history_root)?;
    let delete_count = snapshots.len().saturating_sub(keep);
    let mut deleted = Vec::with_capacity(delete_count);
    for snapshot in snapshots.into_iter().take(delete_count) {
        fs::remove_dir_all(&snapshot).map_err(|source| ShadowError::Delete {
            path: snapshot.clone(),
            source,
        })?;
        debug!(path = %snapshot.display(), "purged snapshot");
        deleted.push(snapshot);
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn minute(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn test_name_pattern() {
        assert!(is_snapshot_name("2018.08.19-10h17-1"));
        assert!(is_snapshot_name("2018.08.19-10h17-12"));
        assert!(!is_snapshot_name("2018.08.19-10h17"));
        assert!(!is_snapshot_name("2018-08-19-10h17-1"));
        assert!(!is_snapshot_name("ignore"));
    }

    #[test]
    fn test_create_snapshot_dir_probes_sequence() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(".shadow-copy");
        let at = minute(2018, 8, 19, 10, 17);

        let first = create_snapshot_dir(&root, at).unwrap();
        let second = create_snapshot_dir(&root, at).unwrap();
        assert_eq!(first.file_name().unwrap(), "2018.08.19-10h17-1");
        assert_eq!(second.file_name().unwrap(), "2018.08.19-10h17-2");
        assert!(first.is_dir());
        assert!(second.is_dir());
    }

    #[test]
    fn test_names_sort_chronologically() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(".shadow-copy");
        let later = create_snapshot_dir(&root, minute(2018, 9, 2, 8, 0)).unwrap();
        let earlier = create_snapshot_dir(&root, minute(2018, 8, 19, 23, 59)).unwrap();
        let same_minute = create_snapshot_dir(&root, minute(2018, 9, 2, 8, 0)).unwrap();

        let listed = history(&root).unwrap();
        assert_eq!(listed, vec![earlier, later, same_minute]);
    }

    #[test]
    fn test_history_ignores_foreign_entries() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(".shadow-copy");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("ignore"), "filename:equals:x\n").unwrap();
        fs::create_dir(root.join("not-a-snapshot")).unwrap();
        create_snapshot_dir(&root, minute(2018, 8, 19, 10, 17)).unwrap();

        assert_eq!(history(&root).unwrap().len(), 1);
    }

    #[test]
    fn test_find_by_index() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(".shadow-copy");
        let oldest = create_snapshot_dir(&root, minute(2018, 8, 19, 10, 0)).unwrap();
        let newest = create_snapshot_dir(&root, minute(2018, 8, 20, 10, 0)).unwrap();

        assert_eq!(find_by_index(&root, 1).unwrap(), Some(newest));
        assert_eq!(find_by_index(&root, 2).unwrap(), Some(oldest));
        assert_eq!(find_by_index(&root, 3).unwrap(), None);
        // Below 1 is the "use no prior snapshot" sentinel.
        assert_eq!(find_by_index(&root, 0).unwrap(), None);
        assert_eq!(find_by_index(&root, -1).unwrap(), None);
    }

    #[test]
    fn test_purge_keeps_most_recent() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(".shadow-copy");
        for day in 1..=5 {
            create_snapshot_dir(&root, minute(2018, 8, day, 12, 0)).unwrap();
        }

        let deleted = purge(&root, 2).unwrap();
        assert_eq!(deleted.len(), 3);
        let remaining = history(&root).unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(
            remaining[0].file_name().unwrap(),
            "2018.08.04-12h00-1"
        );
        assert_eq!(
            remaining[1].file_name().unwrap(),
            "2018.08.05-12h00-1"
        );
    }

    #[test]
    fn test_purge_below_retention_is_noop() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(".shadow-copy");
        create_snapshot_dir(&root, minute(2018, 8, 19, 10, 0)).unwrap();
        assert!(purge(&root, DEFAULT_RETENTION).unwrap().is_empty());
        assert_eq!(history(&root).unwrap().len(), 1);
    }
}
