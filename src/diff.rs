//! Tree comparison between two snapshots, or a snapshot and the live tree
//!
//! The walker visits, per directory level, the union of child names present
//! on either side, in filename order, and classifies each retained member:
//!
//! - `[DELETED ]` — present only on the old side;
//! - `[NEW     ]` — present only on the new side;
//! - `[MODIFIED]` — content differs (symlink target, file bytes, or a type
//!   change);
//! - `[CHANGED ]` — content identical but owner, group or permission bits
//!   differ.
//!
//! Regular files use a two-tier content test: unequal sizes differ
//! immediately; equal modification times are trusted as unchanged; otherwise
//! both files are read in fixed-size chunks and compared byte for byte.
//! Directories are recursed into whenever either side is one, regardless of
//! what was reported for the directory itself.

use crate::error::Result;
use crate::filter::FileFilter;
use crate::record::FileRecord;
use crate::utils::{resolve, suffix_directory, DOT};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::io::{BufReader, Read, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Buffer size of the byte-for-byte content comparison
const COMPARE_CHUNK_SIZE: usize = 4096;

/// How one union member differs between the two sides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Present only on the old side
    Deleted,
    /// Present only on the new side
    New,
    /// Content differs
    Modified,
    /// Only ownership or permission bits differ
    Changed,
}

impl ChangeKind {
    /// The fixed-width bracketed tag prefixing a diff line
    pub fn tag(self) -> &'static str {
        match self {
            ChangeKind::Deleted => "[DELETED ]",
            ChangeKind::New => "[NEW     ]",
            ChangeKind::Modified => "[MODIFIED]",
            ChangeKind::Changed => "[CHANGED ]",
        }
    }
}

/// Compares an old tree against a new tree and writes one line per change
pub struct DiffWalker<'a, W: Write> {
    old_root: PathBuf,
    new_root: PathBuf,
    filter: &'a FileFilter,
    out: W,
}

impl<'a, W: Write> DiffWalker<'a, W> {
    /// Prepare a comparison of `old_root` against `new_root`
    pub fn new(
        old_root: PathBuf,
        new_root: PathBuf,
        filter: &'a FileFilter,
        out: W,
    ) -> DiffWalker<'a, W> {
        DiffWalker {
            old_root,
            new_root,
            filter,
            out,
        }
    }

    /// Walk both trees and emit the classification lines
    pub fn walk(&mut self) -> Result<()> {
        debug!(
            old = %self.old_root.display(),
            new = %self.new_root.display(),
            "comparing trees"
        );
        self.walk_dir(Path::new(DOT))
    }

    fn walk_dir(&mut self, relative_dir: &Path) -> Result<()> {
        let old_dir = resolve(&self.old_root, relative_dir);
        let new_dir = resolve(&self.new_root, relative_dir);

        let mut names: BTreeSet<OsString> = BTreeSet::new();
        for dir in [&new_dir, &old_dir] {
            if dir.symlink_metadata().map(|m| m.is_dir()).unwrap_or(false) {
                for entry in fs::read_dir(dir)? {
                    names.insert(entry?.file_name());
                }
            }
        }

        for name in names {
            let child_relative = resolve(relative_dir, Path::new(&name));
            let new_path = new_dir.join(&name);
            let old_path = old_dir.join(&name);
            // The new-side path is the canonical identity for filtering,
            // whether or not it still exists.
            let record = FileRecord::new(&new_path, &child_relative);
            if self.filter.excludes(&record)? {
                continue;
            }

            let new_attributes = fs::symlink_metadata(&new_path).ok();
            let old_attributes = fs::symlink_metadata(&old_path).ok();
            let is_directory = match (&old_attributes, &new_attributes) {
                (Some(old), None) => {
                    self.emit(ChangeKind::Deleted, &child_relative, old.is_dir())?;
                    old.is_dir()
                }
                (None, Some(new)) => {
                    self.emit(ChangeKind::New, &child_relative, new.is_dir())?;
                    new.is_dir()
                }
                (Some(old), Some(new)) => {
                    let is_directory = new.is_dir() || old.is_dir();
                    if is_content_modified(&new_path, new, &old_path, old)? {
                        self.emit(ChangeKind::Modified, &child_relative, is_directory)?;
                    } else if is_attributes_modified(new, old) {
                        self.emit(ChangeKind::Changed, &child_relative, is_directory)?;
                    }
                    is_directory
                }
                (None, None) => false,
            };
            if is_directory {
                self.walk_dir(&child_relative)?;
            }
        }
        Ok(())
    }

    fn emit(&mut self, kind: ChangeKind, relative: &Path, is_directory: bool) -> Result<()> {
        writeln!(
            self.out,
            "{} {}",
            kind.tag(),
            suffix_directory(&relative.to_string_lossy(), is_directory)
        )?;
        Ok(())
    }
}

fn is_content_modified(
    new_path: &Path,
    new_attributes: &fs::Metadata,
    old_path: &Path,
    old_attributes: &fs::Metadata,
) -> Result<bool> {
    let new_type = new_attributes.file_type();
    let old_type = old_attributes.file_type();
    if new_type.is_symlink() {
        return Ok(!old_type.is_symlink() || fs::read_link(new_path)? != fs::read_link(old_path)?);
    }
    if new_type.is_file() {
        if !old_type.is_file() || new_attributes.len() != old_attributes.len() {
            return Ok(true);
        }
        // Fast path: an equal modification time is trusted as unchanged.
        if new_attributes.mtime() == old_attributes.mtime()
            && new_attributes.mtime_nsec() == old_attributes.mtime_nsec()
        {
            return Ok(false);
        }
        return Ok(!has_same_content(new_path, old_path)?);
    }
    if new_type.is_dir() {
        return Ok(!old_type.is_dir());
    }
    // Content of other entry types is not comparable.
    Ok(false)
}

fn is_attributes_modified(new_attributes: &fs::Metadata, old_attributes: &fs::Metadata) -> bool {
    new_attributes.uid() != old_attributes.uid()
        || new_attributes.gid() != old_attributes.gid()
        || new_attributes.mode() & 0o777 != old_attributes.mode() & 0o777
}

/// Byte-for-byte comparison in fixed-size chunks, first mismatch wins
fn has_same_content(path1: &Path, path2: &Path) -> Result<bool> {
    if fs::metadata(path1)?.len() != fs::metadata(path2)?.len() {
        return Ok(false);
    }
    let mut reader1 = BufReader::new(fs::File::open(path1)?);
    let mut reader2 = BufReader::new(fs::File::open(path2)?);
    let mut buffer1 = [0u8; COMPARE_CHUNK_SIZE];
    let mut buffer2 = [0u8; COMPARE_CHUNK_SIZE];
    loop {
        let count1 = fill_chunk(&mut reader1, &mut buffer1)?;
        let count2 = fill_chunk(&mut reader2, &mut buffer2)?;
        if buffer1[..count1] != buffer2[..count2] {
            return Ok(false);
        }
        if count1 == 0 && count2 == 0 {
            return Ok(true);
        }
    }
}

/// Read until the buffer is full or the stream ends
fn fill_chunk(reader: &mut impl Read, buffer: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let count = reader.read(&mut buffer[filled..])?;
        if count == 0 {
            break;
        }
        filled += count;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tempfile::TempDir;

    fn diff_lines(old: &Path, new: &Path) -> Vec<String> {
        let filter = FileFilter::new();
        let mut out = Vec::new();
        DiffWalker::new(old.to_path_buf(), new.to_path_buf(), &filter, &mut out)
            .walk()
            .unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_identical_trees_are_silent() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        for root in [&old, &new] {
            fs::create_dir(root).unwrap();
            fs::write(root.join("f1.txt"), "Test data").unwrap();
        }
        let stamp = FileTime::from_unix_time(1_534_672_800, 0);
        filetime::set_file_times(old.join("f1.txt"), stamp, stamp).unwrap();
        filetime::set_file_times(new.join("f1.txt"), stamp, stamp).unwrap();

        assert!(diff_lines(&old, &new).is_empty());
    }

    #[test]
    fn test_classification_scenario() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        fs::create_dir(&old).unwrap();
        fs::create_dir(&new).unwrap();
        for name in ["f1", "f2", "f3", "f4"] {
            fs::write(old.join(name), "Test data").unwrap();
        }
        for name in ["f1", "f3"] {
            fs::copy(old.join(name), new.join(name)).unwrap();
        }
        fs::write(new.join("f4"), "Test data2").unwrap();
        fs::write(new.join("f5"), "Test data").unwrap();
        // Keep the unchanged files on the fast path.
        let stamp = FileTime::from_unix_time(1_534_672_800, 0);
        for name in ["f1", "f3"] {
            filetime::set_file_times(old.join(name), stamp, stamp).unwrap();
            filetime::set_file_times(new.join(name), stamp, stamp).unwrap();
        }

        assert_eq!(
            diff_lines(&old, &new),
            vec![
                "[DELETED ] f2".to_string(),
                "[MODIFIED] f4".to_string(),
                "[NEW     ] f5".to_string(),
            ]
        );
    }

    #[test]
    fn test_slow_path_detects_equal_content() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        fs::create_dir(&old).unwrap();
        fs::create_dir(&new).unwrap();
        fs::write(old.join("f.txt"), "same bytes").unwrap();
        fs::write(new.join("f.txt"), "same bytes").unwrap();
        // Different mtimes force the byte comparison.
        filetime::set_file_times(
            old.join("f.txt"),
            FileTime::from_unix_time(1_534_672_800, 0),
            FileTime::from_unix_time(1_534_672_800, 0),
        )
        .unwrap();
        filetime::set_file_times(
            new.join("f.txt"),
            FileTime::from_unix_time(1_534_759_200, 0),
            FileTime::from_unix_time(1_534_759_200, 0),
        )
        .unwrap();

        assert!(diff_lines(&old, &new).is_empty());
    }

    #[test]
    fn test_slow_path_detects_changed_content() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        fs::create_dir(&old).unwrap();
        fs::create_dir(&new).unwrap();
        fs::write(old.join("f.txt"), "content A!").unwrap();
        fs::write(new.join("f.txt"), "content B!").unwrap();

        assert_eq!(diff_lines(&old, &new), vec!["[MODIFIED] f.txt".to_string()]);
    }

    #[test]
    fn test_directories_recurse_and_carry_suffix() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        fs::create_dir_all(old.join("sub")).unwrap();
        fs::create_dir(&new).unwrap();
        fs::write(old.join("sub/inner.txt"), "x").unwrap();

        assert_eq!(
            diff_lines(&old, &new),
            vec![
                "[DELETED ] sub/".to_string(),
                "[DELETED ] sub/inner.txt".to_string(),
            ]
        );
    }

    #[test]
    fn test_symlink_target_change_is_modified() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        fs::create_dir(&old).unwrap();
        fs::create_dir(&new).unwrap();
        std::os::unix::fs::symlink("a.txt", old.join("link")).unwrap();
        std::os::unix::fs::symlink("b.txt", new.join("link")).unwrap();

        assert_eq!(diff_lines(&old, &new), vec!["[MODIFIED] link".to_string()]);
    }

    #[test]
    fn test_permission_change_is_changed() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        fs::create_dir(&old).unwrap();
        fs::create_dir(&new).unwrap();
        fs::write(old.join("f.txt"), "same").unwrap();
        fs::write(new.join("f.txt"), "same").unwrap();
        let stamp = FileTime::from_unix_time(1_534_672_800, 0);
        for root in [&old, &new] {
            filetime::set_file_times(root.join("f.txt"), stamp, stamp).unwrap();
        }
        fs::set_permissions(old.join("f.txt"), fs::Permissions::from_mode(0o644)).unwrap();
        fs::set_permissions(new.join("f.txt"), fs::Permissions::from_mode(0o600)).unwrap();

        assert_eq!(diff_lines(&old, &new), vec!["[CHANGED ] f.txt".to_string()]);
    }

    #[test]
    fn test_filter_applies_to_both_sides() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        fs::create_dir(&old).unwrap();
        fs::create_dir(&new).unwrap();
        fs::write(old.join("gone.tmp"), "x").unwrap();
        fs::write(new.join("fresh.tmp"), "x").unwrap();

        let filter = FileFilter::load("filename:end-with:.tmp").unwrap();
        let mut out = Vec::new();
        DiffWalker::new(old, new, &filter, &mut out).walk().unwrap();
        assert!(out.is_empty());
    }
}
