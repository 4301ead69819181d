//! Snapshot creation walker
//!
//! Visits the source tree depth-first, children sorted by filename, and
//! mirrors every retained entry into the destination snapshot:
//!
//! - symbolic links are recreated with the same target;
//! - regular files are hard-linked to the previous snapshot's file when size
//!   and modification time both match (the dedup heuristic — deliberately
//!   not a content hash), and otherwise handed to the external copier;
//! - directories are created, attribute-synced and recursed into;
//! - anything else (fifo, device, socket) becomes a small text placeholder.
//!
//! Exactly one external copy may run in the background, overlapped with the
//! traversal of subsequent siblings. Starting a new copy first awaits and
//! checks the previous one, and the end of the walk drains whatever is still
//! in flight — including on error paths, so no copy process is orphaned.

use crate::attrs::sync_attributes;
use crate::copier::{start_copy, PendingCopy};
use crate::error::Result;
use crate::filter::FileFilter;
use crate::record::FileRecord;
use crate::utils::{resolve, DOT};
use chrono::{DateTime, SecondsFormat, Utc};
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Creates one snapshot of a source tree
///
/// Holds the traversal state for a single `walk` invocation; build a new
/// walker per snapshot.
pub struct SnapshotWalker<'a> {
    source_root: PathBuf,
    snapshot_root: PathBuf,
    prior_snapshot: Option<PathBuf>,
    filter: &'a FileFilter,
    pending_copy: Option<PendingCopy>,
}

impl<'a> SnapshotWalker<'a> {
    /// Prepare a walk of `source_root` into the (already created, empty)
    /// `snapshot_root`, deduplicating against `prior_snapshot` when given
    pub fn new(
        source_root: PathBuf,
        snapshot_root: PathBuf,
        prior_snapshot: Option<PathBuf>,
        filter: &'a FileFilter,
    ) -> SnapshotWalker<'a> {
        SnapshotWalker {
            source_root,
            snapshot_root,
            prior_snapshot,
            filter,
            pending_copy: None,
        }
    }

    /// Walk the whole tree and drain the last background copy
    pub fn walk(&mut self) -> Result<()> {
        debug!(
            source = %self.source_root.display(),
            snapshot = %self.snapshot_root.display(),
            "creating shadow copy"
        );
        let walked = self.walk_dir(Path::new(DOT));
        // The in-flight copy is awaited even when the walk failed, so its
        // process never outlives the walk; the walk error wins.
        let drained = self.drain_pending_copy();
        walked?;
        drained
    }

    fn walk_dir(&mut self, relative_dir: &Path) -> Result<()> {
        let source_dir = resolve(&self.source_root, relative_dir);
        let mut children: Vec<PathBuf> = fs::read_dir(&source_dir)?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|entry| entry.path())
            .collect();
        children.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        for child in children {
            let file_name = match child.file_name() {
                Some(name) => name,
                None => continue,
            };
            let child_relative = resolve(relative_dir, Path::new(file_name));
            let record = FileRecord::new(&child, &child_relative);
            if self.filter.excludes(&record)? {
                trace!(path = %record.relative, "excluded by filter");
                continue;
            }
            let destination = self.snapshot_root.join(&child_relative);
            let attributes = fs::symlink_metadata(&child)?;
            let file_type = attributes.file_type();
            if file_type.is_symlink() {
                self.copy_symbolic_link(&child, &attributes, &destination)?;
            } else if file_type.is_file() {
                self.copy_regular_file(&child, &child_relative, &attributes, &destination)?;
            } else if file_type.is_dir() {
                self.copy_directory(&child_relative, &attributes, &destination)?;
            } else {
                self.copy_unsupported(&attributes, &destination)?;
            }
        }
        Ok(())
    }

    fn copy_symbolic_link(
        &self,
        source: &Path,
        attributes: &fs::Metadata,
        destination: &Path,
    ) -> Result<()> {
        let target = fs::read_link(source)?;
        std::os::unix::fs::symlink(&target, destination)?;
        sync_attributes(attributes, destination)
    }

    fn copy_regular_file(
        &mut self,
        source: &Path,
        relative: &Path,
        attributes: &fs::Metadata,
        destination: &Path,
    ) -> Result<()> {
        if let Some(identical) = self.find_identical_prior_file(attributes, relative)? {
            // Hard link shares the inode, so the prior copy's attributes
            // already apply; a sync here would touch both entries.
            trace!(path = %relative.display(), "deduplicated against prior snapshot");
            fs::hard_link(&identical, destination)?;
        } else {
            self.drain_pending_copy()?;
            self.pending_copy = Some(start_copy(source, destination)?);
        }
        Ok(())
    }

    fn copy_directory(
        &mut self,
        relative: &Path,
        attributes: &fs::Metadata,
        destination: &Path,
    ) -> Result<()> {
        fs::create_dir(destination)?;
        sync_attributes(attributes, destination)?;
        self.walk_dir(relative)
    }

    fn copy_unsupported(&self, attributes: &fs::Metadata, destination: &Path) -> Result<()> {
        let modified = FileTime::from_last_modification_time(attributes);
        let modified: DateTime<Utc> = DateTime::from_timestamp(
            modified.unix_seconds(),
            modified.nanoseconds(),
        )
        .unwrap_or_default();
        fs::write(
            destination,
            format!(
                "Unsupported file type, lastModifiedTime: {}",
                modified.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
        )?;
        sync_attributes(attributes, destination)
    }

    /// The prior snapshot's file at `relative`, when it is a regular file
    /// whose size and modification time both equal the source's
    fn find_identical_prior_file(
        &self,
        source_attributes: &fs::Metadata,
        relative: &Path,
    ) -> Result<Option<PathBuf>> {
        let prior_root = match &self.prior_snapshot {
            Some(root) => root,
            None => return Ok(None),
        };
        let prior_path = prior_root.join(relative);
        let prior_attributes = match fs::symlink_metadata(&prior_path) {
            Ok(attributes) => attributes,
            Err(_) => return Ok(None),
        };
        if !prior_attributes.file_type().is_file() {
            return Ok(None);
        }
        let same_mtime = FileTime::from_last_modification_time(source_attributes)
            == FileTime::from_last_modification_time(&prior_attributes);
        if !same_mtime || source_attributes.len() != prior_attributes.len() {
            return Ok(None);
        }
        Ok(Some(prior_path))
    }

    fn drain_pending_copy(&mut self) -> Result<()> {
        if let Some(pending) = self.pending_copy.take() {
            pending.wait()?;
        }
        Ok(())
    }
}
