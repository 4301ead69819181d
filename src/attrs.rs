//! POSIX attribute synchronization
//!
//! Snapshots mirror ownership, permission bits and timestamps of the source.
//! Every setter here is guarded by a comparison against the destination's
//! current state, so an already-matching attribute costs one lstat and no
//! write syscall.
//!
//! Symbolic links get owner/group only: their permission bits are fixed on
//! Linux, and their timestamps are not mirrored (the link target's are what
//! matters). Hard-linked destinations must not be synchronized at all — they
//! share inode metadata with the prior snapshot's file, and the caller skips
//! the call entirely.

use crate::error::Result;
use filetime::FileTime;
use std::fs;
use std::os::unix::fs::{lchown, MetadataExt, PermissionsExt};
use std::path::Path;
use tracing::trace;

/// Permission bits compared and mirrored (the rwxrwxrwx set)
const MODE_MASK: u32 = 0o777;

/// Make the attributes of `destination` match `source`
///
/// `source` must come from an lstat of the original entry; `destination` is
/// lstat'd here. Only differing attributes are written: owner/group via
/// lchown, permission bits via chmod (skipped for symlinks), and modification
/// plus access time together whenever either differs (skipped for symlinks).
pub fn sync_attributes(source: &fs::Metadata, destination: &Path) -> Result<()> {
    let current = fs::symlink_metadata(destination)?;

    let uid = (source.uid() != current.uid()).then(|| source.uid());
    let gid = (source.gid() != current.gid()).then(|| source.gid());
    if uid.is_some() || gid.is_some() {
        trace!(path = %destination.display(), "syncing ownership");
        lchown(destination, uid, gid)?;
    }

    if source.file_type().is_symlink() {
        return Ok(());
    }

    if source.mode() & MODE_MASK != current.mode() & MODE_MASK {
        trace!(path = %destination.display(), "syncing permissions");
        fs::set_permissions(
            destination,
            fs::Permissions::from_mode(source.mode() & MODE_MASK),
        )?;
    }

    let source_mtime = FileTime::from_last_modification_time(source);
    let source_atime = FileTime::from_last_access_time(source);
    if source_mtime != FileTime::from_last_modification_time(&current)
        || source_atime != FileTime::from_last_access_time(&current)
    {
        trace!(path = %destination.display(), "syncing timestamps");
        filetime::set_file_times(destination, source_atime, source_mtime)?;
    }

    Ok(())
}
