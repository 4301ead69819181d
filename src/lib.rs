//! # shadow-copy - Space-efficient directory snapshots
//!
//! A library (and CLI) for cheap, frequent, file-level backups of a working
//! directory. Each snapshot is an attribute-preserving mirror of the source
//! tree stored under a history root, with unchanged regular files hard-linked
//! to the previous snapshot so that repeated snapshots cost little more than
//! what actually changed.
//!
//! ## Overview
//!
//! - **Snapshots**: [`SnapshotWalker`] mirrors a source tree into a fresh
//!   snapshot directory, recreating symlinks, preserving POSIX attributes,
//!   and hard-linking regular files whose size and modification time are
//!   unchanged since the previous snapshot. Fresh content is copied by an
//!   external `cp --reflink=auto`, pipelined one copy at a time behind the
//!   traversal.
//! - **Filtering**: an `ignore` file in the history root holds one boolean
//!   rule expression per line ([`FilterExpression`]); the compiled
//!   [`FileFilter`] indexes exact-match rules for constant-time exclusion.
//! - **Diffing**: [`DiffWalker`] classifies every entry of two trees (or a
//!   snapshot against the live tree) as new, deleted, modified or
//!   attribute-changed.
//! - **History**: the [`registry`] names snapshot directories so that
//!   lexicographic order is chronological order, addresses them by a 1-based
//!   most-recent-first index, and prunes all but the newest N.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shadow_copy::{registry, FileFilter, SnapshotWalker};
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> shadow_copy::Result<()> {
//! let source = PathBuf::from("/home/user/project");
//! let history = source.join(".shadow-copy");
//!
//! let filter = FileFilter::for_history_dir(&history)?;
//! let prior = registry::find_by_index(&history, 1)?;
//! let snapshot = registry::create_snapshot_dir(
//!     &history,
//!     chrono::Local::now().naive_local(),
//! )?;
//! SnapshotWalker::new(source, snapshot, prior, &filter).walk()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Dedup heuristic
//!
//! Two regular files are considered identical when their byte size and
//! modification time are equal — a deliberate trade-off, not a content hash.
//! A file rewritten with the same size within the filesystem's timestamp
//! granularity is wrongly deduplicated; in exchange, no snapshot ever reads
//! file content. Copies therefore preserve true modification times, and the
//! walker never re-syncs attributes of a hard-linked destination (the inode
//! is shared with the prior snapshot).
//!
//! ## Concurrency
//!
//! The engine is single-threaded with one exception: at most one external
//! copy process runs in the background, overlapped with the traversal of the
//! following siblings. Nothing else overlaps, there is no mid-walk
//! cancellation, and concurrent snapshot/purge runs against one history root
//! are not supported.

// Public API modules
pub mod attrs;
pub mod copier;
pub mod diff;
pub mod error;
pub mod expression;
pub mod filter;
pub mod record;
pub mod registry;
pub mod utils;
pub mod walker;

// Re-export main types for convenience
pub use diff::{ChangeKind, DiffWalker};
pub use error::{Result, ShadowError};
pub use expression::{FilterExpression, MatchKind, MatcherFn, Operator, Subject};
pub use filter::{FileFilter, DEFAULT_HISTORY_DIR_NAME, IGNORE_FILE_NAME};
pub use record::FileRecord;
pub use registry::DEFAULT_RETENTION;
pub use walker::SnapshotWalker;
