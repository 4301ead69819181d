//! External copy execution
//!
//! Fresh file content is never copied by this process. The walker delegates
//! to `/bin/cp --reflink=auto --preserve=all`, which shares data blocks on
//! filesystems that support copy-on-write and falls back to a full byte copy
//! elsewhere, preserving ownership, permissions, timestamps and sparseness
//! either way.
//!
//! A started copy is represented by a [`PendingCopy`] value. The walker holds
//! at most one and must [`PendingCopy::wait`] it before starting the next, so
//! the copy overlaps exactly one stretch of traversal and a failure is
//! observed no later than the next copy request.

use crate::error::{Result, ShadowError};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use tracing::trace;

const CP_PROGRAM: &str = "/bin/cp";

/// Start an attribute-preserving copy of `source` to `destination`
///
/// Returns immediately with the running process; the caller decides when to
/// await it.
pub fn start_copy(source: &Path, destination: &Path) -> Result<PendingCopy> {
    let args = [
        "--reflink=auto",
        "--preserve=all",
        "--no-target-directory",
    ];
    let child = Command::new(CP_PROGRAM)
        .args(args)
        .arg(source)
        .arg(destination)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;
    let command = quote_command(
        std::iter::once(CP_PROGRAM)
            .chain(args)
            .map(str::to_string)
            .chain([
                source.to_string_lossy().into_owned(),
                destination.to_string_lossy().into_owned(),
            ]),
    );
    trace!(%command, "started background copy");
    Ok(PendingCopy { command, child })
}

/// A copy process that has been started but not yet checked
pub struct PendingCopy {
    command: String,
    child: Child,
}

impl PendingCopy {
    /// Await the copy and check its outcome
    ///
    /// A non-zero exit surfaces as [`ShadowError::CopyFailed`] carrying the
    /// quoted command line and everything the process wrote to stderr.
    pub fn wait(mut self) -> Result<()> {
        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            pipe.read_to_string(&mut stderr)?;
        }
        let status = self.child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(ShadowError::CopyFailed {
                status: status.code().unwrap_or(-1),
                command: self.command,
                stderr,
            })
        }
    }

    /// The quoted command line this copy was started with
    pub fn command(&self) -> &str {
        &self.command
    }
}

/// Quote a command line for diagnostics: each element double-quoted, with
/// backslashes and quotes escaped
fn quote_command(elements: impl Iterator<Item = String>) -> String {
    elements
        .map(|element| {
            format!(
                "\"{}\"",
                element.replace('\\', "\\\\").replace('"', "\\\"")
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}
