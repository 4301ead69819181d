//! Rule-file loading and indexed exclusion checks
//!
//! A [`FileFilter`] holds every compiled rule of an `ignore` file. Rules that
//! reduce to an exact string comparison are filed under a hash-map bucket
//! keyed by that string (one map per subject), so the common case — thousands
//! of files checked against mostly-`equals:` rules — costs three map lookups
//! instead of a scan over every rule. Rules that cannot be keyed are kept in
//! a list that is evaluated for every record.
//!
//! The index is purely an optimization: a record is excluded iff any compiled
//! rule matches it, and the bucketed layout never changes that answer. The
//! whole predicate of an `&&` rule is stored under its indexable side, so the
//! rest of the conjunction is still evaluated on a bucket hit.

use crate::error::Result;
use crate::expression::{FilterExpression, MatcherFn, Subject};
use crate::record::FileRecord;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Name of the history directory created under a source tree by default
pub const DEFAULT_HISTORY_DIR_NAME: &str = ".shadow-copy";

/// Name of the rule file looked up inside a history directory
pub const IGNORE_FILE_NAME: &str = "ignore";

/// An immutable set of compiled ignore rules with an exact-match index
///
/// Built once per operation, then shared read-only by a walker for any number
/// of [`FileRecord`] evaluations.
#[derive(Default)]
pub struct FileFilter {
    by_filename: HashMap<String, Vec<MatcherFn>>,
    by_relative: HashMap<String, Vec<MatcherFn>>,
    by_absolute: HashMap<String, Vec<MatcherFn>>,
    unindexed: Vec<MatcherFn>,
}

impl FileFilter {
    /// Create an empty filter that excludes nothing
    pub fn new() -> FileFilter {
        FileFilter::default()
    }

    /// Load the filter governing a history directory
    ///
    /// Reads `<history_root>/ignore` when present, then registers the two
    /// built-in exclusions that keep snapshots from recursing into their own
    /// history: the default history directory name (as a directory filename)
    /// and the absolute history root itself.
    pub fn for_history_dir(history_root: &Path) -> Result<FileFilter> {
        let ignore_file = history_root.join(IGNORE_FILE_NAME);
        let mut filter = if ignore_file.exists() {
            FileFilter::load(&fs::read_to_string(&ignore_file)?)?
        } else {
            FileFilter::new()
        };
        filter.add_excluded_filename(format!(
            "{}{}",
            DEFAULT_HISTORY_DIR_NAME,
            std::path::MAIN_SEPARATOR
        ));
        filter.add_excluded_absolute(format!(
            "{}{}",
            history_root.to_string_lossy(),
            std::path::MAIN_SEPARATOR
        ));
        Ok(filter)
    }

    /// Parse a rule file, one expression per line
    ///
    /// Empty lines and lines starting with `#` or `//` are skipped. Any
    /// syntax error is fatal to the whole load.
    pub fn load(configuration: &str) -> Result<FileFilter> {
        let mut filter = FileFilter::new();
        let mut rules = 0usize;
        for line in configuration.lines() {
            if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                continue;
            }
            filter.add(&FilterExpression::parse(line)?)?;
            rules += 1;
        }
        debug!(rules, "loaded ignore rules");
        Ok(filter)
    }

    /// Compile and register one parsed rule
    pub fn add(&mut self, expression: &FilterExpression) -> Result<()> {
        let matcher = expression.matcher()?;
        match expression.index_key() {
            Some((Subject::Filename, key)) => {
                self.by_filename.entry(key.to_string()).or_default().push(matcher);
            }
            Some((Subject::Relative, key)) => {
                self.by_relative.entry(key.to_string()).or_default().push(matcher);
            }
            Some((Subject::Absolute, key)) => {
                self.by_absolute.entry(key.to_string()).or_default().push(matcher);
            }
            None => self.unindexed.push(matcher),
        }
        Ok(())
    }

    /// Unconditionally exclude entries with this exact filename
    pub fn add_excluded_filename(&mut self, filename: String) {
        self.by_filename
            .entry(filename)
            .or_default()
            .push(Box::new(|_| Ok(true)));
    }

    /// Unconditionally exclude the entry with this exact absolute path
    pub fn add_excluded_absolute(&mut self, path: String) {
        self.by_absolute
            .entry(path)
            .or_default()
            .push(Box::new(|_| Ok(true)));
    }

    /// Whether `file` is excluded by any rule
    pub fn excludes(&self, file: &FileRecord) -> Result<bool> {
        Ok(any_match(self.by_filename.get(&file.filename), file)?
            || any_match(self.by_relative.get(&file.relative), file)?
            || any_match(self.by_absolute.get(&file.absolute), file)?
            || any_match(Some(&self.unindexed), file)?)
    }
}

fn any_match(matchers: Option<&Vec<MatcherFn>>, file: &FileRecord) -> Result<bool> {
    if let Some(matchers) = matchers {
        for matcher in matchers {
            if matcher(file)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}
