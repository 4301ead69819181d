//! Error types for the shadow-copy library
//!
//! This module defines all error types that can occur during shadow copy
//! operations. Errors carry enough context to be actionable: filter syntax
//! errors report the byte offset and the original rule text, copy failures
//! report the exact command line and the captured diagnostic output.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the shadow-copy library
pub type Result<T> = std::result::Result<T, ShadowError>;

/// Main error type for all shadow copy operations
#[derive(Debug, Error)]
pub enum ShadowError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A matcher prefix was expected but not found in a filter rule
    #[error("Missing prefix ({expected}) at {offset} in expression: {expression}")]
    MissingPrefix {
        /// Comma-separated list of accepted prefixes
        expected: String,
        /// Byte offset of the failure in the rule text
        offset: usize,
        /// Original rule text
        expression: String,
    },

    /// An opened bracket pair was never closed in a filter rule
    #[error("Missing delimiter '{delimiter}' at {offset} in: {expression}")]
    MissingDelimiter {
        /// The expected closing character
        delimiter: char,
        /// Byte offset where the closing character was expected
        offset: usize,
        /// Original rule text
        expression: String,
    },

    /// A matcher kind requiring a pattern was given none
    #[error("Empty pattern at {offset} in: {expression}")]
    EmptyPattern {
        /// Byte offset of the missing pattern
        offset: usize,
        /// Original rule text
        expression: String,
    },

    /// `symbolic-link` takes no pattern but one was given
    #[error("Unexpected pattern at {offset} in: {expression}")]
    UnexpectedPattern {
        /// Byte offset of the stray pattern
        offset: usize,
        /// Original rule text
        expression: String,
    },

    /// Input remained after a complete filter expression
    #[error("Unexpected character at {offset} in: {expression}")]
    TrailingInput {
        /// Byte offset of the first unconsumed character
        offset: usize,
        /// Original rule text
        expression: String,
    },

    /// A pattern failed domain validation (bad regex, non-numeric size limit)
    #[error("Invalid pattern at {offset} in: {expression}: {reason}")]
    InvalidPattern {
        /// Byte offset of the pattern
        offset: usize,
        /// Original rule text
        expression: String,
        /// What was wrong with it
        reason: String,
    },

    /// The external copy command exited with a non-zero status
    #[error("Unexpected exit value {status} for command: {command}\n{stderr}")]
    CopyFailed {
        /// Exit status of the copy process
        status: i32,
        /// Quoted command line that was run
        command: String,
        /// Captured standard error output
        stderr: String,
    },

    /// A history index referenced no existing snapshot
    #[error("No previous shadow copy to match with")]
    NoPriorSnapshot,

    /// A snapshot index argument could not be understood
    #[error("Invalid shadow copy index: {0}")]
    InvalidIndex(String),

    /// Recursive deletion of a snapshot directory failed
    #[error("Failed to delete {path:?}: {source}")]
    Delete {
        /// Path that could not be removed
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },
}

impl ShadowError {
    /// Create an invalid-pattern error with a custom reason
    pub fn invalid_pattern(
        offset: usize,
        expression: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ShadowError::InvalidPattern {
            offset,
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error was raised while parsing a filter rule
    pub fn is_filter_syntax(&self) -> bool {
        matches!(
            self,
            ShadowError::MissingPrefix { .. }
                | ShadowError::MissingDelimiter { .. }
                | ShadowError::EmptyPattern { .. }
                | ShadowError::UnexpectedPattern { .. }
                | ShadowError::TrailingInput { .. }
                | ShadowError::InvalidPattern { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ShadowError::MissingDelimiter {
            delimiter: ')',
            offset: 18,
            expression: "(filename:equals:x".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Missing delimiter ')' at 18 in: (filename:equals:x"
        );
    }

    #[test]
    fn test_error_is_filter_syntax() {
        let err = ShadowError::EmptyPattern {
            offset: 16,
            expression: "absolute:reg-ex:".to_string(),
        };
        assert!(err.is_filter_syntax());
        assert!(!ShadowError::NoPriorSnapshot.is_filter_syntax());
    }

    #[test]
    fn test_copy_failed_display() {
        let err = ShadowError::CopyFailed {
            status: 1,
            command: "\"/bin/cp\" \"a\" \"b\"".to_string(),
            stderr: "cp: cannot stat 'a'".to_string(),
        };
        let text = err.to_string();
        assert!(text.starts_with("Unexpected exit value 1 for command: "));
        assert!(text.contains("cannot stat"));
    }
}
