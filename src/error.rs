//! Error types for the code-assembler library
//!
//! This module defines all error types that can occur while assembling,
//! parsing or rebuilding snapshots. Document-level corruption aborts an
//! operation with a single error; per-file problems (traversal violations,
//! undecodable files, truncation) are collected into reports instead and
//! only surface here when a caller asks for them one at a time.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the code-assembler library
pub type Result<T> = std::result::Result<T, AssemblerError>;

/// Main error type for all code-assembler operations
#[derive(Debug, Error)]
pub enum AssemblerError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Directory walk errors from the ignore crate
    #[error("Walk error: {0}")]
    Walk(#[from] ignore::Error),

    /// Structural parse failure: unclosed fence or unreadable manifest block
    #[error("Malformed snapshot (line {line}): {reason}")]
    MalformedSnapshot {
        /// 1-based line where the problem was detected
        line: usize,
        /// What was wrong
        reason: String,
    },

    /// Two distinct files normalize to the same comparison key
    #[error("Duplicate path key '{key}': '{first}' and '{second}'")]
    DuplicateKey {
        /// The shared normalized key
        key: String,
        /// Path that claimed the key first
        first: String,
        /// Path that collided with it
        second: String,
    },

    /// A record's path would resolve outside the rebuild root
    #[error("Path escapes the output directory: {path}")]
    PathTraversal {
        /// The offending record path, as written in the snapshot
        path: String,
    },

    /// A path cannot be represented in a snapshot
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The offending path
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// File content could not be decoded as text
    #[error("Cannot decode {path:?}: {reason}")]
    Encoding {
        /// File that failed to decode
        path: PathBuf,
        /// Short reason ("binary file", "invalid UTF-8")
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Exclusion or inclusion pattern could not be compiled
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<globset::Error> for AssemblerError {
    fn from(err: globset::Error) -> Self {
        AssemblerError::InvalidPattern(err.to_string())
    }
}

impl AssemblerError {
    /// Create a malformed-snapshot error at the given 1-based line
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        AssemblerError::MalformedSnapshot {
            line,
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error with a custom message
    pub fn config(msg: impl Into<String>) -> Self {
        AssemblerError::InvalidConfiguration(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        AssemblerError::Internal(msg.into())
    }

    /// Check if this error only concerns a single file
    ///
    /// Per-file errors are recorded and skipped during multi-file operations;
    /// everything else aborts the operation.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            AssemblerError::PathTraversal { .. } | AssemblerError::Encoding { .. }
        )
    }

    /// Check if this error indicates a structurally broken document
    pub fn is_corruption(&self) -> bool {
        matches!(self, AssemblerError::MalformedSnapshot { .. })
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            AssemblerError::DuplicateKey { first, second, .. } => {
                format!(
                    "'{}' and '{}' differ only by case or separator and would collide \
                     in the snapshot. Rename one of them or exclude it.",
                    first, second
                )
            }
            AssemblerError::MalformedSnapshot { line, reason } => {
                format!(
                    "The snapshot is damaged near line {}: {}. \
                     Check that every code fence is closed.",
                    line, reason
                )
            }
            AssemblerError::InvalidConfiguration(msg) => {
                format!("{}. Run with --help to see the available options.", msg)
            }
            _ => self.to_string(),
        }
    }
}
