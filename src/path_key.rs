//! Path identity across capture moments
//!
//! Paths reach the library from several places: a directory walk on Windows
//! or POSIX, a manifest written months ago, a header typed by hand into a
//! document. [`PathKey`] reduces all of them to one comparison key so they
//! can be matched without touching the filesystem.
//!
//! The transform is purely textual:
//!
//! 1. backslashes become forward slashes
//! 2. empty and `.` segments are dropped (this strips any leading `./` and
//!    collapses repeated or trailing slashes)
//! 3. the result is lowercased
//!
//! `..` segments are kept verbatim; resolving them needs a root, and that is
//! the rebuilder's job. A leading `/` is kept so absolute and relative paths
//! never compare equal.
//!
//! ```rust
//! use code_assembler::path_key::{display_path, PathKey};
//!
//! assert_eq!(PathKey::new("./Src\\Main.RS"), PathKey::new("src/main.rs"));
//! assert_eq!(display_path("./Src\\Main.RS"), "Src/Main.RS");
//! ```

use std::fmt;

/// Normalized, case-folded key identifying one logical file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathKey(String);

impl PathKey {
    /// Build the comparison key for `path`
    pub fn new(path: &str) -> Self {
        PathKey(display_path(path).to_lowercase())
    }

    /// Original-case display form of `path` (same transform, no lowercasing)
    pub fn display(path: &str) -> String {
        display_path(path)
    }

    /// The key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key is empty (the path had no real segments)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PathKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize separators and segments while preserving the original case
///
/// This is the form written into snapshot headers and manifests.
pub fn display_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let absolute = unified.starts_with('/');
    let joined = unified
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/");

    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}
