//! Utility functions for code-assembler
//!
//! This module provides common helpers used throughout the library.
//!
//! ## Categories of Utilities
//!
//! ### File Operations
//! - Atomic file writing through a sibling temporary file
//! - Binary content sniffing
//!
//! ### Path Manipulation
//! - Converting absolute paths to relative display paths
//! - Common ancestor of several roots
//!
//! ### Formatting
//! - Byte and count formatting for headers and CLI output
//! - Token estimation
//! - Modification-time conversion
//!
//! ## Example Usage
//!
//! ```rust
//! use code_assembler::utils::{estimate_tokens, format_bytes, format_number};
//!
//! assert_eq!(format_bytes(1536), "1.50 KB");
//! assert_eq!(format_number(1234567), "1,234,567");
//! assert_eq!(estimate_tokens(400), 100);
//! ```

use crate::error::{AssemblerError, Result};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::trace;

/// Bytes inspected when sniffing for binary content
pub const BINARY_SNIFF_LEN: usize = 8192;

/// Characters per token used by [`estimate_tokens`]
const CHARS_PER_TOKEN: usize = 4;

/// Check whether content looks binary
///
/// A NUL byte anywhere in the first 8 KiB is treated as binary, the same
/// heuristic git uses.
pub fn is_binary_content(content: &[u8]) -> bool {
    let sample = &content[..content.len().min(BINARY_SNIFF_LEN)];
    sample.contains(&0)
}

/// Convert a `SystemTime` into fractional seconds since the Unix epoch
///
/// Times before the epoch come out negative.
pub fn system_time_to_epoch(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs_f64(),
        Err(err) => -err.duration().as_secs_f64(),
    }
}

/// Rough token count for a document of `chars` characters
pub fn estimate_tokens(chars: usize) -> usize {
    chars / CHARS_PER_TOKEN
}

/// Make a path relative to a base path
///
/// Tries a lexical strip first so symbolic links keep their own path, then
/// falls back to comparing canonical forms.
///
/// # Errors
///
/// - [`AssemblerError::Internal`] if the path is not under the base path
/// - [`AssemblerError::Io`] if canonicalization fails (fallback case only)
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let path_canon = path.canonicalize()?;
    let base_canon = base.canonicalize()?;

    path_canon
        .strip_prefix(&base_canon)
        .map(|p| p.to_path_buf())
        .map_err(|_| {
            AssemblerError::internal(format!(
                "Path {:?} is not relative to {:?}",
                path_canon, base_canon
            ))
        })
}

/// Render a relative filesystem path with forward slashes
pub fn to_display_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Deepest directory containing every path in `paths`
///
/// Returns `None` for an empty slice or when the paths share no prefix
/// (different drives on Windows).
pub fn common_ancestor(paths: &[PathBuf]) -> Option<PathBuf> {
    let (first, rest) = paths.split_first()?;
    let mut ancestor: Vec<Component<'_>> = first.components().collect();

    for path in rest {
        let shared = ancestor
            .iter()
            .zip(path.components())
            .take_while(|(a, b)| **a == *b)
            .count();
        ancestor.truncate(shared);
    }

    if ancestor.is_empty() {
        None
    } else {
        Some(ancestor.iter().collect())
    }
}

/// Format bytes in human-readable form
///
/// Uses binary units (1024-based). Values below 1 KB are whole numbers,
/// larger ones carry two decimals.
///
/// ```rust
/// use code_assembler::utils::format_bytes;
///
/// assert_eq!(format_bytes(0), "0 B");
/// assert_eq!(format_bytes(1_048_576), "1.00 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Format a count with thousands separators
pub fn format_number(value: usize) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Atomic file write (write to temp file then rename)
///
/// The temporary file is created next to `path` so the final rename never
/// crosses a filesystem. Either the complete new content is visible at
/// `path` or the previous state is left untouched.
///
/// # Errors
///
/// - [`AssemblerError::Io`] if the temporary file cannot be written
/// - [`AssemblerError::Io`] if the rename fails
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| AssemblerError::Io(err.error))?;

    trace!("Atomically wrote {} bytes to {:?}", content.len(), path);
    Ok(())
}
