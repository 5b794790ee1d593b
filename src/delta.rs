//! Delta engine
//!
//! Decides which files must be sent again by comparing the manifest of an
//! earlier snapshot with the current listing. Identity is the normalized
//! [`PathKey`]; change detection is by modification time only.
//!
//! ## Time resolution
//!
//! | Manifest origin | Compared at |
//! |-----------------|-------------|
//! | `Embedded`      | whole milliseconds |
//! | `Legacy`        | whole minutes, local time |
//! | `Reconstructed` | never equal (every shared path is modified) |
//!
//! ## Examples
//!
//! ```rust
//! use code_assembler::delta::compute_delta;
//! use code_assembler::types::{FileRecord, Manifest, ManifestEntry};
//!
//! # fn main() -> code_assembler::Result<()> {
//! let mut old = Manifest::new();
//! old.files.push(ManifestEntry::for_record(&FileRecord::new("a.py", "", 100.0)));
//! old.files.push(ManifestEntry::for_record(&FileRecord::new("b.py", "", 100.0)));
//!
//! let current = vec![
//!     FileRecord::new("A.py", "", 100.0),
//!     FileRecord::new("c.py", "", 100.0),
//! ];
//! let delta = compute_delta(&old, &current)?;
//! assert_eq!(delta.added, vec!["c.py"]);
//! assert_eq!(delta.deleted, vec!["b.py"]);
//! assert_eq!(delta.unchanged, 1);
//! # Ok(())
//! # }
//! ```

use crate::error::{AssemblerError, Result};
use crate::path_key::PathKey;
use crate::types::{DeltaResult, ListedFile, Manifest, ManifestEntry, ManifestOrigin};
use chrono::{Local, TimeZone, Timelike};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

const SUMMARY_NAME_LIMIT: usize = 5;

/// Compare an earlier manifest with the current listing
///
/// # Arguments
///
/// * `old` - Manifest of the previous snapshot
/// * `current` - Files as they exist now, in listing order
///
/// # Returns
///
/// `added` and `modified` in listing order, `deleted` in manifest order.
/// Tombstones in `old` are ignored.
///
/// # Errors
///
/// - [`AssemblerError::DuplicateKey`] if two current entries share a key
pub fn compute_delta<F: ListedFile>(old: &Manifest, current: &[F]) -> Result<DeltaResult> {
    let mut seen: HashMap<PathKey, &str> = HashMap::with_capacity(current.len());
    for file in current {
        let key = PathKey::new(file.display_path());
        if let Some(first) = seen.insert(key.clone(), file.display_path()) {
            return Err(AssemblerError::DuplicateKey {
                key: key.to_string(),
                first: first.to_string(),
                second: file.display_path().to_string(),
            });
        }
    }

    let mut previous: HashMap<PathKey, &ManifestEntry> = HashMap::new();
    for entry in old.live_entries() {
        previous.entry(entry.key()).or_insert(entry);
    }

    let mut delta = DeltaResult::default();
    for file in current {
        let key = PathKey::new(file.display_path());
        match previous.get(&key) {
            None => delta.added.push(file.display_path().to_string()),
            Some(entry) if has_changed(old.origin, entry.mtime, file.mtime()) => {
                trace!(
                    "{} changed: {} -> {}",
                    file.display_path(),
                    entry.mtime,
                    file.mtime()
                );
                delta.modified.push(file.display_path().to_string());
            }
            Some(_) => delta.unchanged += 1,
        }
    }

    let mut reported = HashSet::new();
    for entry in old.live_entries() {
        let key = entry.key();
        if !seen.contains_key(&key) && reported.insert(key) {
            delta.deleted.push(entry.path.clone());
        }
    }

    debug!(
        "Delta against {:?} manifest: {} added, {} modified, {} deleted, {} unchanged",
        old.origin,
        delta.added.len(),
        delta.modified.len(),
        delta.deleted.len(),
        delta.unchanged
    );
    Ok(delta)
}

fn has_changed(origin: ManifestOrigin, old: f64, current: f64) -> bool {
    match origin {
        ManifestOrigin::Embedded => to_millis(old) != to_millis(current),
        ManifestOrigin::Legacy => local_minute(old) != local_minute(current),
        ManifestOrigin::Reconstructed => true,
    }
}

fn to_millis(epoch: f64) -> i64 {
    (epoch * 1000.0).round() as i64
}

/// Start of the local-time minute containing `epoch`
fn local_minute(epoch: f64) -> Option<i64> {
    let local = Local.timestamp_opt(epoch.floor() as i64, 0).earliest()?;
    Some(local.with_second(0)?.timestamp())
}

impl DeltaResult {
    /// Human-readable change summary, one line per non-empty category
    ///
    /// Lists at most five paths per category, sorted.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        summarize(&mut lines, "Modified", &self.modified);
        summarize(&mut lines, "Added", &self.added);
        summarize(&mut lines, "Deleted", &self.deleted);

        if lines.is_empty() {
            "No changes detected since last snapshot".to_string()
        } else {
            lines.join("\n")
        }
    }
}

fn summarize(lines: &mut Vec<String>, label: &str, paths: &[String]) {
    if paths.is_empty() {
        return;
    }
    let mut names: Vec<&str> = paths.iter().map(String::as_str).collect();
    names.sort_unstable();

    let mut shown = names
        .iter()
        .take(SUMMARY_NAME_LIMIT)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    if names.len() > SUMMARY_NAME_LIMIT {
        shown.push_str(&format!(", ... (+{})", names.len() - SUMMARY_NAME_LIMIT));
    }
    lines.push(format!("{} ({}): {}", label, paths.len(), shown));
}
