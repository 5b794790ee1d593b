//! Rebuilding a directory tree from a snapshot
//!
//! Rebuilding happens in two phases. [`Rebuilder::plan`] resolves every
//! record against the output root without touching the filesystem and
//! decides what would happen; [`Rebuilder::apply`] carries the plan out. A
//! dry run stops after the first phase, so its plan is exactly what a real
//! run would have executed.
//!
//! ## Containment
//!
//! A record path is joined to the root only if it stays inside it:
//!
//! 1. **Lexical check**: absolute forms (`/etc/x`, `\x`, `C:\x`, `\\server\x`)
//!    and any `..` that climbs above the root are rejected. `a/../b` is fine.
//! 2. **Symlink check**: the longest existing prefix of the target is
//!    canonicalized and must still be under the canonicalized root, so a
//!    symlinked directory inside the root cannot redirect writes outside.
//!
//! Rejected records become [`PlanAction::SkipTraversalViolation`] entries;
//! the rest of the snapshot is still rebuilt.
//!
//! ## Examples
//!
//! ```rust
//! use code_assembler::rebuild::Rebuilder;
//! use code_assembler::types::{FileRecord, PlanAction};
//! use code_assembler::{reader, writer::SnapshotWriter};
//!
//! # fn main() -> code_assembler::Result<()> {
//! let document = SnapshotWriter::new().write(&[
//!     FileRecord::new("src/app.py", "print('hi')\n", 1.0),
//!     FileRecord::new("../escape.py", "oops", 1.0),
//! ])?;
//! let snapshot = reader::parse(&document)?;
//!
//! let dir = tempfile::tempdir()?;
//! let outcome = Rebuilder::new(dir.path().join("out")).dry_run(true).rebuild(&snapshot)?;
//! assert_eq!(outcome.plan.count(PlanAction::Create), 1);
//! assert_eq!(outcome.plan.count(PlanAction::SkipTraversalViolation), 1);
//! assert!(!dir.path().join("out").exists());
//! # Ok(())
//! # }
//! ```

use crate::error::{AssemblerError, Result};
use crate::types::{
    ApplyReport, PlanAction, PlanEntry, ProgressCallback, ProgressInfo, RebuildOutcome,
    RebuildPlan, Snapshot,
};
use crate::utils;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Plans and applies the reconstruction of a snapshot under one root
#[derive(Clone)]
pub struct Rebuilder {
    root: PathBuf,
    dry_run: bool,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for Rebuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rebuilder")
            .field("root", &self.root)
            .field("dry_run", &self.dry_run)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Rebuilder {
    /// Rebuilder writing under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dry_run: false,
            progress: None,
        }
    }

    /// Only plan; never touch the filesystem
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Report progress while applying
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Whether this rebuilder only plans
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Resolve every record against the root
    ///
    /// Reads filesystem metadata but never modifies anything.
    ///
    /// # Errors
    ///
    /// - [`AssemblerError::Io`] if the working directory is needed and unavailable
    /// - [`AssemblerError::InvalidConfiguration`] if the root cannot be resolved
    pub fn plan(&self, snapshot: &Snapshot) -> Result<RebuildPlan> {
        let root = if self.root.is_absolute() {
            self.root.clone()
        } else {
            std::env::current_dir()?.join(&self.root)
        };
        let canonical_root = canonicalize_existing(&root).ok_or_else(|| {
            AssemblerError::config(format!("output directory {:?} cannot be resolved", root))
        })?;
        debug!("Planning rebuild of {} records under {:?}", snapshot.len(), canonical_root);

        let mut entries = Vec::with_capacity(snapshot.len());
        for record in &snapshot.records {
            let resolved = resolve_lexical(&record.path)
                .map(|relative| root.join(relative))
                .filter(|target| stays_inside(target, &canonical_root));

            let (target, action) = match resolved {
                Some(target) => {
                    let action = if fs::symlink_metadata(&target).is_ok() {
                        PlanAction::Overwrite
                    } else {
                        PlanAction::Create
                    };
                    (target, action)
                }
                None => {
                    warn!("Refusing to write outside the output directory: {}", record.path);
                    (PathBuf::from(&record.path), PlanAction::SkipTraversalViolation)
                }
            };

            trace!("{} -> {:?} ({})", record.path, target, action);
            entries.push(PlanEntry {
                path: record.path.clone(),
                target,
                content: record.content.clone(),
                action,
                truncated: record.truncated,
                omitted_lines: record.omitted_lines,
            });
        }

        Ok(RebuildPlan { root, entries })
    }

    /// Execute a plan
    ///
    /// Failures on individual files are collected in
    /// [`ApplyReport::failures`]; the remaining entries are still written.
    /// On a dry-run rebuilder nothing is written and the report only counts
    /// skipped entries.
    pub fn apply(&self, plan: &RebuildPlan) -> Result<ApplyReport> {
        let start = Instant::now();
        let mut report = ApplyReport::default();
        let total = plan.entries.len();

        for (processed, entry) in plan.entries.iter().enumerate() {
            if let Some(progress) = &self.progress {
                progress(ProgressInfo {
                    operation: "Restoring files".to_string(),
                    current_item: Some(entry.path.clone()),
                    processed,
                    total: Some(total),
                });
            }

            if !entry.is_write() {
                report.files_skipped += 1;
                continue;
            }
            if self.dry_run {
                continue;
            }

            match write_entry(entry) {
                Ok(bytes) => {
                    report.files_written += 1;
                    report.bytes_written += bytes;
                }
                Err(err) => {
                    warn!("Failed to write {}: {}", entry.path, err);
                    report.failures.push((entry.path.clone(), err.to_string()));
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Rebuild applied: {} written, {} skipped, {} failed in {}ms",
            report.files_written,
            report.files_skipped,
            report.failures.len(),
            report.duration_ms
        );
        Ok(report)
    }

    /// Plan, then apply unless this is a dry run
    pub fn rebuild(&self, snapshot: &Snapshot) -> Result<RebuildOutcome> {
        let plan = self.plan(snapshot)?;
        let report = if self.dry_run {
            None
        } else {
            Some(self.apply(&plan)?)
        };
        Ok(RebuildOutcome { plan, report })
    }
}

/// Rebuild `snapshot` under `root`
pub fn rebuild(snapshot: &Snapshot, root: &Path, dry_run: bool) -> Result<RebuildOutcome> {
    Rebuilder::new(root).dry_run(dry_run).rebuild(snapshot)
}

fn write_entry(entry: &PlanEntry) -> Result<u64> {
    if let Some(parent) = entry.target.parent() {
        fs::create_dir_all(parent)?;
    }
    utils::atomic_write(&entry.target, entry.content.as_bytes())?;
    Ok(entry.content.len() as u64)
}

/// Clean a record path into a relative path that stays under its base
///
/// Returns `None` for absolute forms, for `..` that climbs above the base,
/// and for paths with no segments left.
pub fn resolve_lexical(path: &str) -> Option<PathBuf> {
    let unified = path.replace('\\', "/");
    if unified.starts_with('/') {
        return None;
    }

    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            name => {
                if parts.is_empty() && is_drive_prefix(name) {
                    return None;
                }
                parts.push(name);
            }
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.iter().collect())
    }
}

fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn stays_inside(target: &Path, canonical_root: &Path) -> bool {
    match canonicalize_existing(target) {
        Some(resolved) => resolved != canonical_root && resolved.starts_with(canonical_root),
        None => false,
    }
}

/// Canonicalize the longest existing prefix of `path` and append the rest
///
/// Returns `None` when an existing component cannot be resolved, such as a
/// dangling symlink.
fn canonicalize_existing(path: &Path) -> Option<PathBuf> {
    let mut existing = path;
    let mut rest = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = canonical;
            for name in rest.iter().rev() {
                resolved.push(name);
            }
            return Some(resolved);
        }
        if fs::symlink_metadata(existing).is_ok() {
            return None;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return None,
        }
    }
}
