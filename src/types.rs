//! Core data types used throughout the code-assembler library
//!
//! This module contains the data structures shared between the writer,
//! reader, delta engine and rebuilder.
//!
//! ## Overview
//!
//! - **Snapshot content**: [`FileRecord`], [`Manifest`], [`ManifestEntry`],
//!   [`Snapshot`] - one assembled document and its trailer index
//! - **Listings**: [`ListedFile`], [`ListingEntry`] - what the delta engine
//!   compares a manifest against
//! - **Results**: [`DeltaResult`], [`RebuildPlan`], [`ApplyReport`],
//!   [`LoadReport`], [`AssemblyStats`]
//!
//! ## Examples
//!
//! ```rust
//! use code_assembler::types::FileRecord;
//!
//! let record = FileRecord::new("src/main.rs", "fn main() {}\n", 1_700_000_000.0);
//! assert_eq!(record.language, "rust");
//! assert!(!record.truncated);
//! ```

use crate::error::AssemblerError;
use crate::language;
use crate::path_key::{display_path, PathKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// One file's captured content inside a snapshot
///
/// `path` is the display path: relative, forward slashes, original case.
/// Identity comparisons go through [`FileRecord::key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Relative display path
    pub path: String,
    /// Captured text (only the retained prefix when truncated)
    pub content: String,
    /// Modification time in seconds since the Unix epoch
    pub mtime: f64,
    /// Whether `content` is only a prefix of the real file
    pub truncated: bool,
    /// Number of lines dropped by truncation
    pub omitted_lines: usize,
    /// Syntax tag written on the opening fence
    pub language: String,
}

impl FileRecord {
    /// Create an untruncated record, detecting the language from the path
    pub fn new(path: impl AsRef<str>, content: impl Into<String>, mtime: f64) -> Self {
        let path = display_path(path.as_ref());
        let language = language::detect(&path).to_string();
        Self {
            path,
            content: content.into(),
            mtime,
            truncated: false,
            omitted_lines: 0,
            language,
        }
    }

    /// Mark this record as a truncated prefix with `omitted_lines` missing
    pub fn with_truncation(mut self, omitted_lines: usize) -> Self {
        self.truncated = true;
        self.omitted_lines = omitted_lines;
        self
    }

    /// Override the fence language tag
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Comparison key for this record
    pub fn key(&self) -> PathKey {
        PathKey::new(&self.path)
    }

    /// Number of lines in the captured content
    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }
}

/// How a [`Manifest`] came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifestOrigin {
    /// Parsed from a current `CODE_ASSEMBLER_MANIFEST` trailer
    #[default]
    Embedded,
    /// Parsed from an older `CODE_ASSEMBLER_METADATA` trailer with
    /// minute-resolution local timestamps
    Legacy,
    /// No trailer was present; rebuilt from the document body
    Reconstructed,
}

/// One manifest line: identity and flags for a single path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Display path of the file
    pub path: String,
    /// Modification time in seconds since the Unix epoch
    #[serde(default)]
    pub mtime: f64,
    /// Whether the body holds only a prefix of the file
    #[serde(default)]
    pub truncated: bool,
    /// Tombstone: the file was deleted and has no body section
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ManifestEntry {
    /// Manifest entry describing a record
    pub fn for_record(record: &FileRecord) -> Self {
        Self {
            path: record.path.clone(),
            mtime: record.mtime,
            truncated: record.truncated,
            deleted: false,
        }
    }

    /// Tombstone entry for a deleted path
    pub fn tombstone(path: impl AsRef<str>) -> Self {
        Self {
            path: display_path(path.as_ref()),
            mtime: 0.0,
            truncated: false,
            deleted: true,
        }
    }

    /// Comparison key for this entry
    pub fn key(&self) -> PathKey {
        PathKey::new(&self.path)
    }
}

/// Authoritative index of a snapshot, embedded as the document trailer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Version of the tool that wrote the manifest
    #[serde(default)]
    pub version: String,
    /// When the snapshot was generated
    pub generated_at: DateTime<Utc>,
    /// Entries in body order, tombstones last
    #[serde(default)]
    pub files: Vec<ManifestEntry>,
    /// Where this manifest came from (not serialized)
    #[serde(skip)]
    pub origin: ManifestOrigin,
}

impl Manifest {
    /// Empty manifest stamped with the current time and crate version
    pub fn new() -> Self {
        Self {
            version: crate::VERSION.to_string(),
            generated_at: Utc::now(),
            files: Vec::new(),
            origin: ManifestOrigin::Embedded,
        }
    }

    /// Entries that have a body section
    pub fn live_entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.files.iter().filter(|e| !e.deleted)
    }

    /// Tombstone entries
    pub fn tombstones(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.files.iter().filter(|e| e.deleted)
    }

    /// Find the entry for `path` by normalized key
    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        let key = PathKey::new(path);
        self.files.iter().find(|e| e.key() == key)
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

/// A parsed or freshly assembled document
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// File records in body order
    pub records: Vec<FileRecord>,
    /// Trailer index (reconstructed when the document had none)
    pub manifest: Manifest,
    /// Paths listed as deleted: tombstones and entries missing a body
    pub deleted: Vec<String>,
    /// Non-fatal observations made while parsing
    pub warnings: Vec<String>,
}

impl Snapshot {
    /// Look up a record by path (normalized comparison)
    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        let key = PathKey::new(path);
        self.records.iter().find(|r| r.key() == key)
    }

    /// Number of file records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records that only carry a prefix of their file
    pub fn truncated_records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.iter().filter(|r| r.truncated)
    }
}

/// Anything the delta engine can compare against a manifest
pub trait ListedFile {
    /// Display path relative to the assembly root
    fn display_path(&self) -> &str;
    /// Modification time in seconds since the Unix epoch
    fn mtime(&self) -> f64;
}

impl ListedFile for FileRecord {
    fn display_path(&self) -> &str {
        &self.path
    }

    fn mtime(&self) -> f64 {
        self.mtime
    }
}

/// One file found by the traversal collaborator, content not yet read
#[derive(Debug, Clone, PartialEq)]
pub struct ListingEntry {
    /// Display path relative to the assembly base
    pub path: String,
    /// Location on disk
    pub absolute_path: PathBuf,
    /// Modification time in seconds since the Unix epoch
    pub mtime: f64,
    /// Size in bytes
    pub size: u64,
}

impl ListedFile for ListingEntry {
    fn display_path(&self) -> &str {
        &self.path
    }

    fn mtime(&self) -> f64 {
        self.mtime
    }
}

/// Outcome of comparing an old manifest with the current listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaResult {
    /// Present now, absent from the old manifest
    pub added: Vec<String>,
    /// Present in both with a different modification time
    pub modified: Vec<String>,
    /// Present in the old manifest, absent now
    pub deleted: Vec<String>,
    /// Paths present in both and left out of the result
    pub unchanged: usize,
}

impl DeltaResult {
    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.modified.is_empty() || !self.deleted.is_empty()
    }

    /// Get total number of changed paths
    pub fn total_operations(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    /// Paths the next writer pass must serialize (added then modified)
    pub fn changed_paths(&self) -> impl Iterator<Item = &String> {
        self.added.iter().chain(self.modified.iter())
    }
}

/// What the rebuilder intends to do with one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanAction {
    /// Target does not exist yet
    Create,
    /// Target exists and will be replaced
    Overwrite,
    /// Path resolves outside the root; nothing is written
    SkipTraversalViolation,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanAction::Create => write!(f, "create"),
            PlanAction::Overwrite => write!(f, "overwrite"),
            PlanAction::SkipTraversalViolation => write!(f, "skip-traversal-violation"),
        }
    }
}

/// One step of a rebuild
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    /// Record path as written in the snapshot
    pub path: String,
    /// Resolved destination (the unjoined record path on violations)
    pub target: PathBuf,
    /// Content to write
    pub content: String,
    /// Planned action
    pub action: PlanAction,
    /// Content is only a prefix of the original file
    pub truncated: bool,
    /// Lines missing from a truncated record
    pub omitted_lines: usize,
}

impl PlanEntry {
    /// Whether this entry writes to disk when applied
    pub fn is_write(&self) -> bool {
        self.action != PlanAction::SkipTraversalViolation
    }

    /// Warning the caller must surface for this entry, if any
    pub fn warning(&self) -> Option<String> {
        match self.action {
            PlanAction::SkipTraversalViolation => Some(
                AssemblerError::PathTraversal {
                    path: self.path.clone(),
                }
                .to_string(),
            ),
            _ if self.truncated => Some(format!(
                "{} is restored partially: {} line(s) were truncated in the snapshot",
                self.path, self.omitted_lines
            )),
            _ => None,
        }
    }
}

/// Ordered list of rebuild steps; never persisted
#[derive(Debug, Clone, PartialEq)]
pub struct RebuildPlan {
    /// Resolved output root
    pub root: PathBuf,
    /// Steps in snapshot order
    pub entries: Vec<PlanEntry>,
}

impl RebuildPlan {
    /// All warnings in plan order
    pub fn warnings(&self) -> Vec<String> {
        self.entries.iter().filter_map(PlanEntry::warning).collect()
    }

    /// Entries rejected for escaping the root
    pub fn violations(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries
            .iter()
            .filter(|e| e.action == PlanAction::SkipTraversalViolation)
    }

    /// Entries that write partial content
    pub fn partial(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.is_write() && e.truncated)
    }

    /// Number of entries with the given action
    pub fn count(&self, action: PlanAction) -> usize {
        self.entries.iter().filter(|e| e.action == action).count()
    }
}

/// Result of applying a [`RebuildPlan`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Files written successfully
    pub files_written: usize,
    /// Total bytes written
    pub bytes_written: u64,
    /// Entries skipped because they escape the root
    pub files_skipped: usize,
    /// Per-file write failures as (path, reason)
    pub failures: Vec<(String, String)>,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

/// Plan plus, for real runs, what applying it did
#[derive(Debug, Clone)]
pub struct RebuildOutcome {
    /// The plan (identical for dry and real runs)
    pub plan: RebuildPlan,
    /// `None` for dry runs
    pub report: Option<ApplyReport>,
}

/// Why the traversal collaborator left a file out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// NUL bytes in the leading sample
    Binary,
    /// Not valid UTF-8
    InvalidEncoding,
    /// Over the size limit with truncation disabled
    TooLarge {
        /// Actual size in bytes
        size: u64,
        /// Configured limit in bytes
        limit: u64,
    },
    /// Over the line limit with truncation disabled
    TooLong {
        /// Actual line count
        lines: usize,
        /// Configured limit
        limit: usize,
    },
    /// Could not be read at all
    Unreadable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Binary => write!(f, "binary file, skipped"),
            SkipReason::InvalidEncoding => write!(f, "not valid UTF-8, skipped"),
            SkipReason::TooLarge { size, limit } => write!(
                f,
                "too large ({} > {}), skipped",
                crate::utils::format_bytes(*size),
                crate::utils::format_bytes(*limit)
            ),
            SkipReason::TooLong { lines, limit } => {
                write!(f, "too long ({} lines > {}), skipped", lines, limit)
            }
            SkipReason::Unreadable(reason) => write!(f, "unreadable: {}", reason),
        }
    }
}

/// A file the traversal found but could not include
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    /// Display path
    pub path: String,
    /// Reason it was left out
    pub reason: SkipReason,
}

/// Records loaded from a listing plus the files that were skipped
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Loaded records in listing order
    pub records: Vec<FileRecord>,
    /// Files left out, in listing order
    pub skipped: Vec<SkippedFile>,
}

/// Figures about one assembled document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblyStats {
    /// Files serialized into the body
    pub total_files: usize,
    /// Lines across all serialized files
    pub total_lines: usize,
    /// Bytes of captured content
    pub source_bytes: u64,
    /// Characters in the final document
    pub document_chars: usize,
    /// Rough token estimate for the final document
    pub estimated_tokens: usize,
    /// File count per extension (`""` for none)
    pub files_by_extension: BTreeMap<String, usize>,
    /// Largest serialized file as (path, bytes)
    pub largest_file: Option<(String, u64)>,
    /// Records that were truncated
    pub truncated_files: usize,
    /// Files the traversal had to leave out
    pub skipped_files: usize,
}

impl AssemblyStats {
    /// Accumulate one serialized record
    pub fn add_record(&mut self, record: &FileRecord) {
        let bytes = record.content.len() as u64;
        self.total_files += 1;
        self.total_lines += record.line_count();
        self.source_bytes += bytes;
        if record.truncated {
            self.truncated_files += 1;
        }

        let extension = record
            .path
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext))
            .filter(|ext| !ext.is_empty())
            .map(|ext| format!(".{}", ext.to_lowercase()))
            .unwrap_or_default();
        *self.files_by_extension.entry(extension).or_insert(0) += 1;

        let is_larger = match &self.largest_file {
            Some((_, size)) => bytes > *size,
            None => true,
        };
        if is_larger {
            self.largest_file = Some((record.path.clone(), bytes));
        }
    }
}

/// Progress callback for long-running operations
pub type ProgressCallback = Arc<dyn Fn(ProgressInfo) + Send + Sync>;

/// Information passed to progress callbacks
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Operation being performed
    pub operation: String,
    /// Current item being processed
    pub current_item: Option<String>,
    /// Items processed so far
    pub processed: usize,
    /// Total items to process (if known)
    pub total: Option<usize>,
}

impl ProgressInfo {
    /// Get progress as a percentage (0-100)
    pub fn percentage(&self) -> Option<f32> {
        match self.total {
            Some(total) if total > 0 => Some((self.processed as f32 / total as f32) * 100.0),
            _ => None,
        }
    }
}
