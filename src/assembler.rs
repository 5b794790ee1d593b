//! Assembly entry points
//!
//! Two ways to produce a snapshot document:
//!
//! - [`assemble`] works on records already in memory, optionally diffing
//!   them against the manifest of an earlier snapshot.
//! - [`Assembler`] drives the whole pipeline from an [`AssemblerConfig`]:
//!   scan the roots, diff against the `since` document when one is set,
//!   load only the files that need sending and write the document.
//!
//! ## Delta documents
//!
//! When a previous manifest is available the document carries only added
//! and modified files. Deleted files appear as manifest tombstones and the
//! header summarizes the change set. Unchanged files are left out entirely,
//! so a later delta should be taken against the last full snapshot.
//!
//! ## Example
//!
//! ```rust,no_run
//! use code_assembler::AssemblerBuilder;
//!
//! # fn main() -> code_assembler::Result<()> {
//! let assembler = AssemblerBuilder::new()
//!     .path("./my_project")
//!     .extensions(vec!["py".to_string(), "toml".to_string()])
//!     .since(Some("codebase.md".into()))
//!     .output_file("codebase-delta.md")
//!     .build()?;
//!
//! let output = assembler.run()?;
//! assembler.write_output(&output)?;
//! println!("{} files, ~{} tokens", output.stats.total_files, output.stats.estimated_tokens);
//! # Ok(())
//! # }
//! ```

use crate::config::AssemblerConfig;
use crate::delta::compute_delta;
use crate::error::{AssemblerError, Result};
use crate::file_tracking::FileTracker;
use crate::path_key::PathKey;
use crate::reader;
use crate::types::{
    AssemblyStats, DeltaResult, FileRecord, ListingEntry, Manifest, ProgressCallback, SkippedFile,
};
use crate::utils;
use crate::writer::SnapshotWriter;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Serialize `records` into a snapshot document
///
/// With a `previous_manifest` only records added or modified since that
/// manifest are written, deleted paths become tombstones and the header
/// carries the change summary.
///
/// # Errors
///
/// - [`AssemblerError::DuplicateKey`] if two records normalize to the same key
/// - [`AssemblerError::InvalidPath`] if a record path cannot be written
pub fn assemble(records: &[FileRecord], previous_manifest: Option<&Manifest>) -> Result<String> {
    let Some(previous) = previous_manifest else {
        return SnapshotWriter::new().write(records);
    };

    let delta = compute_delta(previous, records)?;
    let changed: HashSet<PathKey> = delta.changed_paths().map(|p| PathKey::new(p)).collect();
    let selected: Vec<FileRecord> = records
        .iter()
        .filter(|r| changed.contains(&r.key()))
        .cloned()
        .collect();

    SnapshotWriter::new()
        .with_delta(&delta)
        .write_with_tombstones(&selected, &delta.deleted)
}

/// Everything one assembly run produced
#[derive(Debug, Clone)]
pub struct AssemblyOutput {
    /// The snapshot document
    pub document: String,
    /// Figures about the document
    pub stats: AssemblyStats,
    /// Change set, when a previous snapshot was used
    pub delta: Option<DeltaResult>,
    /// Files found but left out
    pub skipped: Vec<SkippedFile>,
    /// Wall time of the run
    pub duration: Duration,
}

/// Filesystem-driven assembly pipeline
#[derive(Debug, Clone)]
pub struct Assembler {
    config: AssemblerConfig,
    tracker: FileTracker,
}

impl Assembler {
    /// Create an assembler for a validated configuration
    ///
    /// # Errors
    ///
    /// - [`AssemblerError::InvalidConfiguration`] if `config` does not validate
    pub fn new(config: AssemblerConfig) -> Result<Self> {
        config.validate()?;
        let tracker = FileTracker::from_config(&config);
        Ok(Self { config, tracker })
    }

    /// Report scan and load progress
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.tracker = self.tracker.with_progress(callback);
        self
    }

    /// The configuration this assembler runs with
    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Run the pipeline and return the document without writing it
    ///
    /// A `since` document that is missing or unreadable falls back to a full
    /// assembly with a warning. A `since` document that is structurally
    /// broken is an error.
    #[instrument(skip(self), fields(paths = ?self.config.paths))]
    pub fn run(&self) -> Result<AssemblyOutput> {
        let start = Instant::now();
        info!("Assembling {} root(s)", self.config.paths.len());

        let own_files = self.own_files();
        let listing: Vec<ListingEntry> = self
            .tracker
            .scan()?
            .into_iter()
            .filter(|entry| !own_files.contains(&entry.absolute_path))
            .collect();

        let previous = match &self.config.since {
            Some(path) => load_previous(path)?,
            None => None,
        };

        let (selected, delta) = match previous {
            Some(manifest) => {
                let delta = compute_delta(&manifest, &listing)?;
                let changed: HashSet<&str> = delta.changed_paths().map(String::as_str).collect();
                let selected: Vec<ListingEntry> = listing
                    .iter()
                    .filter(|entry| changed.contains(entry.path.as_str()))
                    .cloned()
                    .collect();
                info!(
                    "Delta: {} added, {} modified, {} deleted, {} unchanged",
                    delta.added.len(),
                    delta.modified.len(),
                    delta.deleted.len(),
                    delta.unchanged
                );
                (selected, Some(delta))
            }
            None => (listing, None),
        };

        let loaded = self.tracker.load(&selected)?;

        let mut writer = SnapshotWriter::new()
            .with_header(self.config.show_header)
            .with_toc(self.config.show_toc)
            .with_skipped(loaded.skipped.clone());
        if let Some(delta) = &delta {
            writer = writer.with_delta(delta);
        }
        let deleted = delta.as_ref().map(|d| d.deleted.clone()).unwrap_or_default();
        let document = writer.write_with_tombstones(&loaded.records, &deleted)?;

        let mut stats = AssemblyStats::default();
        for record in &loaded.records {
            stats.add_record(record);
        }
        stats.document_chars = document.chars().count();
        stats.estimated_tokens = utils::estimate_tokens(stats.document_chars);
        stats.skipped_files = loaded.skipped.len();

        let duration = start.elapsed();
        info!(
            "Assembled {} files (~{} tokens) in {:?}",
            stats.total_files, stats.estimated_tokens, duration
        );

        Ok(AssemblyOutput {
            document,
            stats,
            delta,
            skipped: loaded.skipped,
            duration,
        })
    }

    /// Write the document to the configured output file
    ///
    /// Returns the path written.
    pub fn write_output(&self, output: &AssemblyOutput) -> Result<PathBuf> {
        let path = self.config.output_file.clone();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        utils::atomic_write(&path, output.document.as_bytes())?;
        debug!("Wrote {} bytes to {:?}", output.document.len(), path);
        Ok(path)
    }

    /// Output and `since` documents, so a run never includes its own files
    fn own_files(&self) -> HashSet<PathBuf> {
        std::iter::once(&self.config.output_file)
            .chain(self.config.since.as_ref())
            .filter_map(|p| p.canonicalize().ok())
            .collect()
    }
}

/// Manifest of the `since` document, or `None` when it cannot be read
fn load_previous(path: &Path) -> Result<Option<Manifest>> {
    match reader::parse_file(path) {
        Ok(snapshot) => {
            debug!(
                "Previous snapshot {:?}: {} entries ({:?})",
                path,
                snapshot.manifest.files.len(),
                snapshot.manifest.origin
            );
            Ok(Some(snapshot.manifest))
        }
        Err(e @ (AssemblerError::Io(_) | AssemblerError::Encoding { .. })) => {
            warn!(
                "Cannot read previous snapshot {:?} ({}); assembling all files",
                path, e
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Builder for [`Assembler`]
///
/// Mirrors [`AssemblerConfig`] with chained setters.
#[derive(Debug, Clone, Default)]
pub struct AssemblerBuilder {
    config: AssemblerConfig,
}

impl AssemblerBuilder {
    /// Builder with default settings and no paths
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: AssemblerConfig) -> Self {
        Self { config }
    }

    /// Add a root to assemble
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.paths.push(path.into());
        self
    }

    /// Replace the roots to assemble
    pub fn paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.config.paths = paths;
        self
    }

    /// Set extensions and exact file names to include
    pub fn extensions(mut self, extensions: Vec<String>) -> Self {
        self.config.extensions = extensions;
        self
    }

    /// Set extra exclusion patterns
    pub fn exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.exclude_patterns = patterns;
        self
    }

    /// Apply the built-in exclusion list
    pub fn use_default_excludes(mut self, enabled: bool) -> Self {
        self.config.use_default_excludes = enabled;
        self
    }

    /// Honor `.gitignore` files
    pub fn respect_gitignore(mut self, enabled: bool) -> Self {
        self.config.respect_gitignore = enabled;
        self
    }

    /// Descend into subdirectories
    pub fn recursive(mut self, enabled: bool) -> Self {
        self.config.recursive = enabled;
        self
    }

    /// Include README files regardless of extension
    pub fn include_readmes(mut self, enabled: bool) -> Self {
        self.config.include_readmes = enabled;
        self
    }

    /// Size in bytes above which files are truncated or skipped
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    /// Line count above which files are truncated or skipped
    pub fn max_lines(mut self, lines: Option<usize>) -> Self {
        self.config.max_lines = lines;
        self
    }

    /// Truncate oversized files instead of skipping them
    pub fn truncate_large_files(mut self, enabled: bool) -> Self {
        self.config.truncate_large_files = enabled;
        self
    }

    /// Lines kept from a truncated file
    pub fn truncation_limit_lines(mut self, lines: usize) -> Self {
        self.config.truncation_limit_lines = lines;
        self
    }

    /// Where [`Assembler::write_output`] writes
    pub fn output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_file = path.into();
        self
    }

    /// Earlier snapshot to diff against
    pub fn since(mut self, snapshot: Option<PathBuf>) -> Self {
        self.config.since = snapshot;
        self
    }

    /// Threads used to load file contents
    pub fn parallel_workers(mut self, workers: usize) -> Self {
        self.config.parallel_workers = workers;
        self
    }

    /// Emit the document header
    pub fn show_header(mut self, show: bool) -> Self {
        self.config.show_header = show;
        self
    }

    /// Include the table of contents in the header
    pub fn show_toc(mut self, show: bool) -> Self {
        self.config.show_toc = show;
        self
    }

    /// The configuration built so far
    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Validate the configuration and create the assembler
    pub fn build(self) -> Result<Assembler> {
        Assembler::new(self.config)
    }
}
