//! File discovery and content loading
//!
//! [`FileTracker`] is the traversal side of assembly. It works in two steps:
//!
//! 1. [`FileTracker::scan`] walks the configured roots and returns a
//!    [`ListingEntry`] per matching file: display path, location, mtime and
//!    size. Nothing is read yet, so the delta engine can decide first which
//!    files are worth loading.
//! 2. [`FileTracker::load`] reads the selected entries in parallel and
//!    returns [`FileRecord`]s plus the files that had to be skipped.
//!
//! ## Filtering
//!
//! - `.gitignore` and `.ignore` files are respected at every level
//! - exclusion patterns use gitignore glob syntax (`node_modules`, `*.pyc`)
//! - a file is included when its name ends with one of the configured
//!   extensions or equals one of the exact names; each directory's README
//!   is included regardless when enabled
//!
//! ## Ordering
//!
//! Siblings are visited in case-insensitive name order with the README of a
//! directory first, so the same tree always produces the same listing.
//! Loading keeps that order even though it runs on a thread pool.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use code_assembler::file_tracking::FileTracker;
//! use std::path::PathBuf;
//!
//! # fn main() -> code_assembler::Result<()> {
//! let tracker = FileTracker::new(vec![PathBuf::from("./my_project")])
//!     .with_extensions(vec!["py".to_string(), "Dockerfile".to_string()])
//!     .with_ignore_patterns(vec!["*.tmp".to_string(), "node_modules".to_string()])
//!     .with_max_file_size(1024 * 1024);
//!
//! let listing = tracker.scan()?;
//! let loaded = tracker.load(&listing)?;
//! println!("{} files loaded, {} skipped", loaded.records.len(), loaded.skipped.len());
//! # Ok(())
//! # }
//! ```

use crate::config::{self, AssemblerConfig, IncludeRules};
use crate::error::{AssemblerError, Result};
use crate::types::{
    FileRecord, ListingEntry, LoadReport, ProgressCallback, ProgressInfo, SkipReason, SkippedFile,
};
use crate::utils::{self, BINARY_SNIFF_LEN};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::Instant;
use tracing::{debug, trace, warn};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Walks source roots and loads file contents
///
/// ## Configuration Options
///
/// - `roots`: files and directories to assemble
/// - `include`: extensions and exact names to keep
/// - `exclude_patterns`: gitignore-style exclusion globs
/// - `max_file_size` / `max_lines`: limits beyond which files are
///   truncated (or skipped when truncation is off)
/// - `parallel_workers`: threads used by [`FileTracker::load`]
#[derive(Clone)]
pub struct FileTracker {
    roots: Vec<PathBuf>,
    include: IncludeRules,
    exclude_patterns: Vec<String>,
    respect_gitignore: bool,
    recursive: bool,
    include_readmes: bool,
    max_file_size: u64,
    max_lines: Option<usize>,
    truncate_large_files: bool,
    truncation_limit_lines: usize,
    parallel_workers: usize,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for FileTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTracker")
            .field("roots", &self.roots)
            .field("include", &self.include)
            .field("exclude_patterns", &self.exclude_patterns)
            .field("recursive", &self.recursive)
            .field("max_file_size", &self.max_file_size)
            .field("max_lines", &self.max_lines)
            .field("parallel_workers", &self.parallel_workers)
            .finish_non_exhaustive()
    }
}

impl FileTracker {
    /// Create a tracker over `roots` with default settings
    ///
    /// No extension is included until [`FileTracker::with_extensions`] is
    /// called; README files are still picked up.
    pub fn new(roots: Vec<PathBuf>) -> Self {
        let defaults = AssemblerConfig::default();
        Self {
            roots,
            include: IncludeRules::default(),
            exclude_patterns: defaults.effective_excludes(),
            respect_gitignore: defaults.respect_gitignore,
            recursive: defaults.recursive,
            include_readmes: defaults.include_readmes,
            max_file_size: defaults.max_file_size,
            max_lines: defaults.max_lines,
            truncate_large_files: defaults.truncate_large_files,
            truncation_limit_lines: defaults.truncation_limit_lines,
            parallel_workers: defaults.parallel_workers,
            progress: None,
        }
    }

    /// Create a tracker mirroring an assembly configuration
    pub fn from_config(config: &AssemblerConfig) -> Self {
        Self {
            roots: config.paths.clone(),
            include: config.include_rules(),
            exclude_patterns: config.effective_excludes(),
            respect_gitignore: config.respect_gitignore,
            recursive: config.recursive,
            include_readmes: config.include_readmes,
            max_file_size: config.max_file_size,
            max_lines: config.max_lines,
            truncate_large_files: config.truncate_large_files,
            truncation_limit_lines: config.truncation_limit_lines,
            parallel_workers: config.parallel_workers.max(1),
            progress: None,
        }
    }

    /// Set the extensions and exact file names to include
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.include = IncludeRules::from_extensions(&extensions);
        self
    }

    /// Replace the exclusion patterns (defaults included)
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    /// Honor `.gitignore` files
    pub fn with_gitignore(mut self, respect: bool) -> Self {
        self.respect_gitignore = respect;
        self
    }

    /// Descend into subdirectories
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Include README files regardless of extension
    pub fn with_readmes(mut self, include: bool) -> Self {
        self.include_readmes = include;
        self
    }

    /// Set maximum file size in bytes
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Set maximum line count
    pub fn with_max_lines(mut self, lines: Option<usize>) -> Self {
        self.max_lines = lines;
        self
    }

    /// Truncate oversized files to `keep_lines` instead of skipping them
    pub fn with_truncation(mut self, enabled: bool, keep_lines: usize) -> Self {
        self.truncate_large_files = enabled;
        self.truncation_limit_lines = keep_lines;
        self
    }

    /// Set number of threads used for loading
    pub fn with_parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers.max(1);
        self
    }

    /// Report progress while scanning and loading
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Directory that display paths are relative to
    ///
    /// The root itself for a single directory, its parent for a single
    /// file, the deepest common ancestor for several roots.
    pub fn base_dir(&self) -> Result<PathBuf> {
        let roots = self.resolve_roots()?;
        display_base(&roots)
    }

    /// Walk the roots and list every file to assemble
    ///
    /// # Errors
    ///
    /// - [`AssemblerError::InvalidConfiguration`] if a root does not exist
    /// - [`AssemblerError::InvalidPattern`] if a pattern cannot be compiled
    pub fn scan(&self) -> Result<Vec<ListingEntry>> {
        let start = Instant::now();
        let roots = self.resolve_roots()?;
        let base = display_base(&roots)?;
        let matcher = self.build_matcher()?;

        let mut seen = HashSet::new();
        let mut readme_dirs = HashSet::new();
        let mut listing = Vec::new();

        for root in &roots {
            for result in self.walker(root)?.build() {
                let entry = match result {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("Walk error: {}", e);
                        continue;
                    }
                };
                if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                    continue;
                }

                let path = entry.path();
                let name = entry.file_name().to_string_lossy();
                let matched = matcher.is_match(name.as_ref());
                let readme = self.include_readmes
                    && config::is_readme(&name)
                    && readme_dirs.insert(path.parent().map(Path::to_path_buf));
                if !(matched || readme) {
                    trace!("Not included: {:?}", path);
                    continue;
                }
                if !seen.insert(path.to_path_buf()) {
                    continue;
                }

                let metadata = match entry.metadata() {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        warn!("Cannot stat {:?}: {}", path, e);
                        continue;
                    }
                };
                let relative = utils::make_relative(path, &base)?;
                let listed = ListingEntry {
                    path: utils::to_display_path(&relative),
                    absolute_path: path.to_path_buf(),
                    mtime: metadata
                        .modified()
                        .map(utils::system_time_to_epoch)
                        .unwrap_or_default(),
                    size: metadata.len(),
                };

                if let Some(progress) = &self.progress {
                    progress(ProgressInfo {
                        operation: "Scanning files".to_string(),
                        current_item: Some(listed.path.clone()),
                        processed: listing.len() + 1,
                        total: None,
                    });
                }
                listing.push(listed);
            }
        }

        debug!(
            "Scanned {} files under {:?} in {:?}",
            listing.len(),
            base,
            start.elapsed()
        );
        Ok(listing)
    }

    /// Read the contents of `entries`, in order
    ///
    /// Binary files, undecodable files and files over the limits with
    /// truncation disabled are reported in [`LoadReport::skipped`].
    pub fn load(&self, entries: &[ListingEntry]) -> Result<LoadReport> {
        let start = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallel_workers)
            .build()
            .map_err(|e| AssemblerError::internal(format!("cannot start loader threads: {}", e)))?;

        let processed = AtomicUsize::new(0);
        let results: Vec<std::result::Result<FileRecord, SkippedFile>> = pool.install(|| {
            entries
                .par_iter()
                .map(|entry| {
                    let result = self.read_entry(entry).map_err(|reason| SkippedFile {
                        path: entry.path.clone(),
                        reason,
                    });
                    let done = processed.fetch_add(1, AtomicOrdering::Relaxed) + 1;
                    if let Some(progress) = &self.progress {
                        progress(ProgressInfo {
                            operation: "Reading files".to_string(),
                            current_item: Some(entry.path.clone()),
                            processed: done,
                            total: Some(entries.len()),
                        });
                    }
                    result
                })
                .collect()
        });

        let mut report = LoadReport::default();
        for result in results {
            match result {
                Ok(record) => report.records.push(record),
                Err(skipped) => {
                    warn!("Skipping {}: {}", skipped.path, skipped.reason);
                    report.skipped.push(skipped);
                }
            }
        }

        debug!(
            "Loaded {} files ({} skipped) in {:?}",
            report.records.len(),
            report.skipped.len(),
            start.elapsed()
        );
        Ok(report)
    }

    fn read_entry(&self, entry: &ListingEntry) -> std::result::Result<FileRecord, SkipReason> {
        let oversized = entry.size > self.max_file_size;
        if oversized && !self.truncate_large_files {
            return Err(SkipReason::TooLarge {
                size: entry.size,
                limit: self.max_file_size,
            });
        }

        if oversized {
            let (head, omitted) = read_head(&entry.absolute_path, self.truncation_limit_lines)?;
            return Ok(make_record(entry, head, omitted));
        }

        let bytes = fs::read(&entry.absolute_path).map_err(unreadable)?;
        let content = decode(&bytes)?;

        if let Some(limit) = self.max_lines {
            let lines = content.lines().count();
            if lines > limit {
                if !self.truncate_large_files {
                    return Err(SkipReason::TooLong { lines, limit });
                }
                let (head, omitted) = truncate_lines(&content, self.truncation_limit_lines.min(limit));
                return Ok(make_record(entry, head, omitted));
            }
        }

        Ok(FileRecord::new(&entry.path, content, entry.mtime))
    }

    fn resolve_roots(&self) -> Result<Vec<PathBuf>> {
        let cwd = std::env::current_dir()?;
        let mut roots = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            let absolute = cwd.join(root);
            let canonical = absolute.canonicalize().map_err(|_| {
                AssemblerError::config(format!("path does not exist: {}", root.display()))
            })?;
            if !roots.contains(&canonical) {
                roots.push(canonical);
            }
        }
        if roots.is_empty() {
            return Err(AssemblerError::config("at least one path must be specified"));
        }
        Ok(roots)
    }

    fn walker(&self, root: &Path) -> Result<WalkBuilder> {
        let mut builder = WalkBuilder::new(root);
        let readmes_first = self.include_readmes;
        builder
            .follow_links(false)
            .hidden(false)
            .parents(self.respect_gitignore)
            .ignore(self.respect_gitignore)
            .git_ignore(self.respect_gitignore)
            .git_global(false)
            .git_exclude(false)
            .require_git(false)
            .sort_by_file_name(move |a, b| compare_names(a, b, readmes_first));
        if !self.recursive {
            builder.max_depth(Some(1));
        }

        let override_root = if root.is_dir() {
            root
        } else {
            root.parent().unwrap_or(root)
        };
        let mut overrides = OverrideBuilder::new(override_root);
        for pattern in &self.exclude_patterns {
            // `!` marks an ignore glob for the override matcher
            overrides
                .add(&format!("!{}", pattern))
                .map_err(|e| AssemblerError::InvalidPattern(format!("{}: {}", pattern, e)))?;
        }
        builder.overrides(overrides.build()?);
        Ok(builder)
    }

    fn build_matcher(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for extension in &self.include.extensions {
            let glob = GlobBuilder::new(&format!("*{}", globset::escape(extension)))
                .case_insensitive(true)
                .build()?;
            builder.add(glob);
        }
        for name in &self.include.file_names {
            builder.add(GlobBuilder::new(&globset::escape(name)).build()?);
        }
        Ok(builder.build()?)
    }
}

fn display_base(roots: &[PathBuf]) -> Result<PathBuf> {
    let bases: Vec<PathBuf> = roots
        .iter()
        .map(|root| {
            if root.is_dir() {
                root.clone()
            } else {
                root.parent().map(Path::to_path_buf).unwrap_or_else(|| root.clone())
            }
        })
        .collect();

    utils::common_ancestor(&bases)
        .ok_or_else(|| AssemblerError::config("the given paths share no common directory"))
}

fn compare_names(a: &OsStr, b: &OsStr, readmes_first: bool) -> Ordering {
    let a = a.to_string_lossy();
    let b = b.to_string_lossy();
    let readme_order = if readmes_first {
        config::is_readme(&b).cmp(&config::is_readme(&a))
    } else {
        Ordering::Equal
    };
    readme_order
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        .then_with(|| a.cmp(&b))
}

fn make_record(entry: &ListingEntry, content: String, omitted: usize) -> FileRecord {
    let record = FileRecord::new(&entry.path, content, entry.mtime);
    if omitted > 0 {
        record.with_truncation(omitted)
    } else {
        record
    }
}

fn unreadable(err: io::Error) -> SkipReason {
    SkipReason::Unreadable(err.to_string())
}

/// Decode file bytes as UTF-8 text, dropping a BOM
fn decode(bytes: &[u8]) -> std::result::Result<String, SkipReason> {
    if utils::is_binary_content(bytes) {
        return Err(SkipReason::Binary);
    }
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    String::from_utf8(bytes.to_vec()).map_err(|_| SkipReason::InvalidEncoding)
}

/// Read the first `keep` lines of a large file without loading the rest
fn read_head(path: &Path, keep: usize) -> std::result::Result<(String, usize), SkipReason> {
    let file = File::open(path).map_err(unreadable)?;
    let mut reader = BufReader::with_capacity(BINARY_SNIFF_LEN, file);
    if utils::is_binary_content(reader.fill_buf().map_err(unreadable)?) {
        return Err(SkipReason::Binary);
    }

    let mut head = Vec::new();
    let mut line = Vec::new();
    let mut kept = 0;
    let mut omitted = 0;
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).map_err(unreadable)? == 0 {
            break;
        }
        if kept < keep {
            head.extend_from_slice(&line);
            kept += 1;
        } else {
            omitted += 1;
        }
    }

    let text = decode(&head)?;
    Ok((strip_line_ending(&text).to_string(), omitted))
}

/// Keep the first `keep` lines of `content`
fn truncate_lines(content: &str, keep: usize) -> (String, usize) {
    let total = content.lines().count();
    if total <= keep {
        return (content.to_string(), 0);
    }

    let end: usize = content.split_inclusive('\n').take(keep).map(str::len).sum();
    (strip_line_ending(&content[..end]).to_string(), total - keep)
}

fn strip_line_ending(text: &str) -> &str {
    match text.strip_suffix('\n') {
        Some(rest) => rest.strip_suffix('\r').unwrap_or(rest),
        None => text,
    }
}
