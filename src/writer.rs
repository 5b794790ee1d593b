//! Snapshot writer
//!
//! Serializes file records into one Markdown document. Each record becomes a
//! body section (path header plus fenced content) and the document ends with
//! a manifest trailer inside an HTML comment, so a Markdown viewer shows only
//! the code while tools can still recover exact identities and timestamps.
//!
//! ## Examples
//!
//! ```rust
//! use code_assembler::types::FileRecord;
//! use code_assembler::writer::SnapshotWriter;
//!
//! # fn main() -> code_assembler::Result<()> {
//! let records = vec![
//!     FileRecord::new("src/main.rs", "fn main() {}\n", 1_700_000_000.0),
//!     FileRecord::new("README.md", "```sh\ncargo run\n```", 1_700_000_100.0),
//! ];
//!
//! let document = SnapshotWriter::new().with_header(false).write(&records)?;
//! assert!(document.starts_with("## `src/main.rs`"));
//! assert!(document.contains("````markdown"));
//! assert!(document.contains("<!-- CODE_ASSEMBLER_MANIFEST"));
//! # Ok(())
//! # }
//! ```

use crate::error::{AssemblerError, Result};
use crate::format;
use crate::language;
use crate::path_key::PathKey;
use crate::types::{DeltaResult, FileRecord, Manifest, ManifestEntry, SkippedFile};
use crate::utils::{estimate_tokens, format_number};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

const DEFAULT_TITLE: &str = "Codebase Snapshot";

/// Builds snapshot documents from file records
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    show_header: bool,
    include_toc: bool,
    title: String,
    generated_at: Option<DateTime<Utc>>,
    delta_summary: Option<String>,
    skipped: Vec<SkippedFile>,
}

impl Default for SnapshotWriter {
    fn default() -> Self {
        Self {
            show_header: true,
            include_toc: true,
            title: DEFAULT_TITLE.to_string(),
            generated_at: None,
            delta_summary: None,
            skipped: Vec::new(),
        }
    }
}

impl SnapshotWriter {
    /// Writer with a header and table of contents
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit (or omit) the human-readable document header
    pub fn with_header(mut self, show: bool) -> Self {
        self.show_header = show;
        self
    }

    /// Include a table of contents in the header
    pub fn with_toc(mut self, include: bool) -> Self {
        self.include_toc = include;
        self
    }

    /// Set the header title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Pin the generation timestamp (defaults to now)
    pub fn with_generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }

    /// Show a change summary in the header
    pub fn with_delta(mut self, delta: &DeltaResult) -> Self {
        self.delta_summary = Some(delta.summary());
        self
    }

    /// List files the traversal had to leave out
    pub fn with_skipped(mut self, skipped: Vec<SkippedFile>) -> Self {
        self.skipped = skipped;
        self
    }

    /// Serialize `records` into a snapshot document
    ///
    /// # Errors
    ///
    /// - [`AssemblerError::DuplicateKey`] if two records normalize to the
    ///   same path key
    /// - [`AssemblerError::InvalidPath`] if a path cannot appear in a header
    pub fn write(&self, records: &[FileRecord]) -> Result<String> {
        self.write_with_tombstones(records, &[])
    }

    /// Serialize `records` plus tombstone entries for `deleted` paths
    ///
    /// Tombstones only appear in the manifest. A tombstone whose key matches
    /// a live record is dropped.
    pub fn write_with_tombstones(&self, records: &[FileRecord], deleted: &[String]) -> Result<String> {
        let manifest = self.build_manifest(records, deleted)?;

        let mut body = String::new();
        for record in records {
            write_section(&mut body, record);
        }

        let mut trailer = String::new();
        write_trailer(&mut trailer, &manifest)?;

        let mut document = String::with_capacity(body.len() + trailer.len() + 1024);
        if self.show_header {
            let tokens = estimate_tokens(body.chars().count() + trailer.chars().count());
            self.write_header(&mut document, records, &manifest, tokens);
        }
        document.push_str(&body);
        document.push_str(&trailer);

        debug!(
            "Wrote snapshot: {} sections, {} tombstones, {} bytes",
            records.len(),
            manifest.tombstones().count(),
            document.len()
        );
        Ok(document)
    }

    /// Manifest describing `records` and `deleted`, without writing a body
    pub fn build_manifest(&self, records: &[FileRecord], deleted: &[String]) -> Result<Manifest> {
        let mut seen: HashMap<PathKey, &str> = HashMap::with_capacity(records.len());
        for record in records {
            validate_path(&record.path)?;
            if let Some(first) = seen.insert(record.key(), &record.path) {
                return Err(AssemblerError::DuplicateKey {
                    key: record.key().to_string(),
                    first: first.to_string(),
                    second: record.path.clone(),
                });
            }
        }

        let mut manifest = Manifest::new();
        if let Some(at) = self.generated_at {
            manifest.generated_at = at;
        }
        manifest.files = records.iter().map(ManifestEntry::for_record).collect();

        let mut buried = HashSet::new();
        for path in deleted {
            let entry = ManifestEntry::tombstone(path);
            let key = entry.key();
            if key.is_empty() || seen.contains_key(&key) || !buried.insert(key) {
                trace!("Dropping tombstone for {}", path);
                continue;
            }
            manifest.files.push(entry);
        }

        Ok(manifest)
    }

    fn write_header(&self, out: &mut String, records: &[FileRecord], manifest: &Manifest, tokens: usize) {
        out.push_str(&format!("# {}\n\n", plain_text(&self.title)));
        out.push_str(&format!(
            "> Generated: {} | Files: {} | Estimated tokens: ~{}\n\n",
            manifest.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            records.len(),
            format_number(tokens)
        ));

        if let Some(summary) = &self.delta_summary {
            for line in summary.lines() {
                out.push_str(&format!("> {}\n", line));
            }
            out.push('\n');
        }

        if !self.skipped.is_empty() {
            for skipped in &self.skipped {
                out.push_str(&format!(
                    "> Skipped {}: {}\n",
                    plain_text(&skipped.path),
                    plain_text(&skipped.reason.to_string())
                ));
            }
            out.push('\n');
        }

        if self.include_toc && !manifest.files.is_empty() {
            out.push_str("## Contents\n\n");
            for record in records {
                let lines = record.line_count();
                if record.truncated {
                    out.push_str(&format!("- {} ({} lines, truncated)\n", format::code_span(&record.path), lines));
                } else {
                    out.push_str(&format!("- {} ({} lines)\n", format::code_span(&record.path), lines));
                }
            }
            for tombstone in manifest.tombstones() {
                let path = single_line(&tombstone.path);
                out.push_str(&format!("- ~~{}~~ (deleted)\n", format::code_span(&path)));
            }
            out.push('\n');
        }

        out.push_str("---\n\n");
    }
}

/// Append one body section for `record`
///
/// Opening and closing fence come from the same computed sequence.
fn write_section(out: &mut String, record: &FileRecord) {
    let fence = format::fence_for(&record.content);
    let tag = fence_language(record);

    out.push_str(&format::path_header(&record.path));
    out.push_str("\n\n");
    out.push_str(&fence);
    out.push_str(tag);
    out.push('\n');
    out.push_str(&record.content);
    out.push('\n');
    if record.truncated {
        out.push_str(&format::truncation_marker(record.omitted_lines));
        out.push('\n');
    }
    out.push_str(&fence);
    out.push_str("\n\n");
}

/// Header text on one line: whitespace runs and line breaks become one space
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn plain_text(text: &str) -> String {
    single_line(text).replace('`', "'")
}

fn fence_language(record: &FileRecord) -> &str {
    let tag = record.language.as_str();
    if tag.is_empty() || tag.contains(|c: char| c.is_whitespace() || c == '`') {
        language::detect(&record.path)
    } else {
        tag
    }
}

fn write_trailer(out: &mut String, manifest: &Manifest) -> Result<()> {
    let json = serde_json::to_string_pretty(manifest)?;
    out.push_str("<!-- ");
    out.push_str(format::MANIFEST_MARKER);
    out.push('\n');
    out.push_str(&format::escape_comment_body(&json));
    out.push('\n');
    out.push_str(format::COMMENT_CLOSE);
    out.push('\n');
    Ok(())
}

fn validate_path(path: &str) -> Result<()> {
    let reason = if path.trim().is_empty() {
        "path is empty"
    } else if path.contains(['\n', '\r']) {
        "path contains a line break"
    } else if path.trim() != path {
        "path has leading or trailing whitespace"
    } else {
        return Ok(());
    };

    Err(AssemblerError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    })
}
