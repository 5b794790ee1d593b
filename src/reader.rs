//! Snapshot reader and manifest parser
//!
//! Turns a document produced by [`crate::writer`] (or a hand-edited or older
//! one) back into a [`Snapshot`]. The scanner is structural: it walks the
//! document line by line tracking whether it is inside a fence or inside the
//! manifest comment, so content that merely looks like a header, a fence or
//! a trailer never confuses it.
//!
//! ## Tolerated variation
//!
//! - CRLF line endings (stripped from delimiter lines only)
//! - any number of `#` before a path header, trailing text after it
//! - indented or whitespace-padded fences, backtick or tilde fences
//! - commentary between sections, including unlabelled code blocks
//! - documents without a manifest, or with the older minute-resolution
//!   `CODE_ASSEMBLER_METADATA` trailer
//!
//! ## Failures
//!
//! Only structural damage aborts: a fence that never closes, a manifest
//! comment that never ends or holds invalid JSON, or a second manifest.
//! Everything else is recorded in [`Snapshot::warnings`].

use crate::error::{AssemblerError, Result};
use crate::format::{self, TrailerKind};
use crate::language;
use crate::path_key::{display_path, PathKey};
use crate::types::{FileRecord, Manifest, ManifestEntry, ManifestOrigin, Snapshot};
use crate::utils::system_time_to_epoch;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, warn};

const LEGACY_MTIME_FORMAT: &str = "%Y-%m-%d %H:%M";
const LEGACY_GENERATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse snapshot text
///
/// # Errors
///
/// - [`AssemblerError::MalformedSnapshot`] for an unclosed fence, an
///   unterminated or unparsable manifest, or more than one manifest
pub fn parse(text: &str) -> Result<Snapshot> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let scan = Scanner::default().run(text)?;
    Ok(reconcile(scan))
}

/// Read and parse a snapshot file
pub fn parse_file(path: &Path) -> Result<Snapshot> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8(bytes).map_err(|_| AssemblerError::Encoding {
        path: path.to_path_buf(),
        reason: "invalid UTF-8".to_string(),
    })?;
    debug!("Parsing snapshot {:?} ({} bytes)", path, text.len());
    parse(&text)
}

/// A body section as found in the document
#[derive(Debug)]
struct Section {
    path: String,
    language: String,
    line: usize,
    /// Content with every enclosed line kept
    full: String,
    /// Content minus a final truncation-marker line, with the omitted count
    stripped: Option<(String, usize)>,
}

#[derive(Debug)]
enum State {
    Outside,
    Fence {
        path: Option<String>,
        delimiter: String,
        language: String,
        start: usize,
        lines: Vec<String>,
    },
    Trailer {
        kind: TrailerKind,
        start: usize,
        body: String,
    },
}

#[derive(Debug)]
struct ScanResult {
    sections: Vec<Section>,
    manifest: Option<Manifest>,
    warnings: Vec<String>,
}

#[derive(Debug, Default)]
struct Scanner {
    sections: Vec<Section>,
    manifest: Option<Manifest>,
    warnings: Vec<String>,
    pending: Option<String>,
}

impl Scanner {
    fn run(mut self, text: &str) -> Result<ScanResult> {
        let mut state = State::Outside;

        for (idx, raw) in text.split('\n').enumerate() {
            let number = idx + 1;
            state = match state {
                State::Outside => self.outside(raw, number)?,
                State::Fence {
                    path,
                    delimiter,
                    language,
                    start,
                    mut lines,
                } => {
                    if format::is_fence_close(raw, &delimiter) {
                        if let Some(path) = path {
                            self.sections
                                .push(build_section(path, language, start, lines, raw.ends_with('\r')));
                        }
                        State::Outside
                    } else {
                        lines.push(raw.to_string());
                        State::Fence {
                            path,
                            delimiter,
                            language,
                            start,
                            lines,
                        }
                    }
                }
                State::Trailer { kind, start, mut body } => match raw.find(format::COMMENT_CLOSE) {
                    Some(end) => {
                        body.push_str(&raw[..end]);
                        self.finish_trailer(kind, start, &body)?;
                        State::Outside
                    }
                    None => {
                        body.push_str(raw);
                        body.push('\n');
                        State::Trailer { kind, start, body }
                    }
                },
            };
        }

        match state {
            State::Outside => Ok(ScanResult {
                sections: self.sections,
                manifest: self.manifest,
                warnings: self.warnings,
            }),
            State::Fence { start, .. } => Err(AssemblerError::malformed(
                start,
                "code fence is never closed",
            )),
            State::Trailer { start, .. } => Err(AssemblerError::malformed(
                start,
                "manifest comment is never terminated",
            )),
        }
    }

    fn outside(&mut self, raw: &str, number: usize) -> Result<State> {
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        if let Some(kind) = format::parse_trailer_open(line) {
            let marker = match kind {
                TrailerKind::Current => format::MANIFEST_MARKER,
                TrailerKind::Legacy => format::LEGACY_MANIFEST_MARKER,
            };
            let rest = line
                .find(marker)
                .map(|i| &line[i + marker.len()..])
                .unwrap_or_default();

            if let Some(end) = rest.find(format::COMMENT_CLOSE) {
                self.finish_trailer(kind, number, &rest[..end])?;
                return Ok(State::Outside);
            }

            let mut body = rest.to_string();
            body.push('\n');
            return Ok(State::Trailer {
                kind,
                start: number,
                body,
            });
        }

        if let Some(path) = format::parse_path_header(line) {
            self.pending = Some(path.to_string());
            return Ok(State::Outside);
        }

        if let Some(open) = format::parse_fence_open(line) {
            let path = self.pending.take();
            if path.is_none() {
                debug!("Skipping unlabelled code block at line {}", number);
            }
            return Ok(State::Fence {
                path,
                delimiter: open.delimiter.to_string(),
                language: open.language.to_string(),
                start: number,
                lines: Vec::new(),
            });
        }

        Ok(State::Outside)
    }

    fn finish_trailer(&mut self, kind: TrailerKind, start: usize, body: &str) -> Result<()> {
        if self.manifest.is_some() {
            return Err(AssemblerError::malformed(
                start,
                "document contains more than one manifest",
            ));
        }

        let manifest = match kind {
            TrailerKind::Current => {
                let mut manifest: Manifest = serde_json::from_str(body.trim()).map_err(|e| {
                    AssemblerError::malformed(start, format!("invalid manifest JSON: {}", e))
                })?;
                manifest.origin = ManifestOrigin::Embedded;
                manifest
            }
            TrailerKind::Legacy => {
                let legacy: LegacyManifest = serde_json::from_str(body.trim()).map_err(|e| {
                    AssemblerError::malformed(start, format!("invalid legacy manifest JSON: {}", e))
                })?;
                legacy.into_manifest(&mut self.warnings)
            }
        };

        debug!(
            "Found {:?} manifest with {} entries at line {}",
            manifest.origin,
            manifest.files.len(),
            start
        );
        self.manifest = Some(manifest);
        Ok(())
    }
}

/// Older trailer: `files` maps paths to local `YYYY-MM-DD HH:MM` times
#[derive(Debug, Deserialize)]
struct LegacyManifest {
    #[serde(default)]
    version: String,
    #[serde(default)]
    generated_at: Option<String>,
    #[serde(default)]
    files: BTreeMap<String, serde_json::Value>,
}

impl LegacyManifest {
    fn into_manifest(self, warnings: &mut Vec<String>) -> Manifest {
        let generated_at = self
            .generated_at
            .as_deref()
            .and_then(|s| parse_local(s, LEGACY_GENERATED_FORMAT))
            .unwrap_or_else(Utc::now);

        let mut files = Vec::with_capacity(self.files.len());
        for (path, stamp) in self.files {
            let parsed = stamp
                .as_str()
                .and_then(|s| parse_local(s, LEGACY_MTIME_FORMAT));
            match parsed {
                Some(at) => files.push(ManifestEntry {
                    path: display_path(&path),
                    mtime: at.timestamp() as f64,
                    truncated: false,
                    deleted: false,
                }),
                None => warnings.push(format!(
                    "Ignoring legacy manifest entry for {} with unreadable time {}",
                    path, stamp
                )),
            }
        }

        Manifest {
            version: self.version,
            generated_at,
            files,
            origin: ManifestOrigin::Legacy,
        }
    }
}

fn parse_local(value: &str, fmt: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), fmt).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

fn build_section(path: String, language: String, start: usize, lines: Vec<String>, crlf: bool) -> Section {
    let full = join_content(&lines, crlf);
    let stripped = lines.split_last().and_then(|(last, rest)| {
        format::parse_truncation_marker(last).map(|omitted| (join_content(rest, crlf), omitted))
    });

    Section {
        path,
        language,
        line: start,
        full,
        stripped,
    }
}

/// Join enclosed lines; in CRLF documents the line ending before the
/// closing fence is not content
fn join_content(lines: &[String], crlf: bool) -> String {
    let mut content = lines.join("\n");
    if crlf && content.ends_with('\r') {
        content.pop();
    }
    content
}

/// Match body sections against the manifest and assemble the snapshot
fn reconcile(scan: ScanResult) -> Snapshot {
    let ScanResult {
        sections,
        manifest,
        mut warnings,
    } = scan;
    let now = system_time_to_epoch(SystemTime::now());

    let mut seen = HashSet::with_capacity(sections.len());
    let mut unique = Vec::with_capacity(sections.len());
    for section in sections {
        let key = PathKey::new(&section.path);
        if key.is_empty() {
            warnings.push(format!("Ignoring section with empty path at line {}", section.line));
        } else if !seen.insert(key) {
            warnings.push(format!(
                "Duplicate section for {} at line {} ignored; the first one wins",
                section.path, section.line
            ));
        } else {
            unique.push(section);
        }
    }

    let Some(parsed) = manifest else {
        let records: Vec<FileRecord> = unique
            .into_iter()
            .map(|section| {
                let truncated = section.stripped.is_some();
                into_record(section, now, truncated)
            })
            .collect();

        let mut manifest = Manifest::new();
        manifest.origin = ManifestOrigin::Reconstructed;
        manifest.files = records.iter().map(ManifestEntry::for_record).collect();
        debug!("No manifest found; reconstructed {} entries", records.len());

        return finish(records, manifest, Vec::new(), warnings);
    };

    let mut index: HashMap<PathKey, &ManifestEntry> = HashMap::new();
    for entry in parsed.live_entries() {
        let key = entry.key();
        if index.contains_key(&key) {
            warnings.push(format!("Duplicate manifest entry for {} ignored", entry.path));
        } else {
            index.insert(key, entry);
        }
    }

    let mut records = Vec::with_capacity(unique.len());
    for section in unique {
        let key = PathKey::new(&section.path);
        match index.get(&key) {
            Some(entry) => {
                let mtime = entry.mtime;
                records.push(into_record(section, mtime, entry.truncated));
            }
            None => {
                warnings.push(format!(
                    "{} has no manifest entry; using the current time",
                    section.path
                ));
                let truncated = section.stripped.is_some();
                records.push(into_record(section, now, truncated));
            }
        }
    }

    let present: HashSet<PathKey> = records.iter().map(FileRecord::key).collect();
    let mut deleted = Vec::new();
    let mut tombstones = Vec::new();
    let mut buried = HashSet::new();
    for entry in &parsed.files {
        let key = entry.key();
        if present.contains(&key) {
            if entry.deleted {
                warnings.push(format!(
                    "{} is marked deleted but has a section; keeping the section",
                    entry.path
                ));
            }
            continue;
        }
        if !buried.insert(key) {
            continue;
        }
        if !entry.deleted {
            warnings.push(format!(
                "{} is listed in the manifest but has no section",
                entry.path
            ));
        }
        deleted.push(entry.path.clone());
        tombstones.push(ManifestEntry::tombstone(&entry.path));
    }

    let mut manifest = Manifest {
        files: records.iter().map(ManifestEntry::for_record).collect(),
        ..parsed
    };
    manifest.files.extend(tombstones);

    finish(records, manifest, deleted, warnings)
}

fn into_record(section: Section, mtime: f64, truncated: bool) -> FileRecord {
    let language = if section.language.is_empty() {
        language::detect(&section.path).to_string()
    } else {
        section.language
    };

    let record = FileRecord::new(&section.path, String::new(), mtime).with_language(language);
    match (truncated, section.stripped) {
        (true, Some((content, omitted))) => FileRecord { content, ..record }.with_truncation(omitted),
        (true, None) => FileRecord {
            content: section.full,
            ..record
        }
        .with_truncation(0),
        (false, _) => FileRecord {
            content: section.full,
            ..record
        },
    }
}

fn finish(records: Vec<FileRecord>, manifest: Manifest, deleted: Vec<String>, warnings: Vec<String>) -> Snapshot {
    for warning in &warnings {
        warn!("{}", warning);
    }
    Snapshot {
        records,
        manifest,
        deleted,
        warnings,
    }
}
