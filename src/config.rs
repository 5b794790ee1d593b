//! Assembly and rebuild configuration
//!
//! [`AssemblerConfig`] is a plain serde struct. Every field has a default,
//! so a JSON file only needs the keys it wants to change:
//!
//! ```json
//! {
//!   "paths": ["src", "README.md"],
//!   "extensions": ["py", ".toml", "Dockerfile"],
//!   "exclude_patterns": ["*.generated.py"],
//!   "max_lines": 2000
//! }
//! ```
//!
//! ## Extensions
//!
//! Entries in `extensions` are normalized before use:
//!
//! | Input        | Meaning |
//! |--------------|---------|
//! | `.py`, `py`  | files ending in `.py` (case-insensitive) |
//! | `env.j2`     | files ending in `.env.j2` |
//! | `Dockerfile` | files named exactly `Dockerfile` |
//!
//! A bare name starting with an uppercase letter is taken as an exact file
//! name; everything else is a suffix.

use crate::error::{AssemblerError, Result};
use crate::utils;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default maximum file size before truncation: 10 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Lines kept from a truncated file by default
pub const DEFAULT_TRUNCATION_LINES: usize = 500;

/// Default output document name
pub const DEFAULT_OUTPUT_FILE: &str = "codebase.md";

/// Exclusion patterns applied unless `use_default_excludes` is off
///
/// Gitignore glob syntax; a bare name matches at any depth.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "__pycache__",
    "*.pyc",
    "*.pyo",
    "*.pyd",
    "*.so",
    "*.dll",
    "*.dylib",
    "*.egg-info",
    ".eggs",
    "dist",
    "build",
    ".venv",
    "venv",
    "env",
    "node_modules",
    "target",
    ".idea",
    ".vscode",
    ".DS_Store",
    "Thumbs.db",
];

/// File names treated as a directory's README, in priority order
pub const README_FILENAMES: &[&str] = &[
    "README.md",
    "README.MD",
    "README.rst",
    "README.txt",
    "README",
    "readme.md",
    "Readme.md",
];

/// Whether `name` is one of [`README_FILENAMES`]
pub fn is_readme(name: &str) -> bool {
    README_FILENAMES.contains(&name)
}

/// Configuration for one assembly run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Files and directories to assemble
    pub paths: Vec<PathBuf>,
    /// Extensions and exact file names to include
    pub extensions: Vec<String>,
    /// Extra exclusion globs
    pub exclude_patterns: Vec<String>,
    /// Apply [`DEFAULT_EXCLUDES`]
    pub use_default_excludes: bool,
    /// Honor `.gitignore` and `.ignore` files
    pub respect_gitignore: bool,
    /// Descend into subdirectories
    pub recursive: bool,
    /// Include each directory's README regardless of extension
    pub include_readmes: bool,
    /// Size in bytes above which a file is truncated or skipped
    pub max_file_size: u64,
    /// Truncate oversized files instead of skipping them
    pub truncate_large_files: bool,
    /// Lines kept from a truncated file
    pub truncation_limit_lines: usize,
    /// Line count above which a file is truncated or skipped
    pub max_lines: Option<usize>,
    /// Where the document is written
    pub output_file: PathBuf,
    /// Earlier snapshot to diff against
    pub since: Option<PathBuf>,
    /// Threads used to load file contents
    pub parallel_workers: usize,
    /// Emit the human-readable header
    pub show_header: bool,
    /// List every file in the header's table of contents
    pub show_toc: bool,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            extensions: Vec::new(),
            exclude_patterns: Vec::new(),
            use_default_excludes: true,
            respect_gitignore: true,
            recursive: true,
            include_readmes: true,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            truncate_large_files: true,
            truncation_limit_lines: DEFAULT_TRUNCATION_LINES,
            max_lines: None,
            output_file: PathBuf::from(DEFAULT_OUTPUT_FILE),
            since: None,
            parallel_workers: num_cpus::get(),
            show_header: true,
            show_toc: true,
        }
    }
}

impl AssemblerConfig {
    /// Load a configuration from a JSON file
    ///
    /// The result is not validated; call [`AssemblerConfig::validate`]
    /// after applying any overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save this configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        utils::atomic_write(path, json.as_bytes())?;
        debug!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Check the configuration for values that cannot work
    ///
    /// # Errors
    ///
    /// - [`AssemblerError::InvalidConfiguration`] naming the first problem
    pub fn validate(&self) -> Result<()> {
        if self.paths.is_empty() {
            return Err(AssemblerError::config("at least one path must be specified"));
        }
        if self.extensions.is_empty() {
            return Err(AssemblerError::config("at least one extension must be specified"));
        }
        if let Some(bad) = self.extensions.iter().find(|e| e.trim().trim_start_matches('.').is_empty()) {
            return Err(AssemblerError::config(format!("invalid extension {:?}", bad)));
        }
        if self.max_file_size == 0 {
            return Err(AssemblerError::config("max_file_size must be positive"));
        }
        if self.truncation_limit_lines == 0 {
            return Err(AssemblerError::config("truncation_limit_lines must be positive"));
        }
        if self.max_lines == Some(0) {
            return Err(AssemblerError::config("max_lines must be positive"));
        }
        if self.parallel_workers == 0 {
            return Err(AssemblerError::config("parallel_workers must be positive"));
        }
        Ok(())
    }

    /// Normalized inclusion rules derived from `extensions`
    pub fn include_rules(&self) -> IncludeRules {
        IncludeRules::from_extensions(&self.extensions)
    }

    /// Default excludes (when enabled) followed by user patterns
    pub fn effective_excludes(&self) -> Vec<String> {
        let mut patterns: Vec<String> = if self.use_default_excludes {
            DEFAULT_EXCLUDES.iter().map(|p| p.to_string()).collect()
        } else {
            Vec::new()
        };
        for pattern in &self.exclude_patterns {
            if !patterns.contains(pattern) {
                patterns.push(pattern.clone());
            }
        }
        patterns
    }
}

/// Normalized form of the `extensions` setting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeRules {
    /// Suffixes with a leading dot (`.py`, `.env.j2`)
    pub extensions: Vec<String>,
    /// Exact file names (`Dockerfile`)
    pub file_names: Vec<String>,
}

impl IncludeRules {
    /// Split raw entries into suffixes and exact names
    pub fn from_extensions(raw: &[String]) -> Self {
        let mut rules = IncludeRules::default();
        for entry in raw {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }

            let starts_upper = entry.chars().next().is_some_and(char::is_uppercase);
            if entry.starts_with('.') {
                push_unique(&mut rules.extensions, entry.to_string());
            } else if !entry.contains('.') && starts_upper {
                push_unique(&mut rules.file_names, entry.to_string());
            } else {
                push_unique(&mut rules.extensions, format!(".{}", entry));
            }
        }
        rules
    }

    /// Whether no rule is present
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty() && self.file_names.is_empty()
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// Configuration for rebuilding a tree from a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebuildConfig {
    /// Snapshot document to read
    pub snapshot: PathBuf,
    /// Directory the tree is rebuilt under
    pub output_dir: PathBuf,
    /// Only report what would be written
    pub dry_run: bool,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            snapshot: PathBuf::from(DEFAULT_OUTPUT_FILE),
            output_dir: PathBuf::from("."),
            dry_run: false,
        }
    }
}

impl RebuildConfig {
    /// Check that the snapshot exists and the output is not a file
    pub fn validate(&self) -> Result<()> {
        if !self.snapshot.is_file() {
            return Err(AssemblerError::config(format!(
                "snapshot {:?} does not exist",
                self.snapshot
            )));
        }
        if self.output_dir.is_file() {
            return Err(AssemblerError::config(format!(
                "output directory {:?} is a file",
                self.output_dir
            )));
        }
        Ok(())
    }
}
