//! # code-assembler - Source trees as single Markdown snapshots
//!
//! Assembles a directory tree of source files into one Markdown document
//! that can be pasted into a language-model conversation, and reverses the
//! operation: given such a document, possibly hand-edited, it rebuilds the
//! tree on disk.
//!
//! ## Overview
//!
//! - **Snapshots**: every file becomes a `## \`path\`` header and a fenced
//!   code block; a manifest trailer hidden in an HTML comment records exact
//!   paths, modification times and truncation flags
//! - **Delta mode**: a new document can carry only the files changed since
//!   an earlier snapshot, with deletions recorded as tombstones
//! - **Rebuild**: a snapshot is turned into a plan of file writes that can
//!   never escape the output directory, then applied or shown as a dry run
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use code_assembler::{AssemblerBuilder, Rebuilder};
//!
//! # fn main() -> code_assembler::Result<()> {
//! let assembler = AssemblerBuilder::new()
//!     .path("./my_project")
//!     .extensions(vec!["rs".to_string(), "toml".to_string()])
//!     .output_file("codebase.md")
//!     .build()?;
//! let output = assembler.run()?;
//! assembler.write_output(&output)?;
//!
//! // Later, possibly after the document was edited
//! let snapshot = code_assembler::parse_file("codebase.md".as_ref())?;
//! let outcome = Rebuilder::new("./restored").dry_run(true).rebuild(&snapshot)?;
//! for warning in outcome.plan.warnings() {
//!     eprintln!("{}", warning);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Working in memory
//!
//! ```rust
//! use code_assembler::{assemble, parse, FileRecord};
//!
//! # fn main() -> code_assembler::Result<()> {
//! let records = vec![FileRecord::new("src/lib.rs", "pub fn answer() -> u32 { 42 }\n", 1.0)];
//! let document = assemble(&records, None)?;
//! let snapshot = parse(&document)?;
//! assert_eq!(snapshot.records, records);
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Path keys
//!
//! Paths are compared through [`PathKey`]: separators unified, leading `./`
//! and trailing `/` removed, lowercased. Two files whose keys collide cannot
//! share a snapshot.
//!
//! ### Change detection
//!
//! A file is modified when its modification time differs from the one in
//! the previous manifest. Content is never hashed.
//!
//! ## Error Handling
//!
//! Operations return [`Result<T>`] with [`AssemblerError`]. A structurally
//! broken document aborts parsing; per-file problems (binary files, paths
//! escaping the rebuild root, write failures) are collected in reports and
//! the rest of the operation proceeds.
//!
//! ## Module Organization
//!
//! - [`assembler`]: high-level assembly pipeline
//! - [`writer`] / [`reader`]: document serialization and parsing
//! - [`delta`]: change detection against an earlier manifest
//! - [`rebuild`]: planning and applying a tree rebuild
//! - [`file_tracking`]: directory traversal and content loading
//! - [`config`]: configuration structs and defaults
//! - [`types`]: shared data structures
//! - [`error`]: error types

pub mod assembler;
pub mod config;
pub mod delta;
pub mod error;
pub mod file_tracking;
pub mod format;
pub mod language;
pub mod path_key;
pub mod reader;
pub mod rebuild;
pub mod types;
pub mod utils;
pub mod writer;

pub use assembler::{assemble, Assembler, AssemblerBuilder, AssemblyOutput};
pub use config::{AssemblerConfig, RebuildConfig};
pub use delta::compute_delta;
pub use error::{AssemblerError, Result};
pub use file_tracking::FileTracker;
pub use path_key::PathKey;
pub use reader::{parse, parse_file};
pub use rebuild::{rebuild, Rebuilder};
pub use types::*;
pub use writer::SnapshotWriter;

/// Version written into every manifest
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
