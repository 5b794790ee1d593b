//! Chaos testing for code-assembler
//!
//! Damages valid documents in seeded random ways and feeds hostile
//! documents to the reader and rebuilder. Parsing must either succeed or
//! report a malformed snapshot, and no rebuild may write outside its root.

use ::code_assembler::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Seeded source of document corruption
pub struct ChaosEngine {
    rng: StdRng,
}

/// One way of damaging a document
#[derive(Debug, Clone, Copy)]
pub enum Corruption {
    DropLine,
    DuplicateLine,
    InsertFence,
    InsertHeader,
    InsertTrailer,
    CutDocument,
    ConvertToCrlf,
    MangleJson,
}

const CORRUPTIONS: &[Corruption] = &[
    Corruption::DropLine,
    Corruption::DuplicateLine,
    Corruption::InsertFence,
    Corruption::InsertHeader,
    Corruption::InsertTrailer,
    Corruption::CutDocument,
    Corruption::ConvertToCrlf,
    Corruption::MangleJson,
];

impl ChaosEngine {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn pick(&mut self) -> Corruption {
        CORRUPTIONS[self.rng.random_range(0..CORRUPTIONS.len())]
    }

    /// Apply `corruption` to `document`
    pub fn corrupt(&mut self, document: &str, corruption: Corruption) -> String {
        let mut lines: Vec<String> = document.split('\n').map(str::to_string).collect();
        let at = self.rng.random_range(0..lines.len().max(1));
        match corruption {
            Corruption::DropLine => {
                if !lines.is_empty() {
                    lines.remove(at);
                }
            }
            Corruption::DuplicateLine => {
                if let Some(line) = lines.get(at).cloned() {
                    lines.insert(at, line);
                }
            }
            Corruption::InsertFence => {
                let fence = if self.rng.random_bool(0.5) { "```" } else { "~~~~" };
                lines.insert(at, fence.to_string());
            }
            Corruption::InsertHeader => {
                lines.insert(at, "## `../../escape.txt`".to_string());
            }
            Corruption::InsertTrailer => {
                lines.insert(at, "<!-- CODE_ASSEMBLER_MANIFEST".to_string());
            }
            Corruption::CutDocument => {
                let mut cut = self.rng.random_range(0..=document.len());
                while !document.is_char_boundary(cut) {
                    cut -= 1;
                }
                return document[..cut].to_string();
            }
            Corruption::ConvertToCrlf => return document.replace('\n', "\r\n"),
            Corruption::MangleJson => {
                return document.replacen("\"mtime\"", "\"mtime\" ]", 1);
            }
        }
        lines.join("\n")
    }
}

/// A small valid document to damage
fn sample_document() -> String {
    let records = vec![
        FileRecord::new("README.md", "# Sample\n\n```sh\ncargo run\n```\n", 1_700_000_000.0),
        FileRecord::new("src/main.rs", "fn main() {\n    println!(\"hi\");\n}\n", 1_700_000_001.5),
        FileRecord::new("src/lib.rs", "pub mod a;\n", 1_700_000_002.25).with_truncation(100),
        FileRecord::new("docs/notes.txt", "~~~\nnot a fence for backticks\n~~~", 1_700_000_003.0),
    ];
    SnapshotWriter::new().write(&records).unwrap()
}

/// Assert every file under `scratch` lies inside `root`
fn assert_contained(scratch: &Path, root: &Path) {
    let root = root.canonicalize().unwrap();
    for entry in WalkDir::new(scratch).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            let path = entry.path().canonicalize().unwrap();
            assert!(path.starts_with(&root), "{:?} written outside {:?}", path, root);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_corrupted_documents_never_panic_or_escape() {
        let original = sample_document();
        let mut malformed = 0;

        for seed in 0..300u64 {
            let mut engine = ChaosEngine::new(seed);
            let mut document = original.clone();
            let rounds = engine.rng.random_range(1..4);
            let mut applied = Vec::new();
            for _ in 0..rounds {
                let corruption = engine.pick();
                applied.push(corruption);
                document = engine.corrupt(&document, corruption);
            }

            match parse(&document) {
                Ok(snapshot) => {
                    let scratch = TempDir::new().unwrap();
                    let root = scratch.path().join("root");
                    let outcome = rebuild(&snapshot, &root, false).unwrap();
                    if outcome.plan.violations().count() > 0 {
                        info!("seed {} {:?}: {} violation(s)", seed, applied, outcome.plan.violations().count());
                    }
                    if root.exists() {
                        assert_contained(scratch.path(), &root);
                    }
                }
                Err(e) => {
                    assert!(e.is_corruption(), "seed {} {:?}: unexpected error {:?}", seed, applied, e);
                    malformed += 1;
                }
            }
        }

        warn!("{} of 300 damaged documents were rejected as malformed", malformed);
        assert!(malformed > 0, "some corruption should be detected");
    }

    #[test]
    fn test_hostile_paths_are_skipped() {
        let document = "## `../outside.txt`\n```\nx\n```\n\
                        ## `/etc/hostile`\n```\nx\n```\n\
                        ## `C:\\Windows\\evil.dll`\n```\nx\n```\n\
                        ## `..\\..\\up.txt`\n```\nx\n```\n\
                        ## `safe/../inside.txt`\n```\nok\n```\n";
        let snapshot = parse(document).unwrap();
        assert_eq!(snapshot.len(), 5);

        let scratch = TempDir::new().unwrap();
        let root = scratch.path().join("root");
        let outcome = rebuild(&snapshot, &root, false).unwrap();

        assert_eq!(outcome.plan.violations().count(), 4);
        assert_eq!(outcome.report.unwrap().files_written, 1);
        assert_eq!(fs::read_to_string(root.join("inside.txt")).unwrap(), "ok");
        assert_contained(scratch.path(), &root);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_inside_root_cannot_redirect_writes() {
        let scratch = TempDir::new().unwrap();
        let root = scratch.path().join("root");
        let outside = scratch.path().join("outside");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        let snapshot = parse("## `link/planted.txt`\n```\npayload\n```\n").unwrap();
        let outcome = rebuild(&snapshot, &root, false).unwrap();

        assert_eq!(outcome.plan.violations().count(), 1);
        assert!(!outside.join("planted.txt").exists());
    }

    #[test]
    fn test_manifest_lies_about_bodies() {
        let mut document = SnapshotWriter::new()
            .with_header(false)
            .write(&[FileRecord::new("a.py", "a", 1.0), FileRecord::new("b.py", "b", 2.0)])
            .unwrap();
        // Remove b.py's body but keep its manifest entry
        let start = document.find("## `b.py`").unwrap();
        let end = document.find("<!--").unwrap();
        document.replace_range(start..end, "");

        let snapshot = parse(&document).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.deleted, vec!["b.py"]);
        assert!(snapshot.warnings.iter().any(|w| w.contains("b.py")));
    }

    #[test]
    fn test_second_manifest_is_malformed() {
        let document = sample_document();
        let doubled = format!("{}{}", document, &document[document.find("<!--").unwrap()..]);
        assert!(parse(&doubled).unwrap_err().is_corruption());
    }
}
