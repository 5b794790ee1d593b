//! Integration tests for code-assembler
//!
//! Realistic assemble/delta/rebuild cycles over generated trees.

use ::code_assembler::*;
use filetime::{set_file_mtime, FileTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;
use walkdir::WalkDir;

const BASE_MTIME: i64 = 1_500_000_000;

/// Test harness owning a source tree, a scratch area and a generator
pub struct SnapshotHarness {
    pub source_dir: TempDir,
    pub work_dir: TempDir,
    pub file_generator: FileGenerator,
    pub operation_log: Vec<TestOperation>,
}

#[derive(Debug, Clone)]
pub enum TestOperation {
    CreateFile { path: String },
    ModifyFile { path: String },
    DeleteFile { path: String },
    Assemble { output: PathBuf, since: Option<PathBuf> },
    Rebuild { snapshot: PathBuf, root: PathBuf },
}

impl SnapshotHarness {
    pub fn new(seed: u64) -> Self {
        Self {
            source_dir: TempDir::new().unwrap(),
            work_dir: TempDir::new().unwrap(),
            file_generator: FileGenerator::new(seed),
            operation_log: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        self.source_dir.path()
    }

    pub fn work_path(&self, name: &str) -> PathBuf {
        self.work_dir.path().join(name)
    }

    /// Write `count` files spread over a few directories, all with the same mtime
    pub fn populate(&mut self, count: usize) {
        for i in 0..count {
            let path = format!("dir{}/file{}.{}", i % 4, i, self.file_generator.extension());
            self.write_file(&path, BASE_MTIME);
            self.operation_log.push(TestOperation::CreateFile { path });
        }
    }

    pub fn write_file(&mut self, relative: &str, mtime: i64) {
        let path = self.root().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, self.file_generator.content()).unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
    }

    /// Apply random edits; returns (modified, added, deleted)
    pub fn mutate(&mut self, edits: usize) -> (Vec<String>, Vec<String>, Vec<String>) {
        let mut modified = Vec::new();
        let mut added = Vec::new();
        let mut deleted = Vec::new();
        let mut existing: Vec<String> = tree_contents(self.root()).into_keys().collect();

        for n in 0..edits {
            match self.file_generator.rng.random_range(0..3) {
                0 if !existing.is_empty() => {
                    let index = self.file_generator.rng.random_range(0..existing.len());
                    let path = existing[index].clone();
                    if !modified.contains(&path) && !added.contains(&path) {
                        self.write_file(&path, BASE_MTIME + 100 + n as i64);
                        modified.push(path.clone());
                        self.operation_log.push(TestOperation::ModifyFile { path });
                    }
                }
                1 if !existing.is_empty() => {
                    let index = self.file_generator.rng.random_range(0..existing.len());
                    let path = existing.remove(index);
                    fs::remove_file(self.root().join(&path)).unwrap();
                    modified.retain(|p| p != &path);
                    if !added.contains(&path) {
                        deleted.push(path.clone());
                    }
                    added.retain(|p| p != &path);
                    self.operation_log.push(TestOperation::DeleteFile { path });
                }
                _ => {
                    let path = format!("new{}/added{}.txt", n % 2, n);
                    self.write_file(&path, BASE_MTIME + 500);
                    existing.push(path.clone());
                    added.push(path.clone());
                    self.operation_log.push(TestOperation::CreateFile { path });
                }
            }
        }
        (modified, added, deleted)
    }

    pub fn assemble(&mut self, output: &Path, since: Option<PathBuf>) -> AssemblyOutput {
        let assembler = AssemblerBuilder::new()
            .path(self.root())
            .extensions(vec!["txt".into(), "rs".into(), "md".into()])
            .output_file(output)
            .since(since.clone())
            .build()
            .unwrap();
        let output_doc = assembler.run().unwrap();
        assembler.write_output(&output_doc).unwrap();
        self.operation_log.push(TestOperation::Assemble {
            output: output.to_path_buf(),
            since,
        });
        output_doc
    }

    pub fn rebuild(&mut self, snapshot: &Path, root: &Path) -> Snapshot {
        let parsed = parse_file(snapshot).unwrap();
        let outcome = rebuild(&parsed, root, false).unwrap();
        let report = outcome.report.unwrap();
        assert!(report.failures.is_empty(), "write failures: {:?}", report.failures);
        self.operation_log.push(TestOperation::Rebuild {
            snapshot: snapshot.to_path_buf(),
            root: root.to_path_buf(),
        });
        parsed
    }
}

/// Seeded generator for file contents
pub struct FileGenerator {
    rng: StdRng,
}

impl FileGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn extension(&mut self) -> &'static str {
        ["txt", "rs", "md"][self.rng.random_range(0..3)]
    }

    /// Text that exercises fences, markers and odd whitespace
    pub fn content(&mut self) -> String {
        const FRAGMENTS: &[&str] = &[
            "fn main() {}",
            "```rust",
            "````",
            "~~~",
            "## `fake/header.rs`",
            "<!-- CODE_ASSEMBLER_MANIFEST",
            "-->",
            "... [TRUNCATED: 3 more lines omitted] ...",
            "    indented",
            "",
            "unicode: héllo wörld ✓",
            "trailing spaces   ",
        ];
        let lines = self.rng.random_range(0..20);
        let mut text = (0..lines)
            .map(|_| FRAGMENTS[self.rng.random_range(0..FRAGMENTS.len())])
            .collect::<Vec<_>>()
            .join("\n");
        if self.rng.random_bool(0.5) {
            text.push('\n');
        }
        text
    }
}

/// Every file under `root` as relative display path -> content
pub fn tree_contents(root: &Path) -> BTreeMap<String, String> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(root).unwrap();
            (
                relative.to_string_lossy().replace('\\', "/"),
                fs::read_to_string(e.path()).unwrap(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_snapshot_rebuilds_identical_tree() {
        let mut harness = SnapshotHarness::new(7);
        harness.populate(40);

        let snapshot_path = harness.work_path("full.md");
        let output = harness.assemble(&snapshot_path, None);
        assert_eq!(output.stats.total_files, 40);

        let restored = harness.work_path("restored");
        harness.rebuild(&snapshot_path, &restored);

        assert_eq!(tree_contents(&restored), tree_contents(harness.root()));
    }

    #[test]
    fn test_delta_applied_on_base_reproduces_current_tree() {
        for seed in [1, 2, 3] {
            let mut harness = SnapshotHarness::new(seed);
            harness.populate(25);

            let base = harness.work_path("base.md");
            harness.assemble(&base, None);
            let restored = harness.work_path("restored");
            harness.rebuild(&base, &restored);

            let (modified, added, deleted) = harness.mutate(15);
            info!(
                "seed {}: {} modified, {} added, {} deleted",
                seed,
                modified.len(),
                added.len(),
                deleted.len()
            );

            let delta_path = harness.work_path("delta.md");
            let output = harness.assemble(&delta_path, Some(base.clone()));
            let delta = output.delta.clone().unwrap();

            let mut expected_modified = modified.clone();
            expected_modified.sort();
            let mut got_modified = delta.modified.clone();
            got_modified.sort();
            assert_eq!(got_modified, expected_modified, "seed {}", seed);
            assert_eq!(delta.added.len(), added.len(), "seed {}", seed);
            assert_eq!(delta.deleted.len(), deleted.len(), "seed {}", seed);

            let parsed = harness.rebuild(&delta_path, &restored);
            for path in &parsed.deleted {
                fs::remove_file(restored.join(path)).unwrap();
            }

            assert_eq!(
                tree_contents(&restored),
                tree_contents(harness.root()),
                "seed {} ops {:?}",
                seed,
                harness.operation_log
            );
        }
    }

    #[test]
    fn test_snapshot_is_stable_across_runs() {
        let mut harness = SnapshotHarness::new(11);
        harness.populate(10);

        let first = harness.assemble(&harness.work_path("a.md"), None);
        let second = harness.assemble(&harness.work_path("b.md"), None);

        let a = parse(&first.document).unwrap();
        let b = parse(&second.document).unwrap();
        assert_eq!(a.records, b.records);
        assert_eq!(a.manifest.files, b.manifest.files);
    }

    #[test]
    fn test_truncated_files_flow_through_every_stage() {
        let source = TempDir::new().unwrap();
        let body: String = (0..50).map(|i| format!("line {}\n", i)).collect();
        fs::write(source.path().join("big.txt"), &body).unwrap();
        fs::write(source.path().join("small.txt"), "ok\n").unwrap();

        let output = AssemblerBuilder::new()
            .path(source.path())
            .extensions(vec!["txt".into()])
            .max_lines(Some(20))
            .truncation_limit_lines(10)
            .build()
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(output.stats.truncated_files, 1);
        assert!(output.document.contains("... [TRUNCATED: 40 more lines omitted] ..."));

        let snapshot = parse(&output.document).unwrap();
        let big = snapshot.get("big.txt").unwrap();
        assert!(big.truncated);
        assert_eq!(big.omitted_lines, 40);
        assert!(snapshot.manifest.get("big.txt").unwrap().truncated);

        let target = TempDir::new().unwrap();
        let outcome = rebuild(&snapshot, target.path(), true).unwrap();
        let partial: Vec<&str> = outcome.plan.partial().map(|e| e.path.as_str()).collect();
        assert_eq!(partial, vec!["big.txt"]);
        assert!(outcome.plan.warnings()[0].contains("40 line(s)"));
    }

    #[test]
    fn test_duplicate_basenames_survive_round_trip() {
        let source = TempDir::new().unwrap();
        for dir in ["api", "web", "worker"] {
            fs::create_dir_all(source.path().join(dir)).unwrap();
            fs::write(source.path().join(dir).join("config.py"), format!("NAME = '{}'\n", dir)).unwrap();
        }

        let output = AssemblerBuilder::new()
            .path(source.path())
            .extensions(vec!["py".into()])
            .build()
            .unwrap()
            .run()
            .unwrap();
        let snapshot = parse(&output.document).unwrap();
        assert_eq!(snapshot.len(), 3);

        let target = TempDir::new().unwrap();
        rebuild(&snapshot, target.path(), false).unwrap();
        assert_eq!(tree_contents(target.path()), tree_contents(source.path()));
    }
}
