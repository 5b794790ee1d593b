//! Property-based testing for code-assembler
//!
//! Uses proptest to check the format, normalization, delta and rebuild
//! invariants across randomly generated inputs.

use ::code_assembler::*;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use walkdir::WalkDir;

/// Lowercase relative paths, unique by construction when collected into a map
fn path_strategy() -> impl Strategy<Value = String> {
    (
        prop::collection::vec("[a-z][a-z0-9_]{0,7}", 0..=3),
        "[a-z][a-z0-9_-]{0,7}\\.(py|rs|md|txt|toml)",
    )
        .prop_map(|(dirs, file)| {
            let mut path = dirs.join("/");
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(&file);
            path
        })
}

/// Text with a high density of characters that matter to the format
fn content_strategy() -> impl Strategy<Value = String> {
    let line = prop_oneof![
        "[ -~]{0,40}",
        "`{1,12}[a-z]{0,6}",
        "~{3,6}",
        Just("## `evil.rs`".to_string()),
        Just("<!-- CODE_ASSEMBLER_MANIFEST".to_string()),
        Just("-->".to_string()),
        Just("... [TRUNCATED: 9 more lines omitted] ...".to_string()),
        "[\t ]{0,4}",
        "[a-zà-ÿα-ωж-я✓€😀 ]{1,24}",
        "[a-z`~ ]{0,8}\r",
        "\r[ -~]{0,8}",
        Just("\u{feff}bom".to_string()),
    ];
    (prop::collection::vec(line, 0..12), any::<bool>()).prop_map(|(lines, newline)| {
        let mut text = lines.join("\n");
        if newline {
            text.push('\n');
        }
        text
    })
}

fn mtime_strategy() -> impl Strategy<Value = f64> {
    0.0f64..2_000_000_000.0
}

fn records_strategy() -> impl Strategy<Value = Vec<FileRecord>> {
    prop::collection::btree_map(path_strategy(), (content_strategy(), mtime_strategy()), 0..8)
        .prop_map(|files| {
            files
                .into_iter()
                .map(|(path, (content, mtime))| FileRecord::new(path, content, mtime))
                .collect()
        })
}

/// Path segments an adversarial document might use
fn hostile_path_strategy() -> impl Strategy<Value = String> {
    let segment = prop_oneof![
        Just("..".to_string()),
        Just(".".to_string()),
        Just("".to_string()),
        Just("C:".to_string()),
        "[a-z]{1,6}",
    ];
    let separator = prop_oneof![Just("/"), Just("\\")];
    (
        prop::collection::vec((segment, separator), 1..6),
        prop::option::of(prop_oneof![Just("/"), Just("\\")]),
    )
        .prop_map(|(parts, prefix)| {
            let mut path = prefix.unwrap_or("").to_string();
            for (i, (segment, separator)) in parts.iter().enumerate() {
                if i > 0 {
                    path.push_str(separator);
                }
                path.push_str(segment);
            }
            path
        })
}

fn snapshot_of(paths: &[String]) -> Snapshot {
    Snapshot {
        records: paths
            .iter()
            .enumerate()
            .map(|(i, p)| FileRecord::new(p, format!("payload {}", i), 1.0))
            .collect(),
        manifest: Manifest::new(),
        deleted: Vec::new(),
        warnings: Vec::new(),
    }
}

fn files_under(dir: &Path) -> BTreeSet<std::path::PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_type().is_dir())
        .map(|e| e.path().to_path_buf())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_round_trip(records in records_strategy(), header in any::<bool>()) {
        let document = SnapshotWriter::new().with_header(header).write(&records).unwrap();
        let snapshot = parse(&document).unwrap();
        prop_assert_eq!(&snapshot.records, &records);
        prop_assert!(snapshot.warnings.is_empty());
        prop_assert!(snapshot.deleted.is_empty());
    }

    #[test]
    fn prop_fence_closure(content in content_strategy()) {
        let fence = format::fence_for(&content);
        prop_assert!(fence.len() >= 3);
        prop_assert!(content.lines().all(|line| line.trim() != fence));

        let record = FileRecord::new("x.md", content.clone(), 0.0);
        let snapshot = parse(&assemble(&[record], None).unwrap()).unwrap();
        prop_assert_eq!(snapshot.len(), 1);
        prop_assert_eq!(&snapshot.records[0].content, &content);
    }

    #[test]
    fn prop_normalization_equivalence(path in path_strategy(), upper in any::<bool>()) {
        let key = PathKey::new(&path);
        prop_assert_eq!(PathKey::new(key.as_str()), key.clone());
        prop_assert_eq!(PathKey::new(&format!("./{}", path)), key.clone());
        prop_assert_eq!(PathKey::new(&path.replace('/', "\\")), key.clone());
        prop_assert_eq!(PathKey::new(&path.replace('/', "//")), key.clone());
        if upper {
            prop_assert_eq!(PathKey::new(&path.to_uppercase()), key.clone());
        }
        prop_assert_eq!(PathKey::display(&PathKey::display(&path)), PathKey::display(&path));
    }

    #[test]
    fn prop_delta_completeness(
        old in prop::collection::btree_map(path_strategy(), 0i64..5, 0..12),
        new in prop::collection::btree_map(path_strategy(), 0i64..5, 0..12),
    ) {
        let mut manifest = Manifest::new();
        for (path, mtime) in &old {
            manifest.files.push(ManifestEntry::for_record(&FileRecord::new(path, "", *mtime as f64)));
        }
        let current: Vec<FileRecord> = new
            .iter()
            .map(|(path, mtime)| FileRecord::new(path, "", *mtime as f64))
            .collect();

        let delta = compute_delta(&manifest, &current).unwrap();

        let added: HashSet<&String> = delta.added.iter().collect();
        let modified: HashSet<&String> = delta.modified.iter().collect();
        let deleted: HashSet<&String> = delta.deleted.iter().collect();
        prop_assert!(added.is_disjoint(&modified));
        prop_assert!(added.is_disjoint(&deleted));
        prop_assert!(modified.is_disjoint(&deleted));
        prop_assert_eq!(delta.added.len() + delta.modified.len() + delta.unchanged, new.len());

        for (path, mtime) in &new {
            match old.get(path) {
                None => prop_assert!(added.contains(path)),
                Some(previous) if previous != mtime => prop_assert!(modified.contains(path)),
                Some(_) => prop_assert!(!added.contains(path) && !modified.contains(path)),
            }
        }
        let expected_deleted: BTreeSet<&String> = old.keys().filter(|p| !new.contains_key(*p)).collect();
        prop_assert_eq!(deleted.into_iter().collect::<BTreeSet<_>>(), expected_deleted);
    }

    #[test]
    fn prop_duplicate_basenames(dirs in prop::collection::btree_set("[a-z]{1,6}", 2..5)) {
        let records: Vec<FileRecord> = dirs
            .iter()
            .map(|dir| FileRecord::new(format!("{}/config.py", dir), dir.clone(), 1.0))
            .collect();

        let snapshot = parse(&assemble(&records, None).unwrap()).unwrap();
        prop_assert_eq!(snapshot.len(), dirs.len());

        let mut manifest = snapshot.manifest.clone();
        let dropped = format!("{}/", dirs.iter().next().unwrap());
        manifest.files.retain(|e| !e.path.starts_with(&dropped));
        let delta = compute_delta(&manifest, &records).unwrap();
        prop_assert_eq!(delta.added.len(), 1);
        prop_assert_eq!(delta.unchanged, dirs.len() - 1);
    }

    #[test]
    fn prop_truncation_propagates(omitted in 1usize..10_000, content in content_strategy()) {
        let record = FileRecord::new("big.log", content.clone(), 5.0).with_truncation(omitted);
        let snapshot = parse(&assemble(&[record], None).unwrap()).unwrap();

        let parsed = &snapshot.records[0];
        prop_assert!(parsed.truncated);
        prop_assert_eq!(parsed.omitted_lines, omitted);
        prop_assert_eq!(&parsed.content, &content);
        prop_assert!(snapshot.manifest.files[0].truncated);

        let target = TempDir::new().unwrap();
        let plan = Rebuilder::new(target.path()).plan(&snapshot).unwrap();
        prop_assert!(plan.entries[0].truncated);
        prop_assert!(plan.entries[0].warning().is_some());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_traversal_safety(paths in prop::collection::vec(hostile_path_strategy(), 1..8)) {
        let scratch = TempDir::new().unwrap();
        let root = scratch.path().join("root");
        fs::create_dir(&root).unwrap();

        let outcome = rebuild(&snapshot_of(&paths), &root, false).unwrap();
        let canonical_root = root.canonicalize().unwrap();
        for entry in outcome.plan.entries.iter().filter(|e| e.is_write()) {
            prop_assert!(entry.target.starts_with(&root), "{:?} escapes", entry.target);
            prop_assert!(!entry.target.components().any(|c| c == std::path::Component::ParentDir));
        }

        for file in files_under(scratch.path()) {
            let canonical = file.canonicalize().unwrap_or(file.clone());
            prop_assert!(canonical.starts_with(&canonical_root), "{:?} written outside root", file);
        }
    }

    #[test]
    fn prop_dry_run_equivalence(
        paths in prop::collection::vec(prop_oneof![path_strategy(), hostile_path_strategy()], 1..8),
        existing in prop::collection::vec(path_strategy(), 0..3),
    ) {
        let scratch = TempDir::new().unwrap();
        let root = scratch.path().join("root");
        for path in &existing {
            let target = root.join(path);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(&target, "old").unwrap();
        }
        let snapshot = snapshot_of(&paths);
        let before: BTreeMap<_, _> = files_under(scratch.path())
            .into_iter()
            .map(|p| { let content = fs::read(&p).unwrap(); (p, content) })
            .collect();

        let dry = rebuild(&snapshot, &root, true).unwrap();
        let after: BTreeMap<_, _> = files_under(scratch.path())
            .into_iter()
            .map(|p| { let content = fs::read(&p).unwrap(); (p, content) })
            .collect();
        prop_assert_eq!(&before, &after);
        prop_assert_eq!(root.exists(), !existing.is_empty());

        let real = rebuild(&snapshot, &root, false).unwrap();
        prop_assert_eq!(dry.plan, real.plan);
    }
}
