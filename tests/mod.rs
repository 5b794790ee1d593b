//! Main test module for code-assembler
//!
//! This module includes all test suites:
//! - Integration tests for assemble/delta/rebuild cycles
//! - Chaos tests for damaged and adversarial documents
//! - Property-based tests for format and delta invariants

pub mod chaos;
pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::code_assembler::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();

        let output = AssemblerBuilder::new()
            .path(temp_dir.path())
            .extensions(vec!["py".to_string()])
            .build()
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(output.stats.total_files, 0);

        let snapshot = parse(&output.document).unwrap();
        assert!(snapshot.is_empty());
        assert!(snapshot.manifest.files.is_empty());
    }

    #[test]
    fn test_special_filenames() {
        let temp_dir = TempDir::new().unwrap();
        let target_dir = TempDir::new().unwrap();

        let special_names = vec![
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file_with_underscores.txt",
            "file.multiple.dots.txt",
            "ünïcödé.txt",
            "emoji_😀.txt",
            "back`tick.txt",
        ];
        for name in &special_names {
            fs::write(temp_dir.path().join(name), format!("content of {}", name)).unwrap();
        }

        let output = AssemblerBuilder::new()
            .path(temp_dir.path())
            .extensions(vec!["txt".to_string()])
            .build()
            .unwrap()
            .run()
            .unwrap();
        let snapshot = parse(&output.document).unwrap();
        assert_eq!(snapshot.len(), special_names.len());

        rebuild(&snapshot, target_dir.path(), false).unwrap();
        for name in &special_names {
            let restored = fs::read_to_string(target_dir.path().join(name)).unwrap();
            assert_eq!(restored, format!("content of {}", name));
        }
    }

    #[test]
    fn test_content_that_looks_like_document_structure() {
        let content = "## `not/a/header.rs`\n\
                       ```\n\
                       ~~~\n\
                       <!-- CODE_ASSEMBLER_MANIFEST\n\
                       {\"files\": []}\n\
                       -->\n\
                       ``````\n";
        let records = vec![
            FileRecord::new("tricky.md", content, 1.0),
            FileRecord::new("after.rs", "fn after() {}", 2.0),
        ];

        let snapshot = parse(&assemble(&records, None).unwrap()).unwrap();
        assert_eq!(snapshot.records, records);
        assert!(snapshot.warnings.is_empty());
    }

    #[test]
    fn test_crlf_document() {
        let records = vec![
            FileRecord::new("a.py", "x = 1\ny = 2", 10.0),
            FileRecord::new("b.py", "z = 3", 20.0),
        ];
        let document = assemble(&records, None).unwrap().replace('\n', "\r\n");

        let snapshot = parse(&document).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.records[1].content, "z = 3");
        assert_eq!(snapshot.records[1].mtime, 20.0);
    }

    #[test]
    fn test_case_colliding_files_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("Config.py"), "a").unwrap();
        fs::write(temp_dir.path().join("config.py"), "b").unwrap();
        if fs::read_dir(temp_dir.path()).unwrap().count() < 2 {
            // Case-insensitive filesystem: only one file exists
            return;
        }

        let err = AssemblerBuilder::new()
            .path(temp_dir.path())
            .extensions(vec!["py".to_string()])
            .build()
            .unwrap()
            .run()
            .unwrap_err();
        match err {
            AssemblerError::DuplicateKey { first, second, .. } => {
                assert_eq!(first, "Config.py");
                assert_eq!(second, "config.py");
            }
            other => panic!("expected DuplicateKey, got {:?}", other),
        }
    }

    #[test]
    fn test_deleted_file_from_legacy_snapshot() {
        let document = "## `kept.py`\n\
                        \n\
                        ```python\n\
                        print('kept')\n\
                        ```\n\
                        \n\
                        <!-- CODE_ASSEMBLER_METADATA\n\
                        {\"version\": \"4.4.0\", \"generated_at\": \"2024-01-01 10:00:00\", \
                        \"files\": {\"kept.py\": \"2024-01-01 09:59\", \"lost.py\": \"2024-01-01 09:58\"}}\n\
                        -->\n";

        let snapshot = parse(document).unwrap();
        assert_eq!(snapshot.manifest.origin, ManifestOrigin::Legacy);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.deleted, vec!["lost.py"]);
        assert!(!snapshot.warnings.is_empty());
    }
}
