// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

#[yare::parameterized(
    csv = { "tasks.csv", SourceFormat::Csv },
    yaml = { "tasks.yaml", SourceFormat::Yaml },
    yml = { "tasks.yml", SourceFormat::Yaml },
    json = { "tasks.json", SourceFormat::Json },
    md = { "TODO.md", SourceFormat::Markdown },
    upper = { "TASKS.MD", SourceFormat::Markdown },
)]
fn detects_format(name: &str, expected: SourceFormat) {
    assert_eq!(SourceFormat::from_path(Path::new(name)).unwrap(), expected);
}

#[test]
fn unknown_extension_is_error() {
    assert!(SourceFormat::from_path(Path::new("tasks.txt")).is_err());
    assert!(SourceFormat::from_path(Path::new("tasks")).is_err());
}

#[test]
fn markdown_progression() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tasks.md");
    std::fs::write(&path, "- [ ] A\n- [ ] B").unwrap();

    let source = TaskSource::open(&path).unwrap();
    source.mark_complete("1").unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "- [x] A\n- [ ] B");
    assert_eq!(source.count_remaining().unwrap(), 1);
    assert_eq!(source.count_completed().unwrap(), 1);
}

#[test]
fn csv_mark_complete_rewrites_row() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tasks.csv");
    std::fs::write(&path, "id,title,done,group,desc\n1,Add login,0,1,\"Use OAuth\"\n").unwrap();

    let source = TaskSource::open(&path).unwrap();
    source.mark_complete("1").unwrap();

    let tasks = source.load().unwrap();
    assert!(tasks[0].completed);
    assert_eq!(tasks[0].body.as_deref(), Some("Use OAuth"));
}

#[test]
fn mark_complete_unknown_id_is_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tasks.json");
    std::fs::write(&path, r#"[{"id": "1", "title": "T"}]"#).unwrap();

    let source = TaskSource::open(&path).unwrap();
    assert!(source.mark_complete("nope").is_err());
}

#[test]
fn load_save_round_trip_all_formats() {
    let dir = TempDir::new().unwrap();
    let tasks = ralphy_core::test_support::sample_tasks();

    for name in ["t.csv", "t.yaml", "t.json"] {
        let path = dir.path().join(name);
        let format = SourceFormat::from_path(&path).unwrap();
        std::fs::write(&path, format.write(&tasks).unwrap()).unwrap();
        let source = TaskSource::open(&path).unwrap();
        assert_eq!(source.load().unwrap(), tasks, "format {name}");
    }
}
