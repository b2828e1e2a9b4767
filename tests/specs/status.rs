// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::support;
use tempfile::TempDir;

#[test]
fn status_reports_lifecycle_counts() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("tasks.md"), "- [ ] One\n- [ ] Two\n").unwrap();
    let engine = support::planning_engine(dir.path());

    support::ralphy()
        .current_dir(dir.path())
        .args(["run", "--tasks", "tasks.md", "--engine"])
        .arg(&engine)
        .assert()
        .success();

    let assert = support::ralphy()
        .current_dir(dir.path())
        .args(["status", "--tasks", "tasks.md"])
        .assert()
        .success();
    let out = support::stdout_of(&assert);
    assert!(out.contains("tasks: 2 total"));
    assert!(out.contains("completed: 2"));
}

#[test]
fn status_works_before_any_run() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("tasks.md"), "- [ ] Untouched\n").unwrap();

    let assert = support::ralphy()
        .current_dir(dir.path())
        .args(["status", "--tasks", "tasks.md"])
        .assert()
        .success();
    let out = support::stdout_of(&assert);
    assert!(out.contains("pending: 1"));
}

#[test]
fn status_rejects_unknown_source_format() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("tasks.txt"), "whatever").unwrap();

    support::ralphy()
        .current_dir(dir.path())
        .args(["status", "--tasks", "tasks.txt"])
        .assert()
        .failure();
}
