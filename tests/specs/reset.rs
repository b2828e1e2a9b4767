// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::support;
use tempfile::TempDir;

#[test]
fn reset_returns_failed_task_to_pending() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("tasks.md"), "- [ ] Doomed\n").unwrap();
    let crashing = support::fake_engine(dir.path(), &[], 42);

    support::ralphy()
        .current_dir(dir.path())
        .args(["run", "--tasks", "tasks.md", "--max-attempts", "1", "--engine"])
        .arg(&crashing)
        .assert()
        .code(2);

    support::ralphy()
        .current_dir(dir.path())
        .args(["reset", "--tasks", "tasks.md", "1"])
        .assert()
        .success();

    let assert = support::ralphy()
        .current_dir(dir.path())
        .args(["status", "--tasks", "tasks.md"])
        .assert()
        .success();
    assert!(support::stdout_of(&assert).contains("pending: 1"));
}

#[test]
fn reset_refuses_a_pending_task() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("tasks.md"), "- [ ] Fresh\n").unwrap();

    support::ralphy()
        .current_dir(dir.path())
        .args(["reset", "--tasks", "tasks.md", "1"])
        .assert()
        .failure();
}
