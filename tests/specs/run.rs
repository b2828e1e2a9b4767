// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::support;
use tempfile::TempDir;

#[test]
fn run_completes_markdown_tasks() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("tasks.md"), "- [ ] Add login\n- [ ] Fix bug\n").unwrap();
    let engine = support::planning_engine(dir.path());

    let assert = support::ralphy()
        .current_dir(dir.path())
        .args(["run", "--tasks", "tasks.md", "--engine"])
        .arg(&engine)
        .assert()
        .success();
    assert!(support::stdout_of(&assert).contains("completed 2"));

    let tasks_md = std::fs::read_to_string(dir.path().join("tasks.md")).unwrap();
    similar_asserts::assert_eq!(tasks_md, "- [x] Add login\n- [x] Fix bug\n");

    // Durable state landed beside the source
    let state = std::fs::read_to_string(dir.path().join(".ralphy/task-state.md")).unwrap();
    assert!(state.contains("completed"));
}

#[test]
fn run_is_idempotent_once_tasks_are_done() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("tasks.md"), "- [x] Already done\n").unwrap();
    let engine = support::planning_engine(dir.path());

    let assert = support::ralphy()
        .current_dir(dir.path())
        .args(["run", "--tasks", "tasks.md", "--engine"])
        .arg(&engine)
        .assert()
        .success();
    assert!(support::stdout_of(&assert).contains("completed 0"));
}

#[test]
fn run_exits_one_on_authentication_failure() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("tasks.md"), "- [ ] Any task\n").unwrap();
    let engine = support::fake_engine(
        dir.path(),
        &[r#"{"type":"error","message":"Not authenticated, please run /login"}"#],
        0,
    );

    let assert = support::ralphy()
        .current_dir(dir.path())
        .args(["run", "--tasks", "tasks.md", "--engine"])
        .arg(&engine)
        .assert()
        .code(1);
    assert!(support::stderr_of(&assert).contains("fatal"));
}

#[test]
fn run_marks_tasks_failed_when_engine_keeps_crashing() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("tasks.md"), "- [ ] Doomed\n").unwrap();
    let engine = support::fake_engine(dir.path(), &[], 42);

    let assert = support::ralphy()
        .current_dir(dir.path())
        .args(["run", "--tasks", "tasks.md", "--max-attempts", "2", "--engine"])
        .arg(&engine)
        .assert()
        .code(2);
    assert!(support::stdout_of(&assert).contains("failed 1"));

    let state = std::fs::read_to_string(dir.path().join(".ralphy/task-state.md")).unwrap();
    assert!(state.contains("failed"));
    // The source checklist is untouched
    let tasks_md = std::fs::read_to_string(dir.path().join("tasks.md")).unwrap();
    assert!(tasks_md.contains("- [ ] Doomed"));
}

#[test]
fn file_queue_snapshot_lands_on_disk() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("tasks.md"), "- [ ] Queued work\n").unwrap();
    let engine = support::planning_engine(dir.path());

    support::ralphy()
        .current_dir(dir.path())
        .args(["run", "--tasks", "tasks.md", "--queue", "file", "--engine"])
        .arg(&engine)
        .assert()
        .success();

    let snapshot = std::fs::read_to_string(dir.path().join(".ralphy/queue.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&snapshot).unwrap();
    assert_eq!(parsed["items"][0]["partition"], "completed");
}

#[test]
fn dry_run_leaves_everything_untouched() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("tasks.md"), "- [ ] Plan only\n").unwrap();
    let engine = support::planning_engine(dir.path());

    support::ralphy()
        .current_dir(dir.path())
        .args(["run", "--tasks", "tasks.md", "--dry-run", "--engine"])
        .arg(&engine)
        .assert()
        .success();

    let tasks_md = std::fs::read_to_string(dir.path().join("tasks.md")).unwrap();
    assert_eq!(tasks_md, "- [ ] Plan only\n");
}
