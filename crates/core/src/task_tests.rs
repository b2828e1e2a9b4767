// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_defaults_optional_fields() {
    let task = Task::new("7", "Add login");
    assert_eq!(task.id, "7");
    assert_eq!(task.title, "Add login");
    assert!(task.body.is_none());
    assert!(task.parallel_group.is_none());
    assert!(!task.completed);
}

#[test]
fn serde_skips_absent_options() {
    let task = Task::new("1", "A");
    let json = serde_json::to_string(&task).unwrap();
    assert!(!json.contains("body"));
    assert!(!json.contains("parallel_group"));
}

#[test]
fn serde_round_trip() {
    let task = Task::builder()
        .id("t-9")
        .title("Fix bug")
        .body("details")
        .parallel_group(2u32)
        .completed(true)
        .build();
    let json = serde_json::to_string(&task).unwrap();
    let back: Task = serde_json::from_str(&json).unwrap();
    assert_eq!(back, task);
}
