// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_minimal_list() {
    let content = "tasks:\n  - title: First\n  - title: Second\n    completed: true\n";
    let tasks = parse(content).unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].id, "1");
    assert_eq!(tasks[0].title, "First");
    assert!(!tasks[0].completed);
    assert_eq!(tasks[1].id, "2");
    assert!(tasks[1].completed);
}

#[test]
fn explicit_fields_carry_through() {
    let content = "tasks:\n  - title: T\n    parallel_group: 3\n    description: notes here\n";
    let tasks = parse(content).unwrap();
    assert_eq!(tasks[0].parallel_group, Some(3));
    assert_eq!(tasks[0].body.as_deref(), Some("notes here"));
}

#[test]
fn numeric_ids_become_strings() {
    let content = "tasks:\n  - id: 42\n    title: T\n";
    let tasks = parse(content).unwrap();
    assert_eq!(tasks[0].id, "42");
}

#[test]
fn round_trip_preserves_tasks() {
    let tasks = ralphy_core::test_support::sample_tasks();
    let written = write(&tasks).unwrap();
    let back = parse(&written).unwrap();
    assert_eq!(back, tasks);
}

#[test]
fn empty_content_is_empty_list() {
    assert!(parse("").unwrap().is_empty());
    assert!(parse("\n").unwrap().is_empty());
}

#[test]
fn malformed_yaml_is_error() {
    assert!(parse("tasks: [title: {{").is_err());
}
