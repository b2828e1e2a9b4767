// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_bare_array() {
    let content = r#"[{"id": "a", "title": "First"}, {"title": "Second", "completed": true}]"#;
    let tasks = parse(content).unwrap();
    assert_eq!(tasks[0].id, "a");
    assert_eq!(tasks[1].id, "2");
    assert!(tasks[1].completed);
}

#[test]
fn parses_wrapped_object() {
    let content = r#"{"tasks": [{"id": 7, "title": "T"}]}"#;
    let tasks = parse(content).unwrap();
    assert_eq!(tasks[0].id, "7");
}

#[yare::parameterized(
    snake = { r#"[{"title": "T", "parallel_group": 2}]"# },
    camel = { r#"[{"title": "T", "parallelGroup": 2}]"# },
)]
fn group_key_aliases(content: &str) {
    let tasks = parse(content).unwrap();
    assert_eq!(tasks[0].parallel_group, Some(2));
}

#[yare::parameterized(
    description = { r#"[{"title": "T", "description": "d"}]"# },
    body = { r#"[{"title": "T", "body": "d"}]"# },
)]
fn description_key_aliases(content: &str) {
    let tasks = parse(content).unwrap();
    assert_eq!(tasks[0].body.as_deref(), Some("d"));
}

#[test]
fn round_trip_preserves_tasks() {
    let tasks = ralphy_core::test_support::sample_tasks();
    let written = write(&tasks).unwrap();
    let back = parse(&written).unwrap();
    assert_eq!(back, tasks);
}

#[test]
fn malformed_json_is_error() {
    assert!(parse("{not json").is_err());
}
