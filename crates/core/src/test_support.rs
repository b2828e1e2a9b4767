// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for other crates' tests.

use crate::task::Task;

/// A small fixed task list covering the optional fields.
pub fn sample_tasks() -> Vec<Task> {
    vec![
        Task::new("1", "Add login"),
        Task {
            id: "2".to_string(),
            title: "Fix, bug".to_string(),
            body: Some("Use OAuth".to_string()),
            parallel_group: Some(1),
            completed: false,
        },
        Task { completed: true, ..Task::new("3", "Write docs") },
    ]
}
