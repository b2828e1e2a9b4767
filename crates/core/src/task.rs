// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The task model shared by sources, queue, and state manager.

use serde::{Deserialize, Serialize};

/// A unit of work from a task source file.
///
/// Identity is `id`, which is opaque to the orchestrator: sources assign it
/// from an explicit column, a 1-based index, or a line number depending on
/// the file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    /// Free-form description carried into the planning prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Tasks sharing a group may run concurrently; ungrouped tasks are serial.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_group: Option<u32>,
    #[serde(default)]
    pub completed: bool,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: None,
            parallel_group: None,
            completed: false,
        }
    }
}

crate::builder! {
    pub struct TaskBuilder => Task {
        into {
            id: String = "1",
            title: String = "test task",
        }
        set {
            completed: bool = false,
        }
        option {
            body: String = None,
            parallel_group: u32 = None,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
