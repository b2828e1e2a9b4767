// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task lifecycle state machine types.
//!
//! The durable store lives in ralphy-storage; this module defines the
//! states, the entry record, and the legal transitions.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task in the durable store.
///
/// Exactly one state at all times. `Running` is never observed after a
/// restart: recovery downgrades it to `Pending` on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Deferred,
    Skipped,
}

impl TaskState {
    /// States that `reset` may return to `Pending`.
    pub fn is_resettable(self) -> bool {
        matches!(self, TaskState::Failed | TaskState::Skipped)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Skipped)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskState::Pending),
            "running" => Some(TaskState::Running),
            "completed" => Some(TaskState::Completed),
            "failed" => Some(TaskState::Failed),
            "deferred" => Some(TaskState::Deferred),
            "skipped" => Some(TaskState::Skipped),
            _ => None,
        }
    }
}

crate::simple_display! {
    TaskState {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Deferred => "deferred",
        Skipped => "skipped",
    }
}

/// Where a claimed task executes (recorded for operators, not enforced).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<String>,
}

impl ExecutionContext {
    pub fn is_empty(&self) -> bool {
        self.branch.is_none() && self.worktree.is_none() && self.sandbox.is_none()
    }
}

/// Durable record of one task's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStateEntry {
    pub id: String,
    pub title: String,
    pub state: TaskState,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_history: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_context: Option<ExecutionContext>,
}

impl TaskStateEntry {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            state: TaskState::Pending,
            attempt_count: 0,
            last_attempt_ms: None,
            error_history: Vec::new(),
            execution_context: None,
        }
    }

    /// Crash recovery: anything found running when the store loads was
    /// interrupted mid-flight.
    pub fn recover_interrupted(&mut self) {
        if self.state == TaskState::Running {
            self.state = TaskState::Pending;
            self.attempt_count = 0;
        }
    }
}

/// Store key for an entry: `<sourceType>:<sourcePath>:<id>`.
pub fn state_key(source_type: &str, source_path: &str, id: &str) -> String {
    format!("{}:{}:{}", source_type, source_path, id)
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
