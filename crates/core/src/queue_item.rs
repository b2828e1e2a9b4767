// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue item model: priorities, partitions, and ordering scores.

use crate::task::Task;
use serde::{Deserialize, Serialize};

/// Scheduling priority for a queued task. Lower rank dequeues first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
}

impl Priority {
    pub fn rank(self) -> u64 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(Priority::Critical),
            "high" => Some(Priority::High),
            "normal" => Some(Priority::Normal),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

crate::simple_display! {
    Priority {
        Critical => "critical",
        High => "high",
        Normal => "normal",
        Low => "low",
    }
}

/// Composite ordering score: priority rank dominates, enqueue time breaks
/// ties FIFO. Lower is earlier. Also used verbatim as the Redis sorted-set
/// score for the pending partition.
pub fn priority_score(priority: Priority, enqueued_at_ms: u64) -> u64 {
    priority.rank() * 1_000_000_000_000_000 + enqueued_at_ms
}

/// The five mutually exclusive states a queue item can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePartition {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

crate::simple_display! {
    QueuePartition {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Skipped => "skipped",
    }
}

/// A task wrapped with its scheduling metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub task: Task,
    #[serde(default)]
    pub priority: Priority,
    pub enqueued_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(default)]
    pub attempts: u32,
    pub max_attempts: u32,
}

impl QueueItem {
    pub fn new(task: Task, priority: Priority, enqueued_at_ms: u64, max_attempts: u32) -> Self {
        Self {
            task,
            priority,
            enqueued_at_ms,
            started_at_ms: None,
            completed_at_ms: None,
            attempts: 0,
            max_attempts,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task.id
    }

    pub fn score(&self) -> u64 {
        priority_score(self.priority, self.enqueued_at_ms)
    }

    /// True once the retry budget is exhausted.
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Counts per partition, as reported by `get_stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.failed + self.skipped
    }
}

crate::builder! {
    pub struct QueueItemBuilder => QueueItem {
        into {
            task: Task = Task::new("1", "test task"),
        }
        set {
            priority: Priority = Priority::Normal,
            enqueued_at_ms: u64 = 1_000_000,
            attempts: u32 = 0,
            max_attempts: u32 = 3,
        }
        option {
            started_at_ms: u64 = None,
            completed_at_ms: u64 = None,
        }
    }
}

#[cfg(test)]
#[path = "queue_item_tests.rs"]
mod tests;
