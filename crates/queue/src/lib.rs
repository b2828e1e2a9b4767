// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ralphy-queue: priority task queue with interchangeable backends.
//!
//! Three backends share one interface: in-memory (ephemeral), file-backed
//! (debounced JSON snapshots with crash recovery), and Redis (distributed,
//! with atomic Lua dequeue and expired-lock sweeping). Every item is in
//! exactly one of five partitions at any moment: pending, running,
//! completed, failed, or skipped.

mod file;
mod memory;
mod redis_queue;

pub use file::FileQueue;
pub use memory::MemoryQueue;
pub use redis_queue::RedisQueue;

use async_trait::async_trait;
use ralphy_core::{Priority, QueueItem, QueueStats, Task};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("queue is closed")]
    Closed,
}

/// Shared queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Retry budget per item before it lands in `failed`.
    pub max_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// The queue interface shared by all backends.
///
/// `dequeue` returns the pending item with the smallest
/// `(priorityRank, enqueuedAt)` score and moves it to `running`.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: Task, priority: Priority) -> Result<(), QueueError>;
    async fn dequeue(&self) -> Result<Option<QueueItem>, QueueError>;
    async fn peek(&self) -> Result<Option<QueueItem>, QueueError>;

    /// Move a pending item to running by id (for drivers that pick by id).
    async fn mark_running(&self, id: &str) -> Result<bool, QueueError>;
    async fn mark_complete(&self, id: &str) -> Result<bool, QueueError>;
    /// Increment attempts; requeue while the budget lasts, else fail.
    async fn mark_failed(&self, id: &str) -> Result<bool, QueueError>;
    /// Accepts an item from pending or running.
    async fn mark_skipped(&self, id: &str) -> Result<bool, QueueError>;
    /// Return a failed or skipped item to pending with a fresh budget.
    async fn reset_task(&self, id: &str) -> Result<bool, QueueError>;
    async fn remove(&self, id: &str) -> Result<bool, QueueError>;

    async fn has_task(&self, id: &str) -> Result<bool, QueueError>;
    async fn get_task(&self, id: &str) -> Result<Option<QueueItem>, QueueError>;
    async fn get_pending(&self) -> Result<Vec<QueueItem>, QueueError>;
    async fn get_running(&self) -> Result<Vec<QueueItem>, QueueError>;
    async fn get_completed(&self) -> Result<Vec<QueueItem>, QueueError>;
    async fn get_failed(&self) -> Result<Vec<QueueItem>, QueueError>;
    async fn get_skipped(&self) -> Result<Vec<QueueItem>, QueueError>;
    async fn get_stats(&self) -> Result<QueueStats, QueueError>;

    async fn clear(&self) -> Result<(), QueueError>;
    async fn close(&self) -> Result<(), QueueError>;
}
