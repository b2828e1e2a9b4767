// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory queue backend: five maps keyed by task id.

use crate::{QueueConfig, QueueError, TaskQueue};
use async_trait::async_trait;
use parking_lot::Mutex;
use ralphy_core::{Clock, Priority, QueueItem, QueuePartition, QueueStats, Task};
use std::collections::HashMap;

#[derive(Default)]
pub(crate) struct Partitions {
    pub pending: Vec<QueueItem>,
    pub running: HashMap<String, QueueItem>,
    pub completed: HashMap<String, QueueItem>,
    pub failed: HashMap<String, QueueItem>,
    pub skipped: HashMap<String, QueueItem>,
}

impl Partitions {
    /// Index of the best pending item: smallest score, FIFO on ties.
    fn best_pending(&self) -> Option<usize> {
        self.pending
            .iter()
            .enumerate()
            .min_by_key(|(i, item)| (item.score(), *i))
            .map(|(i, _)| i)
    }

    fn take_from_any(&mut self, id: &str) -> Option<(QueueItem, QueuePartition)> {
        if let Some(pos) = self.pending.iter().position(|i| i.task_id() == id) {
            return Some((self.pending.remove(pos), QueuePartition::Pending));
        }
        if let Some(item) = self.running.remove(id) {
            return Some((item, QueuePartition::Running));
        }
        if let Some(item) = self.completed.remove(id) {
            return Some((item, QueuePartition::Completed));
        }
        if let Some(item) = self.failed.remove(id) {
            return Some((item, QueuePartition::Failed));
        }
        if let Some(item) = self.skipped.remove(id) {
            return Some((item, QueuePartition::Skipped));
        }
        None
    }

    fn find(&self, id: &str) -> Option<&QueueItem> {
        self.pending
            .iter()
            .find(|i| i.task_id() == id)
            .or_else(|| self.running.get(id))
            .or_else(|| self.completed.get(id))
            .or_else(|| self.failed.get(id))
            .or_else(|| self.skipped.get(id))
    }
}

/// Synchronous queue state shared by the memory and file backends.
pub struct MemoryQueue<C: Clock> {
    pub(crate) clock: C,
    pub(crate) config: QueueConfig,
    pub(crate) partitions: Mutex<Partitions>,
}

impl<C: Clock> MemoryQueue<C> {
    pub fn new(config: QueueConfig, clock: C) -> Self {
        Self { clock, config, partitions: Mutex::new(Partitions::default()) }
    }

    /// Restore an item into a partition verbatim (snapshot load).
    pub(crate) fn restore(&self, item: QueueItem, partition: QueuePartition) {
        let mut parts = self.partitions.lock();
        let id = item.task_id().to_string();
        match partition {
            QueuePartition::Pending => parts.pending.push(item),
            QueuePartition::Running => {
                parts.running.insert(id, item);
            }
            QueuePartition::Completed => {
                parts.completed.insert(id, item);
            }
            QueuePartition::Failed => {
                parts.failed.insert(id, item);
            }
            QueuePartition::Skipped => {
                parts.skipped.insert(id, item);
            }
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<(QueueItem, QueuePartition)> {
        let parts = self.partitions.lock();
        let mut out = Vec::new();
        out.extend(parts.pending.iter().cloned().map(|i| (i, QueuePartition::Pending)));
        out.extend(parts.running.values().cloned().map(|i| (i, QueuePartition::Running)));
        out.extend(parts.completed.values().cloned().map(|i| (i, QueuePartition::Completed)));
        out.extend(parts.failed.values().cloned().map(|i| (i, QueuePartition::Failed)));
        out.extend(parts.skipped.values().cloned().map(|i| (i, QueuePartition::Skipped)));
        out
    }
}

#[async_trait]
impl<C: Clock> TaskQueue for MemoryQueue<C> {
    async fn enqueue(&self, task: Task, priority: Priority) -> Result<(), QueueError> {
        let item =
            QueueItem::new(task, priority, self.clock.epoch_ms(), self.config.max_attempts);
        self.partitions.lock().pending.push(item);
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<QueueItem>, QueueError> {
        let mut parts = self.partitions.lock();
        let Some(pos) = parts.best_pending() else {
            return Ok(None);
        };
        let mut item = parts.pending.remove(pos);
        item.started_at_ms = Some(self.clock.epoch_ms());
        parts.running.insert(item.task_id().to_string(), item.clone());
        Ok(Some(item))
    }

    async fn peek(&self) -> Result<Option<QueueItem>, QueueError> {
        let parts = self.partitions.lock();
        Ok(parts.best_pending().map(|pos| parts.pending[pos].clone()))
    }

    async fn mark_running(&self, id: &str) -> Result<bool, QueueError> {
        let mut parts = self.partitions.lock();
        let Some(pos) = parts.pending.iter().position(|i| i.task_id() == id) else {
            return Ok(false);
        };
        let mut item = parts.pending.remove(pos);
        item.started_at_ms = Some(self.clock.epoch_ms());
        parts.running.insert(id.to_string(), item);
        Ok(true)
    }

    async fn mark_complete(&self, id: &str) -> Result<bool, QueueError> {
        let mut parts = self.partitions.lock();
        let Some((mut item, _)) = parts.take_from_any(id) else {
            return Ok(false);
        };
        item.completed_at_ms = Some(self.clock.epoch_ms());
        parts.completed.insert(id.to_string(), item);
        Ok(true)
    }

    async fn mark_failed(&self, id: &str) -> Result<bool, QueueError> {
        let mut parts = self.partitions.lock();
        let Some((mut item, _)) = parts.take_from_any(id) else {
            return Ok(false);
        };
        item.attempts += 1;
        item.started_at_ms = None;
        if item.attempts_exhausted() {
            item.completed_at_ms = Some(self.clock.epoch_ms());
            parts.failed.insert(id.to_string(), item);
        } else {
            parts.pending.push(item);
        }
        Ok(true)
    }

    async fn mark_skipped(&self, id: &str) -> Result<bool, QueueError> {
        let mut parts = self.partitions.lock();
        let from_pending = parts.pending.iter().position(|i| i.task_id() == id);
        let item = match from_pending {
            Some(pos) => Some(parts.pending.remove(pos)),
            None => parts.running.remove(id),
        };
        let Some(mut item) = item else {
            return Ok(false);
        };
        item.completed_at_ms = Some(self.clock.epoch_ms());
        parts.skipped.insert(id.to_string(), item);
        Ok(true)
    }

    async fn reset_task(&self, id: &str) -> Result<bool, QueueError> {
        let mut parts = self.partitions.lock();
        let item = parts.failed.remove(id).or_else(|| parts.skipped.remove(id));
        let Some(mut item) = item else {
            return Ok(false);
        };
        item.attempts = 0;
        item.started_at_ms = None;
        item.completed_at_ms = None;
        parts.pending.push(item);
        Ok(true)
    }

    async fn remove(&self, id: &str) -> Result<bool, QueueError> {
        Ok(self.partitions.lock().take_from_any(id).is_some())
    }

    async fn has_task(&self, id: &str) -> Result<bool, QueueError> {
        Ok(self.partitions.lock().find(id).is_some())
    }

    async fn get_task(&self, id: &str) -> Result<Option<QueueItem>, QueueError> {
        Ok(self.partitions.lock().find(id).cloned())
    }

    async fn get_pending(&self) -> Result<Vec<QueueItem>, QueueError> {
        let parts = self.partitions.lock();
        let mut items = parts.pending.clone();
        items.sort_by_key(|i| i.score());
        Ok(items)
    }

    async fn get_running(&self) -> Result<Vec<QueueItem>, QueueError> {
        Ok(self.partitions.lock().running.values().cloned().collect())
    }

    async fn get_completed(&self) -> Result<Vec<QueueItem>, QueueError> {
        Ok(self.partitions.lock().completed.values().cloned().collect())
    }

    async fn get_failed(&self) -> Result<Vec<QueueItem>, QueueError> {
        Ok(self.partitions.lock().failed.values().cloned().collect())
    }

    async fn get_skipped(&self) -> Result<Vec<QueueItem>, QueueError> {
        Ok(self.partitions.lock().skipped.values().cloned().collect())
    }

    async fn get_stats(&self) -> Result<QueueStats, QueueError> {
        let parts = self.partitions.lock();
        Ok(QueueStats {
            pending: parts.pending.len(),
            running: parts.running.len(),
            completed: parts.completed.len(),
            failed: parts.failed.len(),
            skipped: parts.skipped.len(),
        })
    }

    async fn clear(&self) -> Result<(), QueueError> {
        *self.partitions.lock() = Partitions::default();
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
