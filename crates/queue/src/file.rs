// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed queue: the memory backend plus debounced JSON snapshots.
//!
//! A snapshot is scheduled 100 ms after the last mutation and forced every
//! 5 s while dirty, with at least 1 s between saves. Persistence is atomic
//! (temp file, then rename). On load, `running` items are restored as
//! `pending` so interrupted work is retried.

use crate::memory::MemoryQueue;
use crate::{QueueConfig, QueueError, TaskQueue};
use async_trait::async_trait;
use parking_lot::Mutex;
use ralphy_core::{Clock, Priority, QueueItem, QueuePartition, QueueStats, Task};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

const DEBOUNCE: Duration = Duration::from_millis(100);
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const MIN_SAVE_INTERVAL_MS: u64 = 1_000;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    items: Vec<SnapshotItem>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotItem {
    partition: QueuePartition,
    item: QueueItem,
}

struct Persist<C: Clock> {
    path: PathBuf,
    clock: C,
    dirty: AtomicBool,
    last_save_ms: Mutex<u64>,
}

impl<C: Clock> Persist<C> {
    fn save(&self, inner: &MemoryQueue<C>) -> Result<(), QueueError> {
        let items = inner
            .snapshot()
            .into_iter()
            .map(|(item, partition)| SnapshotItem { partition, item })
            .collect();
        let snapshot = Snapshot { version: SNAPSHOT_VERSION, items };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.path)?;

        *self.last_save_ms.lock() = self.clock.epoch_ms();
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Save if dirty and the minimum interval has elapsed.
    fn save_if_due(&self, inner: &MemoryQueue<C>) {
        if !self.dirty.load(Ordering::SeqCst) {
            return;
        }
        let elapsed = self.clock.epoch_ms().saturating_sub(*self.last_save_ms.lock());
        if elapsed < MIN_SAVE_INTERVAL_MS {
            return; // stays dirty; the periodic flush will catch it
        }
        if let Err(e) = self.save(inner) {
            tracing::warn!(error = %e, path = %self.path.display(), "queue snapshot failed");
        }
    }
}

/// Queue with durable JSON snapshots.
pub struct FileQueue<C: Clock> {
    inner: Arc<MemoryQueue<C>>,
    persist: Arc<Persist<C>>,
    notify: Arc<Notify>,
    writer: Mutex<Option<tokio::task::JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<C: Clock + 'static> FileQueue<C> {
    /// Open (or create) a queue at `path`, restoring any previous snapshot.
    pub fn open(path: &Path, config: QueueConfig, clock: C) -> Result<Self, QueueError> {
        let inner = Arc::new(MemoryQueue::new(config, clock.clone()));

        if let Ok(content) = std::fs::read_to_string(path) {
            let snapshot: Snapshot = serde_json::from_str(&content)?;
            for entry in snapshot.items {
                let mut item = entry.item;
                let partition = match entry.partition {
                    QueuePartition::Running => {
                        // Interrupted mid-run: retry from pending
                        item.started_at_ms = None;
                        QueuePartition::Pending
                    }
                    other => other,
                };
                inner.restore(item, partition);
            }
        }

        let persist = Arc::new(Persist {
            path: path.to_path_buf(),
            clock,
            dirty: AtomicBool::new(false),
            last_save_ms: Mutex::new(0),
        });
        let notify = Arc::new(Notify::new());

        let writer = {
            let inner = Arc::clone(&inner);
            let persist = Arc::clone(&persist);
            let notify = Arc::clone(&notify);
            tokio::spawn(async move {
                let mut flush = tokio::time::interval(FLUSH_INTERVAL);
                flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = notify.notified() => {
                            tokio::time::sleep(DEBOUNCE).await;
                            persist.save_if_due(&inner);
                        }
                        _ = flush.tick() => {
                            persist.save_if_due(&inner);
                        }
                    }
                }
            })
        };

        Ok(Self {
            inner,
            persist,
            notify,
            writer: Mutex::new(Some(writer)),
            closed: AtomicBool::new(false),
        })
    }

    fn touch(&self) {
        self.persist.dirty.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Persist immediately, bypassing the debounce.
    pub fn flush(&self) -> Result<(), QueueError> {
        self.persist.save(&self.inner)
    }
}

#[async_trait]
impl<C: Clock + 'static> TaskQueue for FileQueue<C> {
    async fn enqueue(&self, task: Task, priority: Priority) -> Result<(), QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        self.inner.enqueue(task, priority).await?;
        self.touch();
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<QueueItem>, QueueError> {
        let item = self.inner.dequeue().await?;
        if item.is_some() {
            self.touch();
        }
        Ok(item)
    }

    async fn peek(&self) -> Result<Option<QueueItem>, QueueError> {
        self.inner.peek().await
    }

    async fn mark_running(&self, id: &str) -> Result<bool, QueueError> {
        let moved = self.inner.mark_running(id).await?;
        if moved {
            self.touch();
        }
        Ok(moved)
    }

    async fn mark_complete(&self, id: &str) -> Result<bool, QueueError> {
        let moved = self.inner.mark_complete(id).await?;
        if moved {
            self.touch();
        }
        Ok(moved)
    }

    async fn mark_failed(&self, id: &str) -> Result<bool, QueueError> {
        let moved = self.inner.mark_failed(id).await?;
        if moved {
            self.touch();
        }
        Ok(moved)
    }

    async fn mark_skipped(&self, id: &str) -> Result<bool, QueueError> {
        let moved = self.inner.mark_skipped(id).await?;
        if moved {
            self.touch();
        }
        Ok(moved)
    }

    async fn reset_task(&self, id: &str) -> Result<bool, QueueError> {
        let moved = self.inner.reset_task(id).await?;
        if moved {
            self.touch();
        }
        Ok(moved)
    }

    async fn remove(&self, id: &str) -> Result<bool, QueueError> {
        let removed = self.inner.remove(id).await?;
        if removed {
            self.touch();
        }
        Ok(removed)
    }

    async fn has_task(&self, id: &str) -> Result<bool, QueueError> {
        self.inner.has_task(id).await
    }

    async fn get_task(&self, id: &str) -> Result<Option<QueueItem>, QueueError> {
        self.inner.get_task(id).await
    }

    async fn get_pending(&self) -> Result<Vec<QueueItem>, QueueError> {
        self.inner.get_pending().await
    }

    async fn get_running(&self) -> Result<Vec<QueueItem>, QueueError> {
        self.inner.get_running().await
    }

    async fn get_completed(&self) -> Result<Vec<QueueItem>, QueueError> {
        self.inner.get_completed().await
    }

    async fn get_failed(&self) -> Result<Vec<QueueItem>, QueueError> {
        self.inner.get_failed().await
    }

    async fn get_skipped(&self) -> Result<Vec<QueueItem>, QueueError> {
        self.inner.get_skipped().await
    }

    async fn get_stats(&self) -> Result<QueueStats, QueueError> {
        self.inner.get_stats().await
    }

    async fn clear(&self) -> Result<(), QueueError> {
        self.inner.clear().await?;
        self.touch();
        Ok(())
    }

    /// Final flush, then stop the background writer.
    async fn close(&self) -> Result<(), QueueError> {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(writer) = self.writer.lock().take() {
            writer.abort();
        }
        self.flush()
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
