// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis queue backend for distributed workers.
//!
//! Partitions are sorted sets scored by priority score (pending) or
//! timestamp (elsewhere); serialized items live in a hash keyed by task id.
//! Dequeue runs server-side as a Lua script so pop + lock + move-to-running
//! is atomic across workers. Items whose worker lock expired are swept back
//! to pending at their original score.

use crate::{QueueConfig, QueueError, TaskQueue};
use async_trait::async_trait;
use parking_lot::Mutex;
use ralphy_core::{Clock, Priority, QueueItem, QueueStats, Task, WorkerId};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::time::Duration;

/// Seconds a worker's claim lock lives without renewal.
const LOCK_TTL_SECS: u64 = 300;

/// How often expired-lock sweeps run.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Atomic dequeue: pop the best pending id, claim its lock, move it to
/// running. KEYS = pending zset, lock key prefix, running zset;
/// ARGV = worker id, lock TTL seconds, now (ms).
const DEQUEUE_LUA: &str = r#"
local id = redis.call('ZRANGE', KEYS[1], 0, 0)[1]
if not id then
  return nil
end
redis.call('ZREM', KEYS[1], id)
redis.call('SETEX', KEYS[2] .. id, tonumber(ARGV[2]), ARGV[1])
redis.call('ZADD', KEYS[3], tonumber(ARGV[3]), id)
return id
"#;

#[derive(Clone)]
struct Keys {
    prefix: String,
}

impl Keys {
    fn pending(&self) -> String {
        format!("{}:pending", self.prefix)
    }
    fn running(&self) -> String {
        format!("{}:running", self.prefix)
    }
    fn completed(&self) -> String {
        format!("{}:completed", self.prefix)
    }
    fn failed(&self) -> String {
        format!("{}:failed", self.prefix)
    }
    fn skipped(&self) -> String {
        format!("{}:skipped", self.prefix)
    }
    fn items(&self) -> String {
        format!("{}:items", self.prefix)
    }
    fn lock_prefix(&self) -> String {
        format!("{}:locks:", self.prefix)
    }
    fn lock(&self, id: &str) -> String {
        format!("{}{}", self.lock_prefix(), id)
    }
}

/// Distributed queue over a single Redis instance.
pub struct RedisQueue<C: Clock> {
    conn: ConnectionManager,
    keys: Keys,
    worker_id: WorkerId,
    clock: C,
    config: QueueConfig,
    sweeper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<C: Clock + 'static> RedisQueue<C> {
    /// Connect and start the background expired-lock sweeper.
    pub async fn connect(
        url: &str,
        prefix: &str,
        config: QueueConfig,
        clock: C,
    ) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        let keys = Keys { prefix: prefix.to_string() };
        let worker_id = WorkerId::generate(&clock);
        tracing::info!(%worker_id, prefix, "redis queue connected");

        let sweeper = {
            let conn = conn.clone();
            let keys = keys.clone();
            let clock = clock.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(SWEEP_INTERVAL);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // The immediate first tick is harmless: nothing is expired yet
                loop {
                    tick.tick().await;
                    if let Err(e) = sweep_expired(conn.clone(), &keys, clock.epoch_ms()).await {
                        tracing::warn!(error = %e, "expired-lock sweep failed");
                    }
                }
            })
        };

        Ok(Self { conn, keys, worker_id, clock, config, sweeper: Mutex::new(Some(sweeper)) })
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    async fn load_item(&self, id: &str) -> Result<Option<QueueItem>, QueueError> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.hget(self.keys.items(), id).await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn store_item(&self, item: &QueueItem) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(item)?;
        conn.hset::<_, _, _, ()>(self.keys.items(), item.task_id(), json).await?;
        Ok(())
    }

    async fn ids_in(&self, key: &str) -> Result<Vec<String>, QueueError> {
        let mut conn = self.conn.clone();
        Ok(conn.zrange(key, 0, -1).await?)
    }

    async fn items_in(&self, key: &str) -> Result<Vec<QueueItem>, QueueError> {
        let mut out = Vec::new();
        for id in self.ids_in(key).await? {
            if let Some(item) = self.load_item(&id).await? {
                out.push(item);
            }
        }
        Ok(out)
    }

    /// Remove an id from every partition set. Returns true if any held it.
    async fn detach(&self, id: &str) -> Result<bool, QueueError> {
        let mut conn = self.conn.clone();
        let (p, r, c, f, s): (u32, u32, u32, u32, u32) = redis::pipe()
            .atomic()
            .zrem(self.keys.pending(), id)
            .zrem(self.keys.running(), id)
            .zrem(self.keys.completed(), id)
            .zrem(self.keys.failed(), id)
            .zrem(self.keys.skipped(), id)
            .query_async(&mut conn)
            .await?;
        Ok(p + r + c + f + s > 0)
    }
}

/// Move running items with expired locks back to pending at their original
/// priority score.
async fn sweep_expired(
    mut conn: ConnectionManager,
    keys: &Keys,
    _now_ms: u64,
) -> Result<(), QueueError> {
    let running: Vec<String> = conn.zrange(keys.running(), 0, -1).await?;
    for id in running {
        let lock_alive: bool = conn.exists(keys.lock(&id)).await?;
        if lock_alive {
            continue;
        }
        let json: Option<String> = conn.hget(keys.items(), &id).await?;
        let Some(json) = json else {
            let _: u32 = conn.zrem(keys.running(), &id).await?;
            continue;
        };
        let mut item: QueueItem = serde_json::from_str(&json)?;
        item.started_at_ms = None;
        tracing::info!(id, "reclaiming item with expired worker lock");
        redis::pipe()
            .atomic()
            .zrem(keys.running(), &id)
            .zadd(keys.pending(), &id, item.score())
            .hset(keys.items(), &id, serde_json::to_string(&item)?)
            .del(keys.lock(&id))
            .query_async::<_, ()>(&mut conn)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl<C: Clock + 'static> TaskQueue for RedisQueue<C> {
    async fn enqueue(&self, task: Task, priority: Priority) -> Result<(), QueueError> {
        let item =
            QueueItem::new(task, priority, self.clock.epoch_ms(), self.config.max_attempts);
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .hset(self.keys.items(), item.task_id(), serde_json::to_string(&item)?)
            .zadd(self.keys.pending(), item.task_id(), item.score())
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<QueueItem>, QueueError> {
        let mut conn = self.conn.clone();
        let id: Option<String> = Script::new(DEQUEUE_LUA)
            .key(self.keys.pending())
            .key(self.keys.lock_prefix())
            .key(self.keys.running())
            .arg(self.worker_id.as_str())
            .arg(LOCK_TTL_SECS)
            .arg(self.clock.epoch_ms())
            .invoke_async(&mut conn)
            .await?;
        let Some(id) = id else {
            return Ok(None);
        };
        let Some(mut item) = self.load_item(&id).await? else {
            return Ok(None);
        };
        item.started_at_ms = Some(self.clock.epoch_ms());
        self.store_item(&item).await?;
        Ok(Some(item))
    }

    async fn peek(&self) -> Result<Option<QueueItem>, QueueError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.zrange(self.keys.pending(), 0, 0).await?;
        match ids.first() {
            Some(id) => self.load_item(id).await,
            None => Ok(None),
        }
    }

    async fn mark_running(&self, id: &str) -> Result<bool, QueueError> {
        let mut conn = self.conn.clone();
        let removed: u32 = conn.zrem(self.keys.pending(), id).await?;
        if removed == 0 {
            return Ok(false);
        }
        let Some(mut item) = self.load_item(id).await? else {
            return Ok(false);
        };
        item.started_at_ms = Some(self.clock.epoch_ms());
        redis::pipe()
            .atomic()
            .zadd(self.keys.running(), id, self.clock.epoch_ms())
            .set_options(
                self.keys.lock(id),
                self.worker_id.as_str(),
                redis::SetOptions::default()
                    .with_expiration(redis::SetExpiry::EX(LOCK_TTL_SECS as usize)),
            )
            .hset(self.keys.items(), id, serde_json::to_string(&item)?)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(true)
    }

    async fn mark_complete(&self, id: &str) -> Result<bool, QueueError> {
        let Some(mut item) = self.load_item(id).await? else {
            return Ok(false);
        };
        if !self.detach(id).await? {
            return Ok(false);
        }
        item.completed_at_ms = Some(self.clock.epoch_ms());
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .zadd(self.keys.completed(), id, self.clock.epoch_ms())
            .hset(self.keys.items(), id, serde_json::to_string(&item)?)
            .del(self.keys.lock(id))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(true)
    }

    async fn mark_failed(&self, id: &str) -> Result<bool, QueueError> {
        let Some(mut item) = self.load_item(id).await? else {
            return Ok(false);
        };
        if !self.detach(id).await? {
            return Ok(false);
        }
        item.attempts += 1;
        item.started_at_ms = None;
        let mut conn = self.conn.clone();
        if item.attempts_exhausted() {
            item.completed_at_ms = Some(self.clock.epoch_ms());
            redis::pipe()
                .atomic()
                .zadd(self.keys.failed(), id, self.clock.epoch_ms())
                .hset(self.keys.items(), id, serde_json::to_string(&item)?)
                .del(self.keys.lock(id))
                .query_async::<_, ()>(&mut conn)
                .await?;
        } else {
            redis::pipe()
                .atomic()
                .zadd(self.keys.pending(), id, item.score())
                .hset(self.keys.items(), id, serde_json::to_string(&item)?)
                .del(self.keys.lock(id))
                .query_async::<_, ()>(&mut conn)
                .await?;
        }
        Ok(true)
    }

    /// Removes from both pending and running without checking which held
    /// the item; the extra ZREM is a no-op.
    async fn mark_skipped(&self, id: &str) -> Result<bool, QueueError> {
        let Some(mut item) = self.load_item(id).await? else {
            return Ok(false);
        };
        let mut conn = self.conn.clone();
        let (from_pending, from_running): (u32, u32) = redis::pipe()
            .atomic()
            .zrem(self.keys.pending(), id)
            .zrem(self.keys.running(), id)
            .query_async(&mut conn)
            .await?;
        if from_pending + from_running == 0 {
            return Ok(false);
        }
        item.completed_at_ms = Some(self.clock.epoch_ms());
        redis::pipe()
            .atomic()
            .zadd(self.keys.skipped(), id, self.clock.epoch_ms())
            .hset(self.keys.items(), id, serde_json::to_string(&item)?)
            .del(self.keys.lock(id))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(true)
    }

    async fn reset_task(&self, id: &str) -> Result<bool, QueueError> {
        let Some(mut item) = self.load_item(id).await? else {
            return Ok(false);
        };
        let mut conn = self.conn.clone();
        let (from_failed, from_skipped): (u32, u32) = redis::pipe()
            .atomic()
            .zrem(self.keys.failed(), id)
            .zrem(self.keys.skipped(), id)
            .query_async(&mut conn)
            .await?;
        if from_failed + from_skipped == 0 {
            return Ok(false);
        }
        item.attempts = 0;
        item.started_at_ms = None;
        item.completed_at_ms = None;
        redis::pipe()
            .atomic()
            .zadd(self.keys.pending(), id, item.score())
            .hset(self.keys.items(), id, serde_json::to_string(&item)?)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(true)
    }

    async fn remove(&self, id: &str) -> Result<bool, QueueError> {
        let detached = self.detach(id).await?;
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .hdel(self.keys.items(), id)
            .del(self.keys.lock(id))
            .query_async(&mut conn)
            .await?;
        Ok(detached)
    }

    async fn has_task(&self, id: &str) -> Result<bool, QueueError> {
        let mut conn = self.conn.clone();
        Ok(conn.hexists(self.keys.items(), id).await?)
    }

    async fn get_task(&self, id: &str) -> Result<Option<QueueItem>, QueueError> {
        self.load_item(id).await
    }

    async fn get_pending(&self) -> Result<Vec<QueueItem>, QueueError> {
        self.items_in(&self.keys.pending()).await
    }

    async fn get_running(&self) -> Result<Vec<QueueItem>, QueueError> {
        self.items_in(&self.keys.running()).await
    }

    async fn get_completed(&self) -> Result<Vec<QueueItem>, QueueError> {
        self.items_in(&self.keys.completed()).await
    }

    async fn get_failed(&self) -> Result<Vec<QueueItem>, QueueError> {
        self.items_in(&self.keys.failed()).await
    }

    async fn get_skipped(&self) -> Result<Vec<QueueItem>, QueueError> {
        self.items_in(&self.keys.skipped()).await
    }

    async fn get_stats(&self) -> Result<QueueStats, QueueError> {
        let mut conn = self.conn.clone();
        let (pending, running, completed, failed, skipped): (usize, usize, usize, usize, usize) =
            redis::pipe()
                .zcard(self.keys.pending())
                .zcard(self.keys.running())
                .zcard(self.keys.completed())
                .zcard(self.keys.failed())
                .zcard(self.keys.skipped())
                .query_async(&mut conn)
                .await?;
        Ok(QueueStats { pending, running, completed, failed, skipped })
    }

    async fn clear(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .del(self.keys.pending())
            .del(self.keys.running())
            .del(self.keys.completed())
            .del(self.keys.failed())
            .del(self.keys.skipped())
            .del(self.keys.items())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "redis_queue_tests.rs"]
mod tests;
