// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ralphy_core::FakeClock;

#[test]
fn keys_are_prefixed() {
    let keys = Keys { prefix: "ralphy:q1".to_string() };
    assert_eq!(keys.pending(), "ralphy:q1:pending");
    assert_eq!(keys.running(), "ralphy:q1:running");
    assert_eq!(keys.items(), "ralphy:q1:items");
    assert_eq!(keys.lock("42"), "ralphy:q1:locks:42");
}

#[test]
fn dequeue_script_touches_all_three_keys() {
    // The script must pop pending, set the worker lock, and add to running
    assert!(DEQUEUE_LUA.contains("ZRANGE"));
    assert!(DEQUEUE_LUA.contains("ZREM"));
    assert!(DEQUEUE_LUA.contains("SETEX"));
    assert!(DEQUEUE_LUA.contains("ZADD"));
}

// Integration tests need a live Redis; run with
//   REDIS_URL=redis://127.0.0.1 cargo test -p ralphy-queue -- --ignored
mod integration {
    use super::*;
    use crate::TaskQueue;
    use serial_test::serial;

    async fn queue() -> RedisQueue<FakeClock> {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1".to_string());
        let clock = FakeClock::at_epoch_ms(100);
        let queue = RedisQueue::connect(&url, "ralphy:test", QueueConfig::default(), clock)
            .await
            .unwrap();
        queue.clear().await.unwrap();
        queue
    }

    #[tokio::test]
    #[serial]
    #[ignore = "requires a running redis instance"]
    async fn priority_then_fifo_ordering() {
        let queue = queue().await;
        queue.clock.set_epoch_ms(100);
        queue.enqueue(Task::new("T1", "t"), Priority::Normal).await.unwrap();
        queue.clock.set_epoch_ms(101);
        queue.enqueue(Task::new("T2", "t"), Priority::High).await.unwrap();
        queue.clock.set_epoch_ms(102);
        queue.enqueue(Task::new("T3", "t"), Priority::High).await.unwrap();
        queue.clock.set_epoch_ms(103);
        queue.enqueue(Task::new("T4", "t"), Priority::Critical).await.unwrap();

        let mut order = Vec::new();
        while let Some(item) = queue.dequeue().await.unwrap() {
            order.push(item.task_id().to_string());
        }
        assert_eq!(order, ["T4", "T2", "T3", "T1"]);
        queue.close().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    #[ignore = "requires a running redis instance"]
    async fn dequeue_claims_lock_and_moves_to_running() {
        let queue = queue().await;
        queue.enqueue(Task::new("1", "t"), Priority::Normal).await.unwrap();

        let item = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(item.task_id(), "1");

        let stats = queue.get_stats().await.unwrap();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.running, 1);

        let mut conn = queue.conn.clone();
        let holder: Option<String> =
            redis::AsyncCommands::get(&mut conn, queue.keys.lock("1")).await.unwrap();
        assert_eq!(holder.as_deref(), Some(queue.worker_id().as_str()));
        queue.close().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    #[ignore = "requires a running redis instance"]
    async fn failed_item_requeues_with_original_score() {
        let queue = queue().await;
        queue.enqueue(Task::new("1", "t"), Priority::High).await.unwrap();
        let original = queue.peek().await.unwrap().unwrap().score();

        queue.dequeue().await.unwrap().unwrap();
        queue.mark_failed("1").await.unwrap();

        let requeued = queue.peek().await.unwrap().unwrap();
        assert_eq!(requeued.score(), original);
        assert_eq!(requeued.attempts, 1);
        queue.close().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    #[ignore = "requires a running redis instance"]
    async fn sweep_reclaims_items_with_expired_locks() {
        let queue = queue().await;
        queue.enqueue(Task::new("1", "t"), Priority::Normal).await.unwrap();
        queue.dequeue().await.unwrap().unwrap();

        // Simulate lock expiry, then sweep
        let mut conn = queue.conn.clone();
        let _: () = redis::AsyncCommands::del(&mut conn, queue.keys.lock("1")).await.unwrap();
        sweep_expired(queue.conn.clone(), &queue.keys, queue.clock.epoch_ms()).await.unwrap();

        let stats = queue.get_stats().await.unwrap();
        assert_eq!(stats.running, 0);
        assert_eq!(stats.pending, 1);
        queue.close().await.unwrap();
    }
}
