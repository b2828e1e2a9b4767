// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    critical = { Priority::Critical, 0 },
    high = { Priority::High, 1 },
    normal = { Priority::Normal, 2 },
    low = { Priority::Low, 3 },
)]
fn priority_ranks(priority: Priority, rank: u64) {
    assert_eq!(priority.rank(), rank);
}

#[test]
fn score_orders_priority_before_time() {
    // An older normal item still loses to a newer critical one
    let critical_late = priority_score(Priority::Critical, 2_000);
    let normal_early = priority_score(Priority::Normal, 1_000);
    assert!(critical_late < normal_early);
}

#[test]
fn score_breaks_ties_fifo() {
    let first = priority_score(Priority::High, 100);
    let second = priority_score(Priority::High, 101);
    assert!(first < second);
}

#[test]
fn parse_rejects_unknown() {
    assert_eq!(Priority::parse("high"), Some(Priority::High));
    assert_eq!(Priority::parse("urgent"), None);
}

#[test]
fn attempts_exhausted_at_budget() {
    let mut item = QueueItem::builder().max_attempts(2).build();
    assert!(!item.attempts_exhausted());
    item.attempts = 2;
    assert!(item.attempts_exhausted());
}

#[test]
fn stats_total_sums_partitions() {
    let stats = QueueStats { pending: 1, running: 2, completed: 3, failed: 4, skipped: 5 };
    assert_eq!(stats.total(), 15);
}

#[test]
fn item_serde_round_trip() {
    let item = QueueItem::new(Task::new("9", "T"), Priority::Low, 123, 3);
    let json = serde_json::to_string(&item).unwrap();
    let back: QueueItem = serde_json::from_str(&json).unwrap();
    assert_eq!(back, item);
}
