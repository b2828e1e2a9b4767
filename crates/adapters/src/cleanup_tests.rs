// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicU32, Ordering};

#[test]
fn register_unregister_tracks_pids() {
    let registry = ProcessRegistry::new();
    registry.register(101, "engine");
    registry.register(102, "engine");
    assert_eq!(registry.len(), 2);

    registry.unregister(101);
    assert_eq!(registry.len(), 1);
    registry.unregister(101); // idempotent
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn shutdown_drains_registry_and_tolerates_dead_pids() {
    let registry = ProcessRegistry::new();
    // A pid that certainly no longer exists by the time we signal it
    let child = std::process::Command::new("true").spawn().unwrap();
    let pid = child.id();
    let _ = child.wait_with_output();
    registry.register(pid, "already dead");

    registry.shutdown_all().await;
    assert!(registry.is_empty());
    // Second call is a no-op
    registry.shutdown_all().await;
}

#[test]
fn cleanup_callbacks_run_exactly_once() {
    static CALLS: AtomicU32 = AtomicU32::new(0);
    let registry = CleanupRegistry::new();
    registry.register("bump", || {
        CALLS.fetch_add(1, Ordering::SeqCst);
    });
    registry.register("bump again", || {
        CALLS.fetch_add(1, Ordering::SeqCst);
    });

    registry.run_all();
    registry.run_all();
    assert_eq!(CALLS.load(Ordering::SeqCst), 2);
}

#[test]
fn callbacks_registered_after_run_still_run_on_next_pass() {
    static CALLS: AtomicU32 = AtomicU32::new(0);
    let registry = CleanupRegistry::new();
    registry.run_all();
    registry.register("late", || {
        CALLS.fetch_add(1, Ordering::SeqCst);
    });
    registry.run_all();
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);
}
