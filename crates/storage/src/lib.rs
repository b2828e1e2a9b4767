// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ralphy-storage: durable state for the orchestrator.
//!
//! Four authorities live here, each owning its own bytes on disk:
//! the task state manager (`<workDir>/.ralphy/task-state.<ext>`), the lock
//! manager (`<workDir>/.ralphy/locks/`), the content-addressed hash store
//! (`<workDir>/.ralphy-hashes/`), and the planning cache
//! (`<workDir>/.ralphy/planning-cache.json.gz`).

mod fingerprint;
mod guard;
mod hash_store;
mod locks;
mod planning_cache;
mod state;
mod util;

pub use fingerprint::{FileState, RepoFingerprint, RepoFingerprinter};
pub use guard::{parse_guarded, GuardError};
pub use hash_store::{HashMetadata, HashStore, HashStoreError, HashStoreStats};
pub use locks::{LockError, LockInfo, LockManager};
pub use planning_cache::{PlanningCache, PlanningCacheEntry, PlanningCacheError};
pub use state::{StateError, TaskStateManager};

/// Directory under the work dir holding orchestrator state.
pub const RALPHY_DIR: &str = ".ralphy";

/// Directory under the work dir holding per-task hash stores.
pub const HASHES_DIR: &str = ".ralphy-hashes";
