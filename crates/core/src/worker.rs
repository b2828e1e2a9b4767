// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process and worker identity.

use crate::clock::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies the process holding a lock: `<pid>-<processStart>`.
///
/// A lock manager constructs one at startup and stamps every acquisition
/// with it, so re-entry checks and staleness eviction can tell "ours" from
/// "theirs" across process restarts with recycled pids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockOwner(String);

impl LockOwner {
    /// Identity of the current process, stamped with its start time.
    pub fn current(clock: &impl Clock) -> Self {
        Self(format!("{}-{}", std::process::id(), clock.epoch_ms()))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a queue worker: `<pid>-<startMillis>-<random9>`.
///
/// The random suffix keeps workers distinct when several run in one process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn generate(clock: &impl Clock) -> Self {
        Self(format!("{}-{}-{}", std::process::id(), clock.epoch_ms(), nanoid::nanoid!(9)))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
