// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-granularity advisory locks.
//!
//! Lock identity is the normalized absolute path. Each lock is backed by a
//! file under `<workDir>/.ralphy/locks/` created with exclusive-create
//! semantics, so acquisition linearizes through the filesystem even across
//! processes. Locks are advisory: nothing stops an external writer.

use crate::util::{sha256_hex, write_atomic};
use crate::RALPHY_DIR;
use parking_lot::Mutex;
use ralphy_core::{Clock, LockOwner};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default lifetime of a lock before it is considered stale.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(600);

/// Minimum gap between staleness sweeps.
const CLEANUP_INTERVAL_MS: u64 = 60_000;

/// In-memory registry ceiling before eviction kicks in.
const REGISTRY_CEILING: usize = 5_000;

/// Backoff cap between acquisition attempts.
const MAX_BACKOFF_MS: u64 = 5_000;

const DEFAULT_MAX_RETRIES: u32 = 5;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("lock payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// On-disk lock payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Epoch ms when the lock was (re)stamped.
    pub timestamp: u64,
    /// Lifetime in ms; the lock is live iff `now − timestamp < timeout`.
    pub timeout: u64,
    pub owner: LockOwner,
    #[serde(default)]
    pub refresh_count: u32,
}

impl LockInfo {
    fn is_live(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp) < self.timeout
    }
}

/// Process-wide lock authority. Construct once and share by reference.
pub struct LockManager<C: Clock> {
    clock: C,
    owner: LockOwner,
    timeout: Duration,
    locks: Mutex<HashMap<String, LockInfo>>,
    last_cleanup_ms: Mutex<u64>,
}

impl<C: Clock> LockManager<C> {
    pub fn new(clock: C) -> Self {
        let owner = LockOwner::current(&clock);
        Self {
            clock,
            owner,
            timeout: DEFAULT_LOCK_TIMEOUT,
            locks: Mutex::new(HashMap::new()),
            last_cleanup_ms: Mutex::new(0),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }

    /// Normalize a path into a lock name: absolute (relative paths are
    /// project-relative), `.`/`..` resolved, `/`-separated, lowercased on
    /// Windows.
    pub fn lock_name(path: &str, work_dir: &Path) -> String {
        use std::path::Component;

        let p = Path::new(path);
        let abs: PathBuf = if p.is_absolute() { p.to_path_buf() } else { work_dir.join(p) };
        let mut normalized = PathBuf::new();
        for component in abs.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    normalized.pop();
                }
                other => normalized.push(other.as_os_str()),
            }
        }
        let mut name = normalized.to_string_lossy().replace('\\', "/");
        if cfg!(windows) {
            name = name.to_lowercase();
        }
        name
    }

    fn lock_file(name: &str, work_dir: &Path) -> PathBuf {
        work_dir.join(RALPHY_DIR).join("locks").join(format!("{}.lock", sha256_hex(name.as_bytes())))
    }

    /// Acquire one lock, retrying with jittered exponential backoff.
    ///
    /// Returns `Ok(false)` when the lock stayed contended through all
    /// retries. With `reentrant`, re-acquiring our own live lock refreshes
    /// its timestamp instead of failing.
    pub async fn acquire(
        &self,
        path: &str,
        work_dir: &Path,
        max_retries: u32,
        reentrant: bool,
    ) -> Result<bool, LockError> {
        let name = Self::lock_name(path, work_dir);
        let file = Self::lock_file(&name, work_dir);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut attempt: u32 = 0;
        loop {
            self.periodic_cleanup(work_dir);

            match self.try_acquire_once(&name, &file, reentrant)? {
                Attempt::Acquired => return Ok(true),
                Attempt::OwnLockHeld => return Ok(false),
                Attempt::StaleStolen => continue, // does not consume an attempt
                Attempt::Contended => {
                    attempt += 1;
                    if attempt >= max_retries {
                        tracing::debug!(name, attempts = attempt, "lock acquisition gave up");
                        return Ok(false);
                    }
                    let base = (1u64 << attempt.min(12)) * 100;
                    let jitter = (rand::random::<u64>()) % 50;
                    let delay = (base + jitter).min(MAX_BACKOFF_MS);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    /// Acquire with the default retry budget, non-reentrant.
    pub async fn acquire_default(&self, path: &str, work_dir: &Path) -> Result<bool, LockError> {
        self.acquire(path, work_dir, DEFAULT_MAX_RETRIES, false).await
    }

    fn try_acquire_once(
        &self,
        name: &str,
        file: &Path,
        reentrant: bool,
    ) -> Result<Attempt, LockError> {
        let now = self.clock.epoch_ms();

        // Check the in-memory registry first
        {
            let mut locks = self.locks.lock();
            if let Some(info) = locks.get_mut(name) {
                if info.is_live(now) {
                    if info.owner == self.owner && reentrant {
                        info.timestamp = now;
                        info.refresh_count += 1;
                        let payload = serde_json::to_vec(&*info)?;
                        write_atomic(file, &payload)?;
                        return Ok(Attempt::Acquired);
                    }
                    return Ok(Attempt::OwnLockHeld);
                }
                locks.remove(name);
            }
        }

        // Exclusive create linearizes cross-process acquisition
        let info = LockInfo {
            timestamp: now,
            timeout: self.timeout.as_millis() as u64,
            owner: self.owner.clone(),
            refresh_count: 0,
        };
        match fs::OpenOptions::new().write(true).create_new(true).open(file) {
            Ok(f) => {
                use std::io::Write;
                let mut f = f;
                f.write_all(&serde_json::to_vec(&info)?)?;
                self.register(name.to_string(), info);
                Ok(Attempt::Acquired)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                // Steal empty, unparseable, or expired lock files
                let content = fs::read_to_string(file).unwrap_or_default();
                let stale = match serde_json::from_str::<LockInfo>(&content) {
                    Ok(existing) => !existing.is_live(now),
                    Err(_) => true,
                };
                if stale {
                    tracing::debug!(name, "removing stale lock file");
                    let _ = fs::remove_file(file);
                    Ok(Attempt::StaleStolen)
                } else {
                    Ok(Attempt::Contended)
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn register(&self, name: String, info: LockInfo) {
        let mut locks = self.locks.lock();
        if locks.len() >= REGISTRY_CEILING {
            let now = self.clock.epoch_ms();
            locks.retain(|_, i| i.is_live(now));
            // Still over: drop the oldest foreign locks, never our own
            while locks.len() >= REGISTRY_CEILING {
                let oldest = locks
                    .iter()
                    .filter(|(_, i)| i.owner != self.owner)
                    .min_by_key(|(_, i)| i.timestamp)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(key) => {
                        locks.remove(&key);
                    }
                    None => break,
                }
            }
        }
        locks.insert(name, info);
    }

    /// Release a lock we hold. Unknown or foreign locks are left alone.
    pub fn release(&self, path: &str, work_dir: &Path) -> Result<(), LockError> {
        let name = Self::lock_name(path, work_dir);
        let owned = {
            let mut locks = self.locks.lock();
            match locks.get(&name) {
                Some(info) if info.owner == self.owner => {
                    locks.remove(&name);
                    true
                }
                _ => false,
            }
        };
        if owned {
            let _ = fs::remove_file(Self::lock_file(&name, work_dir));
        }
        Ok(())
    }

    /// Acquire a set of locks atomically from the caller's perspective:
    /// on any failure, every lock acquired by this call is released.
    ///
    /// Deadlock avoidance across callers is the caller's job; sorting the
    /// paths lexicographically before calling is the canonical strategy.
    pub async fn acquire_many(
        &self,
        paths: &[String],
        work_dir: &Path,
    ) -> Result<bool, LockError> {
        let mut seen = std::collections::HashSet::new();
        let mut acquired: Vec<&String> = Vec::new();

        for path in paths {
            let name = Self::lock_name(path, work_dir);
            if !seen.insert(name) {
                continue;
            }
            match self.acquire_default(path, work_dir).await {
                Ok(true) => acquired.push(path),
                Ok(false) => {
                    for held in acquired {
                        self.release(held, work_dir)?;
                    }
                    return Ok(false);
                }
                Err(e) => {
                    for held in acquired {
                        self.release(held, work_dir)?;
                    }
                    return Err(e);
                }
            }
        }
        Ok(true)
    }

    pub fn release_many(&self, paths: &[String], work_dir: &Path) -> Result<(), LockError> {
        for path in paths {
            self.release(path, work_dir)?;
        }
        Ok(())
    }

    /// Drop every lock this process holds.
    pub fn clear_all(&self, work_dir: &Path) {
        let names: Vec<String> = {
            let mut locks = self.locks.lock();
            let ours: Vec<String> = locks
                .iter()
                .filter(|(_, i)| i.owner == self.owner)
                .map(|(k, _)| k.clone())
                .collect();
            for name in &ours {
                locks.remove(name);
            }
            ours
        };
        for name in names {
            let _ = fs::remove_file(Self::lock_file(&name, work_dir));
        }
    }

    /// Evict expired in-memory locks and unlink expired lock files.
    pub fn cleanup_stale(&self, work_dir: &Path) {
        let now = self.clock.epoch_ms();
        self.locks.lock().retain(|_, info| info.is_live(now));

        let dir = work_dir.join(RALPHY_DIR).join("locks");
        let Ok(entries) = fs::read_dir(&dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("lock") {
                continue;
            }
            let content = fs::read_to_string(&path).unwrap_or_default();
            let expired = match serde_json::from_str::<LockInfo>(&content) {
                Ok(info) => !info.is_live(now),
                Err(_) => true,
            };
            if expired {
                tracing::debug!(path = %path.display(), "removing expired lock file");
                let _ = fs::remove_file(&path);
            }
        }
    }

    fn periodic_cleanup(&self, work_dir: &Path) {
        let now = self.clock.epoch_ms();
        {
            let mut last = self.last_cleanup_ms.lock();
            if now.saturating_sub(*last) < CLEANUP_INTERVAL_MS {
                return;
            }
            *last = now;
        }
        self.cleanup_stale(work_dir);
    }

    /// True if this process currently holds the lock.
    pub fn holds(&self, path: &str, work_dir: &Path) -> bool {
        let name = Self::lock_name(path, work_dir);
        let now = self.clock.epoch_ms();
        self.locks
            .lock()
            .get(&name)
            .map(|i| i.owner == self.owner && i.is_live(now))
            .unwrap_or(false)
    }
}

enum Attempt {
    Acquired,
    /// A live lock exists (ours without reentrancy, or someone else's in
    /// this process's registry).
    OwnLockHeld,
    StaleStolen,
    Contended,
}

#[cfg(test)]
#[path = "locks_tests.rs"]
mod tests;
