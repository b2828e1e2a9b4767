// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository fingerprinting for planning-cache invalidation.
//!
//! A fingerprint covers a fixed set of manifest files plus the sorted set of
//! top-level directory names. Manifest hashes are memoized by `(mtime, size)`
//! so repeated fingerprints of an unchanged repo never re-read content.

use crate::util::sha256_hex;
use parking_lot::Mutex;
use ralphy_core::Clock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Manifest files that participate in the fingerprint.
pub const KEY_FILES: &[&str] = &[
    "package.json",
    "pyproject.toml",
    "Cargo.toml",
    "go.mod",
    "requirements.txt",
    "pnpm-lock.yaml",
    "package-lock.json",
    "yarn.lock",
];

/// How long a computed fingerprint is reused per work dir.
const MEMO_TTL_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    pub mtime: u64,
    pub size: u64,
    pub hash: String,
}

/// Compact summary of repository manifests and top-level layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoFingerprint {
    pub file_states: BTreeMap<String, FileState>,
    pub dir_hash: String,
    pub timestamp: u64,
}

impl RepoFingerprint {
    /// Equality ignoring when the fingerprint was taken.
    pub fn matches(&self, other: &RepoFingerprint) -> bool {
        self.file_states == other.file_states && self.dir_hash == other.dir_hash
    }
}

/// Computes and memoizes fingerprints. One per process.
pub struct RepoFingerprinter<C: Clock> {
    clock: C,
    memo: Mutex<HashMap<PathBuf, (u64, RepoFingerprint)>>,
    content_memo: Mutex<HashMap<PathBuf, ((u64, u64), String)>>,
}

impl<C: Clock> RepoFingerprinter<C> {
    pub fn new(clock: C) -> Self {
        Self { clock, memo: Mutex::new(HashMap::new()), content_memo: Mutex::new(HashMap::new()) }
    }

    pub fn fingerprint(&self, work_dir: &Path) -> std::io::Result<RepoFingerprint> {
        let now = self.clock.epoch_ms();
        if let Some((computed_at, cached)) = self.memo.lock().get(work_dir) {
            if now.saturating_sub(*computed_at) < MEMO_TTL_MS {
                return Ok(cached.clone());
            }
        }

        let mut file_states = BTreeMap::new();
        for name in KEY_FILES {
            let path = work_dir.join(name);
            let Ok(meta) = fs::metadata(&path) else {
                continue;
            };
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            let size = meta.len();
            let hash = self.content_hash(&path, mtime, size)?;
            file_states.insert(name.to_string(), FileState { mtime, size, hash });
        }

        let mut top_dirs: Vec<String> = fs::read_dir(work_dir)?
            .flatten()
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        top_dirs.sort();

        let mut lines: Vec<String> =
            file_states.iter().map(|(k, v)| format!("{}:{}", k, v.hash)).collect();
        lines.sort();
        lines.extend(top_dirs);
        let dir_hash = sha256_hex(lines.join("\n").as_bytes());

        let fingerprint = RepoFingerprint { file_states, dir_hash, timestamp: now };
        self.memo.lock().insert(work_dir.to_path_buf(), (now, fingerprint.clone()));
        Ok(fingerprint)
    }

    fn content_hash(&self, path: &Path, mtime: u64, size: u64) -> std::io::Result<String> {
        {
            let memo = self.content_memo.lock();
            if let Some((state, hash)) = memo.get(path) {
                if *state == (mtime, size) {
                    return Ok(hash.clone());
                }
            }
        }
        let hash = sha256_hex(&fs::read(path)?);
        self.content_memo.lock().insert(path.to_path_buf(), ((mtime, size), hash.clone()));
        Ok(hash)
    }

    /// Drop the per-workdir memo (tests and explicit refresh).
    pub fn invalidate(&self, work_dir: &Path) {
        self.memo.lock().remove(work_dir);
    }
}

#[cfg(test)]
#[path = "fingerprint_tests.rs"]
mod tests;
