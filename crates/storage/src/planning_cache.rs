// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent cache of planned file lists, invalidated by repo fingerprint.
//!
//! Stored as gzipped JSON at `<workDir>/.ralphy/planning-cache.json.gz`.
//! The uncompressed legacy `.json` is still read and is deleted on the
//! next save.

use crate::fingerprint::RepoFingerprint;
use crate::guard;
use crate::util::write_atomic;
use crate::RALPHY_DIR;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use indexmap::IndexMap;
use ralphy_core::Clock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const CACHE_FILE: &str = "planning-cache.json.gz";
const LEGACY_CACHE_FILE: &str = "planning-cache.json";

#[derive(Debug, Error)]
pub enum PlanningCacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cache content error: {0}")]
    Guard(#[from] guard::GuardError),
}

/// One cached plan: the files the planner chose, under a given repo state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningCacheEntry {
    pub files: Vec<String>,
    pub timestamp: u64,
    pub repo_fingerprint: RepoFingerprint,
}

/// Cache keys are `sanitize(taskId:title)`: lowercase, `[a-z0-9.:_-]` kept,
/// everything else collapsed to `_`.
pub fn sanitize_key(task_id: &str, title: &str) -> String {
    format!("{}:{}", task_id, title)
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Planned-file cache for one work dir.
pub struct PlanningCache<C: Clock> {
    work_dir: PathBuf,
    clock: C,
    entries: IndexMap<String, PlanningCacheEntry>,
}

impl<C: Clock> PlanningCache<C> {
    pub fn load(work_dir: &Path, clock: C) -> Result<Self, PlanningCacheError> {
        let entries = Self::read_entries(work_dir)?;
        Ok(Self { work_dir: work_dir.to_path_buf(), clock, entries })
    }

    fn cache_path(work_dir: &Path) -> PathBuf {
        work_dir.join(RALPHY_DIR).join(CACHE_FILE)
    }

    fn legacy_path(work_dir: &Path) -> PathBuf {
        work_dir.join(RALPHY_DIR).join(LEGACY_CACHE_FILE)
    }

    fn read_entries(
        work_dir: &Path,
    ) -> Result<IndexMap<String, PlanningCacheEntry>, PlanningCacheError> {
        let path = Self::cache_path(work_dir);
        if let Ok(packed) = fs::read(&path) {
            let mut decoder = GzDecoder::new(packed.as_slice());
            let mut json = String::new();
            decoder.read_to_string(&mut json)?;
            return Ok(guard::parse_guarded(&json)?);
        }
        // Backward compatibility: plain JSON from older runs
        let legacy = Self::legacy_path(work_dir);
        if let Ok(json) = fs::read_to_string(&legacy) {
            tracing::debug!(path = %legacy.display(), "loading legacy planning cache");
            return Ok(guard::parse_guarded(&json)?);
        }
        Ok(IndexMap::new())
    }

    /// Look up a valid plan for the task. Entries whose fingerprint no
    /// longer matches the current repository state are misses.
    pub fn get(&self, task_id: &str, title: &str, current: &RepoFingerprint) -> Option<&[String]> {
        let entry = self.entries.get(&sanitize_key(task_id, title))?;
        if entry.repo_fingerprint.matches(current) {
            Some(&entry.files)
        } else {
            None
        }
    }

    /// Record a plan and persist the cache.
    pub fn put(
        &mut self,
        task_id: &str,
        title: &str,
        files: Vec<String>,
        fingerprint: RepoFingerprint,
    ) -> Result<(), PlanningCacheError> {
        self.entries.insert(
            sanitize_key(task_id, title),
            PlanningCacheEntry {
                files,
                timestamp: self.clock.epoch_ms(),
                repo_fingerprint: fingerprint,
            },
        );
        self.save()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn save(&self) -> Result<(), PlanningCacheError> {
        let json = serde_json::to_vec(&self.entries)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(6));
        encoder.write_all(&json)?;
        let packed = encoder.finish()?;
        write_atomic(&Self::cache_path(&self.work_dir), &packed)?;

        // The legacy file is superseded once a compressed save lands
        let legacy = Self::legacy_path(&self.work_dir);
        if legacy.exists() {
            let _ = fs::remove_file(&legacy);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "planning_cache_tests.rs"]
mod tests;
