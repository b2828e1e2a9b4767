// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task content-addressed file cache.
//!
//! Content lives under `<workDir>/.ralphy-hashes/<taskId>/content/<hash>[.gz]`
//! with a `<hash>.json` metadata sibling; the per-task index maps logical
//! relative paths to stored hashes and is rewritten after every mutation.
//! Identical bytes are stored once, and sibling task stores are probed so
//! unchanged files are never duplicated across tasks.

use crate::guard;
use crate::util::{hex, sha256_hex, write_atomic};
use crate::HASHES_DIR;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use indexmap::IndexMap;
use ralphy_core::Clock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Files at or above this size are gzipped.
const COMPRESS_THRESHOLD: u64 = 1024;

/// Files up to this size are hashed from a single read; larger ones stream.
const STREAM_THRESHOLD: u64 = 2 * 1024 * 1024;

/// Chunk size for the streaming hash path.
const STREAM_CHUNK: usize = 64 * 1024;

/// Index file name inside each task directory.
const INDEX_FILE: &str = ".ralphy-hashes-ref.json";

/// Default age after which global GC removes a task store.
pub const GC_MAX_AGE_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Error)]
pub enum HashStoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("index error: {0}")]
    Guard(#[from] guard::GuardError),
    #[error("file not tracked: {0}")]
    NotTracked(String),
}

/// Metadata stored beside each content blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashMetadata {
    pub original_path: String,
    pub hash: String,
    /// Stored (possibly compressed) size in bytes.
    pub size: u64,
    /// Source file mtime, epoch ms.
    pub mtime: u64,
    pub compressed: bool,
    pub original_size: u64,
    pub stored_at: u64,
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileRef {
    hash: String,
    hash_path: PathBuf,
    metadata_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct TaskHashIndex {
    task_id: String,
    files: IndexMap<String, FileRef>,
    created_at: u64,
    updated_at: u64,
}

/// Aggregate numbers reported by `stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HashStoreStats {
    pub total_files: usize,
    pub total_original_size: u64,
    pub total_compressed_size: u64,
    /// `1 − uniqueHashes / totalFiles`; 0 when nothing is stored.
    pub dedup_ratio: f64,
}

/// Content-addressed cache for one task.
pub struct HashStore<C: Clock> {
    work_dir: PathBuf,
    task_id: String,
    clock: C,
    index: TaskHashIndex,
}

impl<C: Clock> HashStore<C> {
    pub fn open(work_dir: &Path, task_id: &str, clock: C) -> Result<Self, HashStoreError> {
        let index_path = Self::index_path(work_dir, task_id);
        let index = match fs::read_to_string(&index_path) {
            Ok(content) => guard::parse_guarded(&content)?,
            Err(_) => {
                let now = clock.epoch_ms();
                TaskHashIndex {
                    task_id: task_id.to_string(),
                    files: IndexMap::new(),
                    created_at: now,
                    updated_at: now,
                }
            }
        };
        Ok(Self { work_dir: work_dir.to_path_buf(), task_id: task_id.to_string(), clock, index })
    }

    fn task_dir(work_dir: &Path, task_id: &str) -> PathBuf {
        work_dir.join(HASHES_DIR).join(task_id)
    }

    fn content_dir(&self) -> PathBuf {
        Self::task_dir(&self.work_dir, &self.task_id).join("content")
    }

    fn index_path(work_dir: &Path, task_id: &str) -> PathBuf {
        Self::task_dir(work_dir, task_id).join(INDEX_FILE)
    }

    fn relative_key(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.work_dir).unwrap_or(path);
        rel.to_string_lossy().replace('\\', "/")
    }

    /// Hash a file: single read up to the stream threshold, chunked above it.
    fn hash_file(path: &Path) -> Result<(String, u64), HashStoreError> {
        let meta = fs::metadata(path)?;
        if meta.len() <= STREAM_THRESHOLD {
            let bytes = fs::read(path)?;
            return Ok((sha256_hex(&bytes), meta.len()));
        }
        let mut hasher = Sha256::new();
        let mut file = fs::File::open(path)?;
        let mut buf = vec![0u8; STREAM_CHUNK];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok((hex(&hasher.finalize()), meta.len()))
    }

    /// Probe this task's store and then sibling task stores for the hash.
    fn find_existing(&self, hash: &str) -> Option<PathBuf> {
        for name in [format!("{hash}.gz"), hash.to_string()] {
            let candidate = self.content_dir().join(&name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        let root = self.work_dir.join(HASHES_DIR);
        let entries = fs::read_dir(&root).ok()?;
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy() == self.task_id {
                continue;
            }
            for name in [format!("{hash}.gz"), hash.to_string()] {
                let candidate = entry.path().join("content").join(&name);
                if candidate.exists() {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Add a file's current content to the store.
    pub fn add_file(&mut self, path: &Path) -> Result<HashMetadata, HashStoreError> {
        let (hash, original_size) = Self::hash_file(path)?;
        let mtime = fs::metadata(path)?
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let compress = original_size >= COMPRESS_THRESHOLD;
        let (hash_path, size, compressed) = match self.find_existing(&hash) {
            Some(existing) => {
                let size = fs::metadata(&existing).map(|m| m.len()).unwrap_or(0);
                let compressed = existing.extension().and_then(|e| e.to_str()) == Some("gz");
                tracing::debug!(hash = %hash, "content already stored, skipping write");
                (existing, size, compressed)
            }
            None => {
                let content_dir = self.content_dir();
                fs::create_dir_all(&content_dir)?;
                let bytes = fs::read(path)?;
                if compress {
                    let target = content_dir.join(format!("{hash}.gz"));
                    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(6));
                    encoder.write_all(&bytes)?;
                    let packed = encoder.finish()?;
                    let size = packed.len() as u64;
                    write_atomic(&target, &packed)?;
                    (target, size, true)
                } else {
                    let target = content_dir.join(&hash);
                    write_atomic(&target, &bytes)?;
                    (target, original_size, false)
                }
            }
        };

        let metadata = HashMetadata {
            original_path: self.relative_key(path),
            hash: hash.clone(),
            size,
            mtime,
            compressed,
            original_size,
            stored_at: self.clock.epoch_ms(),
            task_id: self.task_id.clone(),
        };
        let metadata_path = self.content_dir().join(format!("{hash}.json"));
        fs::create_dir_all(self.content_dir())?;
        write_atomic(&metadata_path, &serde_json::to_vec_pretty(&metadata)?)?;

        let key = self.relative_key(path);
        self.index.files.insert(
            key,
            FileRef { hash, hash_path, metadata_path },
        );
        self.persist_index()?;
        Ok(metadata)
    }

    fn persist_index(&mut self) -> Result<(), HashStoreError> {
        self.index.updated_at = self.clock.epoch_ms();
        let path = Self::index_path(&self.work_dir, &self.task_id);
        write_atomic(&path, &serde_json::to_vec_pretty(&self.index)?)?;
        Ok(())
    }

    pub fn has(&self, path: &Path) -> bool {
        self.index.files.contains_key(&self.relative_key(path))
    }

    pub fn get_hash(&self, path: &Path) -> Option<String> {
        self.index.files.get(&self.relative_key(path)).map(|r| r.hash.clone())
    }

    /// Recompute the file's hash and compare against the stored one.
    /// Untracked files count as changed.
    pub fn has_changed(&self, path: &Path) -> Result<bool, HashStoreError> {
        let Some(stored) = self.get_hash(path) else {
            return Ok(true);
        };
        let (current, _) = Self::hash_file(path)?;
        Ok(current != stored)
    }

    /// Load stored content and metadata for a tracked path.
    pub fn get(&self, path: &Path) -> Result<(Vec<u8>, HashMetadata), HashStoreError> {
        let key = self.relative_key(path);
        let file_ref = self
            .index
            .files
            .get(&key)
            .ok_or_else(|| HashStoreError::NotTracked(key.clone()))?;

        let metadata: HashMetadata =
            guard::parse_guarded(&fs::read_to_string(&file_ref.metadata_path)?)?;
        let raw = fs::read(&file_ref.hash_path)?;
        let content = if metadata.compressed {
            let mut decoder = GzDecoder::new(raw.as_slice());
            let mut out = Vec::with_capacity(metadata.original_size as usize);
            decoder.read_to_end(&mut out)?;
            out
        } else {
            raw
        };
        Ok((content, metadata))
    }

    pub fn stats(&self) -> HashStoreStats {
        let total_files = self.index.files.len();
        let unique: std::collections::HashSet<&str> =
            self.index.files.values().map(|r| r.hash.as_str()).collect();
        let mut original = 0u64;
        let mut compressed = 0u64;
        for file_ref in self.index.files.values() {
            if let Ok(content) = fs::read_to_string(&file_ref.metadata_path) {
                if let Ok(meta) = guard::parse_guarded::<HashMetadata>(&content) {
                    original += meta.original_size;
                    compressed += meta.size;
                }
            }
        }
        let dedup_ratio = if total_files == 0 {
            0.0
        } else {
            1.0 - unique.len() as f64 / total_files as f64
        };
        HashStoreStats {
            total_files,
            total_original_size: original,
            total_compressed_size: compressed,
            dedup_ratio,
        }
    }

    /// Remove this task's entire store.
    pub fn cleanup(self) -> Result<(), HashStoreError> {
        let dir = Self::task_dir(&self.work_dir, &self.task_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Remove task stores whose index has not been touched within `max_age_ms`.
    pub fn gc(work_dir: &Path, clock: &C, max_age_ms: u64) -> Result<usize, HashStoreError> {
        let root = work_dir.join(HASHES_DIR);
        let Ok(entries) = fs::read_dir(&root) else {
            return Ok(0);
        };
        let now = clock.epoch_ms();
        let mut removed = 0;
        for entry in entries.flatten() {
            let index_path = entry.path().join(INDEX_FILE);
            let updated_at = fs::read_to_string(&index_path)
                .ok()
                .and_then(|c| guard::parse_guarded::<TaskHashIndex>(&c).ok())
                .map(|i| i.updated_at);
            let stale = match updated_at {
                Some(updated) => now.saturating_sub(updated) > max_age_ms,
                None => false, // not a task store; leave it alone
            };
            if stale {
                tracing::info!(dir = %entry.path().display(), "garbage-collecting task store");
                fs::remove_dir_all(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "hash_store_tests.rs"]
mod tests;
