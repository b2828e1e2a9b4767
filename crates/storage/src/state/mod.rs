// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable task-state manager: the source of truth for task lifecycle.
//!
//! State lives at `<workDir>/.ralphy/task-state.<ext>` where the extension
//! follows the task source format. Persistence is atomic (temp file, then
//! rename) and versioned.

mod codec;

use crate::guard;
use crate::util::write_atomic;
use crate::RALPHY_DIR;
use indexmap::IndexMap;
use ralphy_core::{state_key, Clock, ExecutionContext, Task, TaskState, TaskStateEntry};
use ralphy_sources::{SourceFormat, TaskSource};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current state-file schema version.
pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file error: {0}")]
    Codec(String),
    #[error("state content error: {0}")]
    Guard(#[from] guard::GuardError),
    #[error("unknown task id: {id}")]
    UnknownTask { id: String },
}

/// Serialized shape of the state file.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct StateFile {
    pub version: u32,
    /// ISO-8601 timestamp of the last persist.
    pub last_updated: String,
    pub tasks: IndexMap<String, TaskStateEntry>,
}

/// Durable per-task state machine over one task source.
pub struct TaskStateManager<C: Clock> {
    state_path: PathBuf,
    format: SourceFormat,
    source_path: String,
    clock: C,
    entries: IndexMap<String, TaskStateEntry>,
}

impl<C: Clock> TaskStateManager<C> {
    pub fn open(work_dir: &Path, source: &TaskSource, clock: C) -> Self {
        let format = source.format();
        let state_path = work_dir
            .join(RALPHY_DIR)
            .join(format!("task-state.{}", format.extension()));
        Self {
            state_path,
            format,
            source_path: source.path().to_string_lossy().into_owned(),
            clock,
            entries: IndexMap::new(),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    fn key_for(&self, id: &str) -> String {
        state_key(self.format.source_type(), &self.source_path, id)
    }

    /// Merge the source task list with stored state.
    ///
    /// Stored entries for tasks no longer in the source are dropped, new
    /// tasks enter as pending, and anything found `running` is downgraded
    /// to pending with a fresh attempt count (crash recovery).
    pub fn initialize(&mut self, tasks: &[Task]) -> Result<(), StateError> {
        let stored = self.load_stored()?;
        let mut entries = IndexMap::new();
        for task in tasks {
            let key = self.key_for(&task.id);
            let mut entry = match stored.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let mut fresh = TaskStateEntry::new(&task.id, &task.title);
                    if task.completed {
                        fresh.state = TaskState::Completed;
                    }
                    fresh
                }
            };
            entry.title = task.title.clone();
            entry.recover_interrupted();
            entries.insert(task.id.clone(), entry);
        }
        let kept = entries.keys().filter(|id| stored.contains_key(&self.key_for(id))).count();
        if stored.len() > kept {
            tracing::debug!(dropped = stored.len() - kept, "dropped stored entries not in source");
        }
        self.entries = entries;
        self.persist()
    }

    fn load_stored(&self) -> Result<IndexMap<String, TaskStateEntry>, StateError> {
        let Ok(content) = std::fs::read_to_string(&self.state_path) else {
            return Ok(IndexMap::new());
        };
        guard::check_keys(&content)?;
        let file = codec::decode(self.format, &content)?;
        if file.version > STATE_VERSION {
            return Err(StateError::Codec(format!(
                "state file version {} is newer than supported {}",
                file.version, STATE_VERSION
            )));
        }
        Ok(file.tasks)
    }

    /// The only legitimate entry into `running`: true iff the entry was
    /// pending and the transition persisted.
    pub fn claim_task_for_execution(&mut self, id: &str) -> Result<bool, StateError> {
        let now = self.clock.epoch_ms();
        let Some(entry) = self.entries.get_mut(id) else {
            return Ok(false);
        };
        if entry.state != TaskState::Pending {
            return Ok(false);
        }
        entry.state = TaskState::Running;
        entry.attempt_count += 1;
        entry.last_attempt_ms = Some(now);
        self.persist()?;
        Ok(true)
    }

    /// Unrestricted transition, used by the executor to report outcomes.
    /// Appends to the error history when an error is supplied.
    pub fn transition_state(
        &mut self,
        id: &str,
        state: TaskState,
        error: Option<&str>,
    ) -> Result<(), StateError> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| StateError::UnknownTask { id: id.to_string() })?;
        tracing::debug!(id, from = %entry.state, to = %state, "task state transition");
        entry.state = state;
        if let Some(message) = error {
            entry.error_history.push(message.to_string());
        }
        self.persist()
    }

    /// Return a failed or skipped task to pending with a clean slate.
    pub fn reset_task(&mut self, id: &str) -> Result<bool, StateError> {
        let Some(entry) = self.entries.get_mut(id) else {
            return Err(StateError::UnknownTask { id: id.to_string() });
        };
        if !entry.state.is_resettable() {
            return Ok(false);
        }
        entry.state = TaskState::Pending;
        entry.attempt_count = 0;
        self.persist()?;
        Ok(true)
    }

    pub fn set_execution_context(
        &mut self,
        id: &str,
        context: ExecutionContext,
    ) -> Result<(), StateError> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| StateError::UnknownTask { id: id.to_string() })?;
        entry.execution_context = (!context.is_empty()).then_some(context);
        self.persist()
    }

    pub fn get(&self, id: &str) -> Option<&TaskStateEntry> {
        self.entries.get(id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &TaskStateEntry> {
        self.entries.values()
    }

    /// Ids currently claimable, in source order.
    pub fn pending_ids(&self) -> Vec<String> {
        self.entries
            .values()
            .filter(|e| e.state == TaskState::Pending)
            .map(|e| e.id.clone())
            .collect()
    }

    pub fn count_in(&self, state: TaskState) -> usize {
        self.entries.values().filter(|e| e.state == state).count()
    }

    fn persist(&self) -> Result<(), StateError> {
        let tasks: IndexMap<String, TaskStateEntry> = self
            .entries
            .iter()
            .map(|(id, entry)| (self.key_for(id), entry.clone()))
            .collect();
        let file = StateFile {
            version: STATE_VERSION,
            last_updated: chrono::DateTime::<chrono::Utc>::from(
                std::time::UNIX_EPOCH + std::time::Duration::from_millis(self.clock.epoch_ms()),
            )
            .to_rfc3339(),
            tasks,
        };
        let content = codec::encode(self.format, &file)?;
        write_atomic(&self.state_path, content.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
