// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task execution: claim → plan → lock → run → snapshot → record.
//!
//! The executor is the only place the five authorities meet. Locks are
//! always released on the way out, success or failure, and every outcome
//! is recorded in the state manager before control returns.

use crate::planner::{Planner, TaskPlan};
use crate::retry::{with_retry, RetryOptions};
use parking_lot::Mutex;
use ralphy_adapters::{EngineAdapter, EngineRequest, TokenTotals};
use ralphy_core::{
    CircuitBreaker, Clock, ErrorCode, RetryPolicy, Task, TaskError, TaskState,
};
use ralphy_sources::{SourceError, TaskSource};
use ralphy_storage::{
    HashStore, HashStoreError, LockError, LockManager, PlanningCache, PlanningCacheError,
    RepoFingerprinter, StateError, TaskStateManager,
};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("lock error: {0}")]
    Lock(#[from] LockError),
    #[error("hash store error: {0}")]
    HashStore(#[from] HashStoreError),
    #[error("planning cache error: {0}")]
    PlanningCache(#[from] PlanningCacheError),
    #[error("source error: {0}")]
    Source(#[from] SourceError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Authentication failures abort the whole run.
    #[error("fatal: {0}")]
    Fatal(TaskError),
}

/// What happened to one task.
#[derive(Debug)]
pub enum TaskOutcome {
    Completed { tokens: TokenTotals, files: Vec<String> },
    Failed { error: TaskError },
    /// The task was not pending in the state store; nothing ran.
    NotClaimed,
}

/// Everything the executor needs, wired once at startup.
pub struct ExecutorDeps<E, C: Clock> {
    pub engine: Arc<E>,
    pub clock: C,
    pub work_dir: PathBuf,
    pub locks: Arc<LockManager<C>>,
    pub breaker: Arc<Mutex<CircuitBreaker<C>>>,
    pub fingerprinter: Arc<RepoFingerprinter<C>>,
    pub planning_cache: Arc<Mutex<PlanningCache<C>>>,
    pub state: Arc<tokio::sync::Mutex<TaskStateManager<C>>>,
    pub source: TaskSource,
    pub retry_policy: RetryPolicy,
    pub cancel: CancellationToken,
}

/// Runs a single task end to end.
pub struct TaskExecutor<E, C: Clock> {
    deps: ExecutorDeps<E, C>,
    planner: Planner<E>,
}

impl<E: EngineAdapter, C: Clock> TaskExecutor<E, C> {
    pub fn new(deps: ExecutorDeps<E, C>) -> Self {
        let planner = Planner::new(Arc::clone(&deps.engine));
        Self { deps, planner }
    }

    pub fn source(&self) -> &TaskSource {
        &self.deps.source
    }

    pub fn state(&self) -> &Arc<tokio::sync::Mutex<TaskStateManager<C>>> {
        &self.deps.state
    }

    /// Plan without executing (dry runs and cache warming).
    pub async fn plan_only(&self, task: &Task) -> Result<TaskPlan, TaskError> {
        self.planner.plan(task, &self.deps.work_dir, None).await
    }

    /// Planned file set: a valid cache entry skips the engine call.
    async fn planned_files(&self, task: &Task) -> Result<Vec<String>, TaskError> {
        let fingerprint = self
            .deps
            .fingerprinter
            .fingerprint(&self.deps.work_dir)
            .map_err(TaskError::from)?;

        let cached = {
            let cache = self.deps.planning_cache.lock();
            cache.get(&task.id, &task.title, &fingerprint).map(<[String]>::to_vec)
        };
        if let Some(files) = cached {
            tracing::debug!(task = %task.id, "planned files served from cache");
            return Ok(files);
        }

        let plan = self.planner.plan(task, &self.deps.work_dir, None).await?;
        if let Err(e) = self.deps.planning_cache.lock().put(
            &task.id,
            &task.title,
            plan.files.clone(),
            fingerprint,
        ) {
            tracing::warn!(error = %e, "planning cache write failed");
        }
        Ok(plan.files)
    }

    fn execution_prompt(task: &Task, files: &[String]) -> String {
        let mut prompt = format!("Implement this task: {}\n", task.title);
        if let Some(body) = &task.body {
            prompt.push_str(&format!("Details: {}\n", body));
        }
        if !files.is_empty() {
            prompt.push_str("\nFiles you are expected to touch:\n");
            for file in files {
                prompt.push_str(&format!("- {}\n", file));
            }
        }
        prompt
    }

    /// Execute one task. `final_attempt` picks the failure transition:
    /// back to pending while the retry budget lasts, failed once it is gone.
    pub async fn execute(
        &self,
        task: &Task,
        final_attempt: bool,
    ) -> Result<TaskOutcome, ExecuteError> {
        {
            let mut state = self.deps.state.lock().await;
            if !state.claim_task_for_execution(&task.id)? {
                return Ok(TaskOutcome::NotClaimed);
            }
        }

        let files = match self.planned_files(task).await {
            Ok(files) => files,
            Err(error) => return self.record_failure(task, error, final_attempt).await,
        };

        // Sorted acquisition order avoids deadlock against other agents
        let mut lock_order = files.clone();
        lock_order.sort();
        if !self.deps.locks.acquire_many(&lock_order, &self.deps.work_dir).await? {
            let error = TaskError::new(
                ErrorCode::Timeout,
                format!("could not acquire locks for {} planned files", lock_order.len()),
            );
            return self.record_failure(task, error, final_attempt).await;
        }

        let result = self.run_engine(task, &files).await;

        let outcome = match result {
            Ok(tokens) => {
                if let Err(e) = self.snapshot_files(task, &files) {
                    tracing::warn!(task = %task.id, error = %e, "hash store snapshot failed");
                }
                // Source write-back stays under the state lock so parallel
                // completions serialize their read-modify-write
                let mut state = self.deps.state.lock().await;
                state.transition_state(&task.id, TaskState::Completed, None)?;
                self.deps.source.mark_complete(&task.id)?;
                drop(state);
                tracing::info!(
                    task = %task.id,
                    input_tokens = tokens.input,
                    output_tokens = tokens.output,
                    "task completed"
                );
                Ok(TaskOutcome::Completed { tokens, files: files.clone() })
            }
            Err(error) => self.record_failure(task, error, final_attempt).await,
        };

        self.deps.locks.release_many(&lock_order, &self.deps.work_dir)?;
        outcome
    }

    async fn run_engine(&self, task: &Task, files: &[String]) -> Result<TokenTotals, TaskError> {
        let prompt = Self::execution_prompt(task, files);
        let options = RetryOptions::new(Arc::clone(&self.deps.breaker))
            .with_policy(self.deps.retry_policy.clone())
            .with_cancel(self.deps.cancel.clone());

        let response = with_retry(&options, |attempt| {
            let request = EngineRequest::new(prompt.clone(), &self.deps.work_dir);
            let engine = Arc::clone(&self.deps.engine);
            async move {
                if attempt > 1 {
                    tracing::info!(task = %task.id, attempt, "re-running engine");
                }
                engine.run(request, None).await
            }
        })
        .await?;
        Ok(response.tokens)
    }

    /// Snapshot the planned files that exist after execution.
    fn snapshot_files(&self, task: &Task, files: &[String]) -> Result<(), ExecuteError> {
        let mut store = HashStore::open(&self.deps.work_dir, &task.id, self.deps.clock.clone())?;
        for file in files {
            let path = self.deps.work_dir.join(file);
            if path.is_file() {
                store.add_file(&path)?;
            }
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        task: &Task,
        error: TaskError,
        final_attempt: bool,
    ) -> Result<TaskOutcome, ExecuteError> {
        let mut state = self.deps.state.lock().await;
        if error.is_fatal() {
            state.transition_state(&task.id, TaskState::Failed, Some(&error.to_string()))?;
            tracing::error!(task = %task.id, error = %error, "fatal error, aborting run");
            return Err(ExecuteError::Fatal(error));
        }
        let next = if final_attempt { TaskState::Failed } else { TaskState::Pending };
        state.transition_state(&task.id, next, Some(&error.to_string()))?;
        tracing::warn!(task = %task.id, state = %next, error = %error, "task attempt failed");
        Ok(TaskOutcome::Failed { error })
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
