// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run loop: queue and state manager kept consistent per task.
//!
//! Tasks sharing a `parallel_group` run concurrently up to `max_parallel`;
//! ungrouped tasks run alone. The queue decides retry budgets while the
//! state manager records lifecycle, and this loop is the only writer that
//! touches both.

use crate::executor::{ExecuteError, TaskExecutor, TaskOutcome};
use ralphy_adapters::{EngineAdapter, TokenTotals};
use ralphy_core::{Clock, Priority, QueueItem, TaskError};
use ralphy_queue::{QueueError, TaskQueue};
use ralphy_sources::SourceError;
use ralphy_storage::StateError;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("source error: {0}")]
    Source(#[from] SourceError),
    #[error("execution error: {0}")]
    Execute(#[from] ExecuteError),
    /// Authentication failure: the whole run aborts.
    #[error("{0}")]
    Fatal(TaskError),
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Concurrency ceiling within a parallel group.
    pub max_parallel: usize,
    /// Priority assigned to enqueued tasks.
    pub priority: Priority,
    /// Plan only; skip execution and leave all state untouched.
    pub dry_run: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { max_parallel: 2, priority: Priority::Normal, dry_run: false }
    }
}

/// Aggregate result of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub tokens: TokenTotals,
}

/// Drives tasks from the queue through the executor.
pub struct Orchestrator<E, Q, C: Clock> {
    executor: Arc<TaskExecutor<E, C>>,
    queue: Arc<Q>,
    config: OrchestratorConfig,
}

impl<E, Q, C> Orchestrator<E, Q, C>
where
    E: EngineAdapter + Send + Sync + 'static,
    Q: TaskQueue + 'static,
    C: Clock + 'static,
{
    pub fn new(executor: TaskExecutor<E, C>, queue: Arc<Q>, config: OrchestratorConfig) -> Self {
        Self { executor: Arc::new(executor), queue, config }
    }

    /// Load the source, reconcile state, enqueue pending work, and drain
    /// the queue to completion.
    pub async fn run(&self) -> Result<RunSummary, OrchestratorError> {
        let tasks = self.executor.source().load()?;
        {
            let mut state = self.executor.state().lock().await;
            state.initialize(&tasks)?;
            for task in &tasks {
                let claimable = state
                    .get(&task.id)
                    .map(|e| e.state == ralphy_core::TaskState::Pending)
                    .unwrap_or(false);
                if claimable {
                    self.queue.enqueue(task.clone(), self.config.priority).await?;
                }
            }
        }

        if self.config.dry_run {
            return self.dry_run().await;
        }

        let mut summary = RunSummary::default();
        loop {
            let Some(first) = self.queue.dequeue().await? else {
                break;
            };
            let batch = self.fill_batch(first).await?;
            self.run_batch(batch, &mut summary).await?;
        }
        self.queue.close().await?;
        Ok(summary)
    }

    /// Plan every queued task without executing anything.
    async fn dry_run(&self) -> Result<RunSummary, OrchestratorError> {
        let mut summary = RunSummary::default();
        while let Some(item) = self.queue.dequeue().await? {
            match self.executor.plan_only(&item.task).await {
                Ok(plan) => {
                    tracing::info!(
                        task = %item.task.id,
                        files = plan.files.len(),
                        "dry run: planned"
                    );
                    summary.skipped += 1;
                }
                Err(error) => {
                    tracing::warn!(task = %item.task.id, error = %error, "dry run: planning failed");
                    summary.failed += 1;
                }
            }
            self.queue.mark_skipped(item.task_id()).await?;
        }
        self.queue.close().await?;
        Ok(summary)
    }

    /// Group the dequeued item with queued peers from the same parallel
    /// group, up to the concurrency ceiling.
    async fn fill_batch(&self, first: QueueItem) -> Result<Vec<QueueItem>, OrchestratorError> {
        let mut batch = vec![first];
        let group = batch[0].task.parallel_group;
        if group.is_none() {
            return Ok(batch);
        }
        while batch.len() < self.config.max_parallel.max(1) {
            let Some(next) = self.queue.peek().await? else {
                break;
            };
            if next.task.parallel_group != group {
                break;
            }
            let Some(item) = self.queue.dequeue().await? else {
                break;
            };
            batch.push(item);
        }
        Ok(batch)
    }

    async fn run_batch(
        &self,
        batch: Vec<QueueItem>,
        summary: &mut RunSummary,
    ) -> Result<(), OrchestratorError> {
        let mut joins: JoinSet<(QueueItem, Result<TaskOutcome, ExecuteError>)> = JoinSet::new();
        for item in batch {
            let executor = Arc::clone(&self.executor);
            let final_attempt = item.attempts + 1 >= item.max_attempts;
            joins.spawn(async move {
                let outcome = executor.execute(&item.task, final_attempt).await;
                (item, outcome)
            });
        }

        while let Some(joined) = joins.join_next().await {
            let Ok((item, outcome)) = joined else {
                tracing::error!("executor task panicked");
                continue;
            };
            let id = item.task_id();
            match outcome {
                Ok(TaskOutcome::Completed { tokens, .. }) => {
                    self.queue.mark_complete(id).await?;
                    summary.completed += 1;
                    summary.tokens.input += tokens.input;
                    summary.tokens.output += tokens.output;
                }
                Ok(TaskOutcome::Failed { error }) => {
                    self.queue.mark_failed(id).await?;
                    let exhausted = item.attempts + 1 >= item.max_attempts;
                    if exhausted {
                        summary.failed += 1;
                    }
                    tracing::warn!(task = %id, error = %error, exhausted, "task failed");
                }
                Ok(TaskOutcome::NotClaimed) => {
                    self.queue.mark_skipped(id).await?;
                    summary.skipped += 1;
                }
                Err(ExecuteError::Fatal(error)) => {
                    // Abort everything; remaining joins are dropped
                    self.queue.mark_failed(id).await?;
                    let _ = self.queue.close().await;
                    return Err(OrchestratorError::Fatal(error));
                }
                Err(other) => return Err(other.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
