// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ralphy status`: task lifecycle and queue counts.

use crate::CommonArgs;
use anyhow::Context;
use ralphy_core::{SystemClock, TaskState};
use ralphy_queue::{FileQueue, QueueConfig, TaskQueue};
use ralphy_sources::TaskSource;
use ralphy_storage::{TaskStateManager, RALPHY_DIR};
use std::process::ExitCode;

#[derive(clap::Args)]
pub struct StatusArgs {
    #[command(flatten)]
    common: CommonArgs,
}

pub async fn status(args: StatusArgs) -> anyhow::Result<ExitCode> {
    let work_dir = args
        .common
        .workdir
        .canonicalize()
        .with_context(|| format!("workdir {} not found", args.common.workdir.display()))?;

    let source =
        TaskSource::open(&args.common.tasks).context("unrecognized task source format")?;
    let tasks = source.load()?;

    let mut state = TaskStateManager::open(&work_dir, &source, SystemClock);
    state.initialize(&tasks)?;

    println!("tasks: {} total", tasks.len());
    for entry in state.entries() {
        let attempts = if entry.attempt_count > 0 {
            format!(" (attempts: {})", entry.attempt_count)
        } else {
            String::new()
        };
        let last_error = entry
            .error_history
            .last()
            .map(|e| format!(" — {e}"))
            .unwrap_or_default();
        println!("  [{}] {} {}{}{}", entry.state, entry.id, entry.title, attempts, last_error);
    }
    for kind in [
        TaskState::Pending,
        TaskState::Running,
        TaskState::Completed,
        TaskState::Failed,
        TaskState::Deferred,
        TaskState::Skipped,
    ] {
        let count = state.count_in(kind);
        if count > 0 {
            println!("{kind}: {count}");
        }
    }

    let queue_path = work_dir.join(RALPHY_DIR).join("queue.json");
    if queue_path.exists() {
        let queue = FileQueue::open(&queue_path, QueueConfig::default(), SystemClock)?;
        let stats = queue.get_stats().await?;
        println!(
            "queue: {} pending, {} running, {} completed, {} failed, {} skipped",
            stats.pending, stats.running, stats.completed, stats.failed, stats.skipped
        );
        queue.close().await?;
    }

    Ok(ExitCode::SUCCESS)
}
