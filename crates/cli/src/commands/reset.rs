// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ralphy reset`: return failed or skipped tasks to pending.

use crate::CommonArgs;
use anyhow::Context;
use ralphy_core::SystemClock;
use ralphy_sources::TaskSource;
use ralphy_storage::TaskStateManager;
use std::process::ExitCode;

#[derive(clap::Args)]
pub struct ResetArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Task id to reset
    task_id: String,
}

pub async fn reset(args: ResetArgs) -> anyhow::Result<ExitCode> {
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

    if state.reset_task(&args.task_id)? {
        println!("task {} is pending again", args.task_id);
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("task {} is not failed or skipped", args.task_id);
        Ok(ExitCode::FAILURE)
    }
}
