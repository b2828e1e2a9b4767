// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ralphy run`: wire the authorities together and drain the queue.

use crate::CommonArgs;
use anyhow::Context;
use clap::ValueEnum;
use parking_lot::Mutex;
use ralphy_adapters::{
    cleanup::install_signal_handlers, CleanupRegistry, CliEngine, CommandRunner, ProcessRegistry,
};
use ralphy_core::{CircuitBreaker, Priority, RetryPolicy, SystemClock};
use ralphy_engine::{ExecutorDeps, Orchestrator, OrchestratorConfig, RunSummary, TaskExecutor};
use ralphy_queue::{FileQueue, MemoryQueue, QueueConfig};
use ralphy_sources::TaskSource;
use ralphy_storage::{
    LockManager, PlanningCache, RepoFingerprinter, TaskStateManager, RALPHY_DIR,
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QueueKind {
    Memory,
    File,
}

#[derive(clap::Args)]
pub struct RunArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Engine binary driven as a subprocess
    #[arg(long, default_value = "claude")]
    engine: String,

    /// Extra arguments passed to the engine binary
    #[arg(long = "engine-arg")]
    engine_args: Vec<String>,

    /// Concurrency ceiling inside a parallel group
    #[arg(long, default_value_t = 2)]
    max_parallel: usize,

    /// Queue retry budget per task
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    /// Queue backend
    #[arg(long, value_enum, default_value_t = QueueKind::Memory)]
    queue: QueueKind,

    /// Run the engine without streaming (batch output)
    #[arg(long)]
    batch: bool,

    /// Plan tasks without executing
    #[arg(long)]
    dry_run: bool,
}

pub async fn run(args: RunArgs) -> anyhow::Result<ExitCode> {
    let work_dir = args
        .common
        .workdir
        .canonicalize()
        .with_context(|| format!("workdir {} not found", args.common.workdir.display()))?;
    let clock = SystemClock;

    let source =
        TaskSource::open(&args.common.tasks).context("unrecognized task source format")?;
    let state = TaskStateManager::open(&work_dir, &source, clock.clone());

    let processes = ProcessRegistry::new();
    let cleanups = CleanupRegistry::new();
    let signal_handle = install_signal_handlers(Arc::clone(&processes), Arc::clone(&cleanups));

    let runner = CommandRunner::new(Arc::clone(&processes));
    let mut engine = CliEngine::new(&args.engine, args.engine_args.clone(), runner);
    if args.batch {
        engine = engine.batch();
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        cleanups.register("cancel retries", move || cancel.cancel());
    }

    let deps = ExecutorDeps {
        engine: Arc::new(engine),
        clock: clock.clone(),
        work_dir: work_dir.clone(),
        locks: Arc::new(LockManager::new(clock.clone())),
        breaker: Arc::new(Mutex::new(CircuitBreaker::new(clock.clone()))),
        fingerprinter: Arc::new(RepoFingerprinter::new(clock.clone())),
        planning_cache: Arc::new(Mutex::new(
            PlanningCache::load(&work_dir, clock.clone()).context("planning cache")?,
        )),
        state: Arc::new(tokio::sync::Mutex::new(state)),
        source,
        retry_policy: RetryPolicy::default(),
        cancel,
    };
    let executor = TaskExecutor::new(deps);

    let config = OrchestratorConfig {
        max_parallel: args.max_parallel,
        priority: Priority::Normal,
        dry_run: args.dry_run,
    };
    let queue_config = QueueConfig { max_attempts: args.max_attempts };

    let result = match args.queue {
        QueueKind::Memory => {
            let queue = Arc::new(MemoryQueue::new(queue_config, clock.clone()));
            Orchestrator::new(executor, queue, config).run().await
        }
        QueueKind::File => {
            let path = work_dir.join(RALPHY_DIR).join("queue.json");
            let queue = Arc::new(FileQueue::open(&path, queue_config, clock.clone())?);
            Orchestrator::new(executor, queue, config).run().await
        }
    };
    signal_handle.abort();

    match result {
        Ok(summary) => {
            print_summary(&summary);
            Ok(if summary.failed == 0 { ExitCode::SUCCESS } else { ExitCode::from(2) })
        }
        Err(ralphy_engine::orchestrator::OrchestratorError::Fatal(error)) => {
            eprintln!("fatal: {error}");
            Ok(ExitCode::FAILURE)
        }
        Err(other) => Err(other.into()),
    }
}

fn print_summary(summary: &RunSummary) {
    println!(
        "completed {}  failed {}  skipped {}  tokens {}in/{}out",
        summary.completed,
        summary.failed,
        summary.skipped,
        summary.tokens.input,
        summary.tokens.output
    );
}
