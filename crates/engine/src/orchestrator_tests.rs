// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::executor::ExecutorDeps;
use parking_lot::Mutex;
use ralphy_adapters::FakeEngine;
use ralphy_core::{CircuitBreaker, FakeClock, RetryPolicy, TaskState};
use ralphy_queue::{MemoryQueue, QueueConfig};
use ralphy_sources::TaskSource;
use ralphy_storage::{LockManager, PlanningCache, RepoFingerprinter, TaskStateManager};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn plan_for(file: &str) -> String {
    format!(
        "<ANALYSIS>a</ANALYSIS>\n<PLAN>\n1. step\n</PLAN>\n<FILES>\n{file}\n</FILES>\n\
         <OPTIMIZATION>o</OPTIMIZATION>"
    )
}

struct Harness {
    dir: TempDir,
    engine: Arc<FakeEngine>,
    orchestrator: Orchestrator<FakeEngine, MemoryQueue<FakeClock>, FakeClock>,
}

fn harness_with(source_name: &str, content: &str, max_attempts: u32) -> Harness {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(source_name), content).unwrap();

    let clock = FakeClock::at_epoch_ms(1_000_000);
    let source = TaskSource::open(dir.path().join(source_name)).unwrap();
    let state = TaskStateManager::open(dir.path(), &source, clock.clone());

    let engine = Arc::new(FakeEngine::new());
    let deps = ExecutorDeps {
        engine: Arc::clone(&engine),
        clock: clock.clone(),
        work_dir: dir.path().to_path_buf(),
        locks: Arc::new(LockManager::new(clock.clone())),
        breaker: Arc::new(Mutex::new(CircuitBreaker::new(clock.clone()))),
        fingerprinter: Arc::new(RepoFingerprinter::new(clock.clone())),
        planning_cache: Arc::new(Mutex::new(
            PlanningCache::load(dir.path(), clock.clone()).unwrap(),
        )),
        state: Arc::new(tokio::sync::Mutex::new(state)),
        source,
        retry_policy: RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            jitter_factor: 0.0,
        },
        cancel: CancellationToken::new(),
    };
    let executor = crate::executor::TaskExecutor::new(deps);
    let queue = Arc::new(MemoryQueue::new(
        QueueConfig { max_attempts },
        clock,
    ));
    let orchestrator = Orchestrator::new(executor, queue, OrchestratorConfig::default());
    Harness { dir, engine, orchestrator }
}

#[tokio::test]
async fn runs_all_tasks_to_completion() {
    let h = harness_with("tasks.md", "- [ ] Add login\n- [ ] Fix bug\n", 3);
    // Two tasks, each planning then executing
    h.engine.push_result(&plan_for("src/a.rs"));
    h.engine.push_lines(&[
        r#"{"type":"result","result":"ok","usage":{"input_tokens":10,"output_tokens":4}}"#,
    ]);
    h.engine.push_result(&plan_for("src/b.rs"));
    h.engine.push_lines(&[
        r#"{"type":"result","result":"ok","usage":{"input_tokens":6,"output_tokens":2}}"#,
    ]);

    let summary = h.orchestrator.run().await.unwrap();
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.tokens.input, 16);

    let tasks_md = std::fs::read_to_string(h.dir.path().join("tasks.md")).unwrap();
    assert_eq!(tasks_md, "- [x] Add login\n- [x] Fix bug\n");

    let stats = h.orchestrator.queue.get_stats().await.unwrap();
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn already_completed_tasks_are_not_enqueued() {
    let h = harness_with("tasks.md", "- [x] Done already\n- [ ] Remaining\n", 3);
    h.engine.push_result(&plan_for("src/a.rs"));
    h.engine.push_result("ok");

    let summary = h.orchestrator.run().await.unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(h.engine.calls(), 2, "only the remaining task touched the engine");
}

#[tokio::test]
async fn failing_task_exhausts_queue_budget() {
    let h = harness_with("tasks.md", "- [ ] Flaky\n", 2);
    h.engine.push_result(&plan_for("src/a.rs"));
    h.engine.push_failure(ralphy_core::TaskError::timeout("operation timeout"));
    // Second queue attempt uses the cached plan, then fails again
    h.engine.push_failure(ralphy_core::TaskError::timeout("operation timeout"));

    let summary = h.orchestrator.run().await.unwrap();
    assert_eq!(summary.completed, 0);
    assert_eq!(summary.failed, 1);

    let state = h.orchestrator.executor.state().lock().await;
    let entry = state.get("1").unwrap();
    assert_eq!(entry.state, TaskState::Failed);
    assert_eq!(entry.error_history.len(), 2);
    drop(state);

    let stats = h.orchestrator.queue.get_stats().await.unwrap();
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn auth_failure_aborts_the_run() {
    let h = harness_with("tasks.md", "- [ ] First\n- [ ] Second\n", 3);
    h.engine.push_result(&plan_for("src/a.rs"));
    h.engine.push_failure(ralphy_core::TaskError::auth("not authenticated"));

    let err = h.orchestrator.run().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Fatal(_)));
}

#[tokio::test]
async fn parallel_group_runs_as_one_batch() {
    let content = r#"{"tasks": [
        {"id": "a", "title": "A", "parallel_group": 1},
        {"id": "b", "title": "B", "parallel_group": 1}
    ]}"#;
    let h = harness_with("tasks.json", content, 3);
    // The batch interleaves engine calls nondeterministically, so every
    // scripted response is a valid plan naming a distinct file: planning
    // calls get usable plans, execution calls treat the text as output
    for file in ["src/a.rs", "src/b.rs", "src/c.rs", "src/d.rs"] {
        h.engine.push_result(&plan_for(file));
    }

    let summary = h.orchestrator.run().await.unwrap();
    assert_eq!(summary.completed, 2);
}

#[tokio::test]
async fn dry_run_only_plans() {
    let h = harness_with("tasks.md", "- [ ] Only plan me\n", 3);
    h.engine.push_result(&plan_for("src/a.rs"));

    let config = OrchestratorConfig { dry_run: true, ..OrchestratorConfig::default() };
    let orchestrator = Orchestrator {
        executor: h.orchestrator.executor,
        queue: h.orchestrator.queue,
        config,
    };

    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.completed, 0);
    assert_eq!(h.engine.calls(), 1, "planning only");

    // Source untouched
    let tasks_md = std::fs::read_to_string(h.dir.path().join("tasks.md")).unwrap();
    assert_eq!(tasks_md, "- [ ] Only plan me\n");
}
