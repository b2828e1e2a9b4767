// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The planner: asks the engine which files a task touches.
//!
//! The planning prompt requests a structured response in four delimited
//! sections; the parser is forgiving about formatting inside them. A
//! response that opens with a raw `tool_use` invocation means the engine
//! skipped planning and went straight to work, which is treated as
//! malformed and re-planned.

use ralphy_adapters::{EngineAdapter, EngineEvent, EngineRequest};
use ralphy_core::{ErrorCode, Task, TaskError};
use regex::Regex;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::mpsc;

/// Re-plans allowed before planning gives up.
pub const MAX_REPLANS: u32 = 3;

/// Backoff schedule after connection failures, capped at ten seconds.
const CONNECTION_BACKOFF: &[Duration] =
    &[Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(8)];

const BACKOFF_CAP: Duration = Duration::from_secs(10);

#[allow(clippy::expect_used)]
static SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(ANALYSIS|PLAN|FILES|OPTIMIZATION)>(.*?)</(?:ANALYSIS|PLAN|FILES|OPTIMIZATION)>")
        .expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static STEP_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d+[.)]\s+|[-*]\s+)(.+)$").expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static REWARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"reward:\s*(-?\d+(?:\.\d+)?)").expect("constant regex pattern is valid")
});

/// The planner's structured answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPlan {
    pub analysis: String,
    pub steps: Vec<String>,
    pub files: Vec<String>,
    pub optimization: String,
}

/// Planner progress phases, surfaced to UIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanPhase {
    Started,
    Thinking,
    Analyzing,
    Planning,
    Completed,
    Failed,
}

/// A progress callback payload; reward is mined from `reward: <float>`
/// patterns in the stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    pub phase: PlanPhase,
    pub reward: Option<f64>,
}

impl ProgressUpdate {
    fn phase(phase: PlanPhase) -> Self {
        Self { phase, reward: None }
    }
}

/// Build the planning prompt for a task.
pub fn planning_prompt(task: &Task) -> String {
    let mut prompt = format!(
        "Plan the implementation of this task without writing any files.\n\
         \n\
         Task: {}\n",
        task.title
    );
    if let Some(body) = &task.body {
        prompt.push_str(&format!("Details: {}\n", body));
    }
    prompt.push_str(
        "\nRespond with exactly four sections:\n\
         <ANALYSIS>what the task requires and where it touches the codebase</ANALYSIS>\n\
         <PLAN>numbered implementation steps</PLAN>\n\
         <FILES>one relative file path per line that you will create or modify</FILES>\n\
         <OPTIMIZATION>how to keep the change small and safe</OPTIMIZATION>\n",
    );
    prompt
}

fn extract_section(text: &str, name: &str) -> Option<String> {
    SECTION
        .captures_iter(text)
        .find(|caps| &caps[1] == name)
        .map(|caps| caps[2].trim().to_string())
}

/// Clean the FILES section: strip bullets, numbering, backticks, and `./`,
/// normalize separators, and deduplicate preserving order.
pub fn clean_file_list(section: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut files = Vec::new();
    for raw in section.lines() {
        let mut line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        if let Some(caps) = STEP_LINE.captures(line) {
            line = caps.get(1).map(|m| m.as_str()).unwrap_or(line);
        }
        let cleaned = line
            .trim_matches('`')
            .trim()
            .replace('\\', "/");
        let cleaned = cleaned.strip_prefix("./").unwrap_or(&cleaned).to_string();
        if cleaned.is_empty() {
            continue;
        }
        if seen.insert(cleaned.clone()) {
            files.push(cleaned);
        }
    }
    files
}

/// Extract ordered plan steps from numbered or bulleted lines.
pub fn extract_steps(section: &str) -> Vec<String> {
    section
        .lines()
        .filter_map(|line| STEP_LINE.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse a full structured response. `None` when no FILES section exists.
pub fn parse_plan(text: &str) -> Option<TaskPlan> {
    let files_section = extract_section(text, "FILES")?;
    Some(TaskPlan {
        analysis: extract_section(text, "ANALYSIS").unwrap_or_default(),
        steps: extract_section(text, "PLAN").map(|s| extract_steps(&s)).unwrap_or_default(),
        files: clean_file_list(&files_section),
        optimization: extract_section(text, "OPTIMIZATION").unwrap_or_default(),
    })
}

fn forward_progress(event: &EngineEvent, progress: &Option<mpsc::UnboundedSender<ProgressUpdate>>) {
    let Some(tx) = progress else {
        return;
    };
    match event {
        EngineEvent::Text { text } => {
            let reward = REWARD.captures(text).and_then(|c| c[1].parse().ok());
            let phase = if text.contains("<PLAN>") {
                PlanPhase::Planning
            } else if text.contains("<ANALYSIS>") {
                PlanPhase::Analyzing
            } else {
                PlanPhase::Thinking
            };
            let _ = tx.send(ProgressUpdate { phase, reward });
        }
        EngineEvent::StepStart { .. } => {
            let _ = tx.send(ProgressUpdate::phase(PlanPhase::Thinking));
        }
        _ => {}
    }
}

/// Plans tasks against an engine, re-planning on malformed output.
pub struct Planner<E> {
    engine: Arc<E>,
    max_replans: u32,
}

impl<E: EngineAdapter> Planner<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine, max_replans: MAX_REPLANS }
    }

    pub fn with_max_replans(mut self, max_replans: u32) -> Self {
        self.max_replans = max_replans;
        self
    }

    /// Produce a plan for the task. Purely advisory: never writes files.
    pub async fn plan(
        &self,
        task: &Task,
        cwd: &Path,
        progress: Option<mpsc::UnboundedSender<ProgressUpdate>>,
    ) -> Result<TaskPlan, TaskError> {
        let send = |update: ProgressUpdate| {
            if let Some(tx) = &progress {
                let _ = tx.send(update);
            }
        };
        send(ProgressUpdate::phase(PlanPhase::Started));

        let prompt = planning_prompt(task);
        let mut last_failure = String::new();

        for round in 0..=self.max_replans {
            if round > 0 {
                tracing::info!(task = %task.id, round, "re-planning after malformed output");
            }

            let (event_tx, mut event_rx) = mpsc::unbounded_channel::<EngineEvent>();
            let request = EngineRequest::new(prompt.clone(), cwd);

            // Pump events live; the channel closes when the run finishes
            let pump = {
                let progress = progress.clone();
                tokio::spawn(async move {
                    let mut first: Option<bool> = None;
                    while let Some(event) = event_rx.recv().await {
                        if first.is_none() {
                            first = Some(matches!(event, EngineEvent::ToolUse { .. }));
                        }
                        forward_progress(&event, &progress);
                    }
                    first.unwrap_or(false)
                })
            };

            let response = self.engine.run(request, Some(event_tx)).await;
            let tool_use_first = pump.await.unwrap_or(false);

            match response {
                Ok(response) => {
                    if tool_use_first {
                        last_failure =
                            "engine returned a tool_use invocation instead of a plan".to_string();
                        continue;
                    }
                    match parse_plan(&response.text) {
                        Some(plan) => {
                            send(ProgressUpdate::phase(PlanPhase::Completed));
                            return Ok(plan);
                        }
                        None => {
                            last_failure = "response had no <FILES> section".to_string();
                            continue;
                        }
                    }
                }
                Err(error) if error.is_connection() && round < self.max_replans => {
                    let backoff = CONNECTION_BACKOFF
                        .get(round as usize)
                        .copied()
                        .unwrap_or(BACKOFF_CAP)
                        .min(BACKOFF_CAP);
                    tracing::warn!(error = %error, backoff_s = backoff.as_secs(), "connection failure during planning");
                    tokio::time::sleep(backoff).await;
                    last_failure = error.message;
                    continue;
                }
                Err(error) => {
                    send(ProgressUpdate::phase(PlanPhase::Failed));
                    return Err(error);
                }
            }
        }

        send(ProgressUpdate::phase(PlanPhase::Failed));
        Err(TaskError::new(
            ErrorCode::Process,
            format!("Planning failed: {last_failure}"),
        ))
    }
}

#[cfg(test)]
#[path = "planner_tests.rs"]
mod tests;
