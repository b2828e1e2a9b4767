// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Markdown checklist task lists.
//!
//! `- [ ] title` is pending, `- [x] title` (case-insensitive) is complete.
//! The file line number is the task id, so ids stay stable while other
//! prose surrounds the checklist.

use crate::error::SourceError;
use ralphy_core::Task;
use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static PENDING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^- \[ \] (.+)$").expect("constant regex pattern is valid"));

#[allow(clippy::expect_used)]
static COMPLETE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^- \[[xX]\] (.+)$").expect("constant regex pattern is valid"));

pub fn parse(content: &str) -> Vec<Task> {
    let mut tasks = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let line_no = i + 1;
        if let Some(caps) = PENDING.captures(line) {
            tasks.push(Task::new(line_no.to_string(), &caps[1]));
        } else if let Some(caps) = COMPLETE.captures(line) {
            tasks.push(Task { completed: true, ..Task::new(line_no.to_string(), &caps[1]) });
        }
    }
    tasks
}

pub fn write(tasks: &[Task]) -> String {
    let mut out = String::new();
    for task in tasks {
        let marker = if task.completed { "x" } else { " " };
        out.push_str(&format!("- [{}] {}\n", marker, task.title));
    }
    out
}

/// Flip one checklist line to complete, preserving every other line.
pub fn mark_complete(content: &str, id: &str) -> Result<String, SourceError> {
    let line_no: usize = id
        .parse()
        .map_err(|_| SourceError::UnknownTask { id: id.to_string() })?;

    let mut found = false;
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    if let Some(line) = lines.get_mut(line_no.saturating_sub(1)) {
        if let Some(caps) = PENDING.captures(line) {
            *line = format!("- [x] {}", &caps[1]);
            found = true;
        } else if COMPLETE.is_match(line) {
            // Already complete; idempotent
            found = true;
        }
    }
    if !found {
        return Err(SourceError::UnknownTask { id: id.to_string() });
    }

    let mut out = lines.join("\n");
    if content.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
#[path = "markdown_tests.rs"]
mod tests;
