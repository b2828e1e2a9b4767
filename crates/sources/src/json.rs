// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON task lists: an array of task objects or `{tasks: [...]}`.
//!
//! Accepts `parallel_group` or `parallelGroup`, and `description` or `body`.

use crate::error::SourceError;
use ralphy_core::Task;
use serde::{Deserialize, Serialize};

/// Task ids appear as strings or numbers in the wild.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum IdValue {
    Int(u64),
    Str(String),
}

impl IdValue {
    pub(crate) fn into_string(self) -> String {
        match self {
            IdValue::Int(n) => n.to_string(),
            IdValue::Str(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Doc {
    Wrapped { tasks: Vec<Entry> },
    Bare(Vec<Entry>),
}

#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<IdValue>,
    title: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    completed: bool,
    #[serde(default, alias = "parallelGroup", skip_serializing_if = "Option::is_none")]
    parallel_group: Option<u32>,
    #[serde(default, alias = "body", skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

pub fn parse(content: &str) -> Result<Vec<Task>, SourceError> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let doc: Doc =
        serde_json::from_str(content).map_err(|e| SourceError::parse("json", e.to_string()))?;
    let entries = match doc {
        Doc::Wrapped { tasks } => tasks,
        Doc::Bare(tasks) => tasks,
    };
    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| Task {
            id: entry.id.map(|v| v.into_string()).unwrap_or_else(|| (i + 1).to_string()),
            title: entry.title,
            body: entry.description,
            parallel_group: entry.parallel_group,
            completed: entry.completed,
        })
        .collect())
}

#[derive(Serialize)]
struct DocOut {
    tasks: Vec<Entry>,
}

pub fn write(tasks: &[Task]) -> Result<String, SourceError> {
    let doc = DocOut {
        tasks: tasks
            .iter()
            .map(|task| Entry {
                id: Some(IdValue::Str(task.id.clone())),
                title: task.title.clone(),
                completed: task.completed,
                parallel_group: task.parallel_group,
                description: task.body.clone(),
            })
            .collect(),
    };
    let mut out = serde_json::to_string_pretty(&doc)
        .map_err(|e| SourceError::parse("json", e.to_string()))?;
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
#[path = "json_tests.rs"]
mod tests;
