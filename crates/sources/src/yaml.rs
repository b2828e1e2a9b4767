// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! YAML task lists: `{tasks: [{title, completed?, parallel_group?, description?}]}`.
//!
//! Task id is the explicit `id` field, or the 1-based list index when absent.

use crate::error::SourceError;
use crate::json::IdValue;
use ralphy_core::Task;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Doc {
    #[serde(default)]
    tasks: Vec<Entry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<IdValue>,
    title: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parallel_group: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

pub fn parse(content: &str) -> Result<Vec<Task>, SourceError> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let doc: Doc =
        serde_yaml::from_str(content).map_err(|e| SourceError::parse("yaml", e.to_string()))?;
    Ok(doc
        .tasks
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

pub fn write(tasks: &[Task]) -> Result<String, SourceError> {
    let doc = Doc {
        tasks: tasks
            .iter()
            .enumerate()
            .map(|(i, task)| Entry {
                // Index-derived ids are left implicit so files stay minimal
                id: (task.id != (i + 1).to_string())
                    .then(|| IdValue::Str(task.id.clone())),
                title: task.title.clone(),
                completed: task.completed,
                parallel_group: task.parallel_group,
                description: task.body.clone(),
            })
            .collect(),
    };
    serde_yaml::to_string(&doc).map_err(|e| SourceError::parse("yaml", e.to_string()))
}

#[cfg(test)]
#[path = "yaml_tests.rs"]
mod tests;
