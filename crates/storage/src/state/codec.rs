// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State-file codecs. The on-disk format follows the task source format,
//! so a Markdown task list gets a Markdown state file next to it.

use super::{StateError, StateFile};
use indexmap::IndexMap;
use ralphy_core::{ExecutionContext, TaskState, TaskStateEntry};
use ralphy_sources::SourceFormat;

pub(crate) fn encode(format: SourceFormat, file: &StateFile) -> Result<String, StateError> {
    match format {
        SourceFormat::Json => {
            let mut out = serde_json::to_string_pretty(file)
                .map_err(|e| StateError::Codec(e.to_string()))?;
            out.push('\n');
            Ok(out)
        }
        SourceFormat::Yaml => {
            serde_yaml::to_string(file).map_err(|e| StateError::Codec(e.to_string()))
        }
        SourceFormat::Csv => Ok(encode_csv(file)),
        SourceFormat::Markdown => Ok(encode_markdown(file)),
    }
}

pub(crate) fn decode(format: SourceFormat, content: &str) -> Result<StateFile, StateError> {
    match format {
        SourceFormat::Json => {
            serde_json::from_str(content).map_err(|e| StateError::Codec(e.to_string()))
        }
        SourceFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| StateError::Codec(e.to_string()))
        }
        SourceFormat::Csv => decode_csv(content),
        SourceFormat::Markdown => decode_markdown(content),
    }
}

const CSV_HEADER: &str = "key,id,title,state,attempts,last_attempt_ms,errors,branch,worktree,sandbox";

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn encode_csv(file: &StateFile) -> String {
    let mut out = format!("# version={} updated={}\n{}\n", file.version, file.last_updated, CSV_HEADER);
    for (key, entry) in &file.tasks {
        let ctx = entry.execution_context.clone().unwrap_or_default();
        let errors = serde_json::to_string(&entry.error_history).unwrap_or_else(|_| "[]".into());
        let row = [
            csv_escape(key),
            csv_escape(&entry.id),
            csv_escape(&entry.title),
            entry.state.to_string(),
            entry.attempt_count.to_string(),
            entry.last_attempt_ms.map(|v| v.to_string()).unwrap_or_default(),
            csv_escape(&errors),
            csv_escape(ctx.branch.as_deref().unwrap_or_default()),
            csv_escape(ctx.worktree.as_deref().unwrap_or_default()),
            csv_escape(ctx.sandbox.as_deref().unwrap_or_default()),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Minimal record splitter for the state CSV (no embedded newlines needed
/// beyond quoted error payloads).
fn split_csv_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (in_quotes, c) {
            (true, '"') if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            (true, '"') => in_quotes = false,
            (true, _) => field.push(c),
            (false, '"') => in_quotes = true,
            (false, ',') => fields.push(std::mem::take(&mut field)),
            (false, _) => field.push(c),
        }
    }
    fields.push(field);
    fields
}

fn decode_csv(content: &str) -> Result<StateFile, StateError> {
    let mut version = super::STATE_VERSION;
    let mut last_updated = String::new();
    let mut tasks = IndexMap::new();

    for line in content.lines() {
        if let Some(meta) = line.strip_prefix("# ") {
            for part in meta.split_whitespace() {
                if let Some(v) = part.strip_prefix("version=") {
                    version = v.parse().unwrap_or(super::STATE_VERSION);
                } else if let Some(u) = part.strip_prefix("updated=") {
                    last_updated = u.to_string();
                }
            }
            continue;
        }
        if line.is_empty() || line == CSV_HEADER {
            continue;
        }
        let fields = split_csv_row(line);
        let get = |i: usize| fields.get(i).map(String::as_str).unwrap_or_default();
        let state = TaskState::parse(get(3))
            .ok_or_else(|| StateError::Codec(format!("bad state value `{}`", get(3))))?;
        let error_history: Vec<String> = serde_json::from_str(get(6)).unwrap_or_default();
        let context = ExecutionContext {
            branch: non_empty(get(7)),
            worktree: non_empty(get(8)),
            sandbox: non_empty(get(9)),
        };
        tasks.insert(
            get(0).to_string(),
            TaskStateEntry {
                id: get(1).to_string(),
                title: get(2).to_string(),
                state,
                attempt_count: get(4).parse().unwrap_or(0),
                last_attempt_ms: get(5).parse().ok(),
                error_history,
                execution_context: (!context.is_empty()).then_some(context),
            },
        );
    }
    Ok(StateFile { version, last_updated, tasks })
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn md_escape(field: &str) -> String {
    field.replace('\\', "\\\\").replace('|', "\\|")
}

fn md_unescape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

const MD_COLUMNS: usize = 9;

fn encode_markdown(file: &StateFile) -> String {
    let mut out = String::from("# Task State\n\n");
    out.push_str(&format!("<!-- version: {} -->\n", file.version));
    out.push_str(&format!("<!-- updated: {} -->\n\n", file.last_updated));
    out.push_str("| key | title | state | attempts | last_attempt_ms | errors | branch | worktree | sandbox |\n");
    out.push_str("| --- | --- | --- | --- | --- | --- | --- | --- | --- |\n");
    for (key, entry) in &file.tasks {
        let ctx = entry.execution_context.clone().unwrap_or_default();
        let errors = serde_json::to_string(&entry.error_history).unwrap_or_else(|_| "[]".into());
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} |\n",
            md_escape(key),
            md_escape(&entry.title),
            entry.state,
            entry.attempt_count,
            entry.last_attempt_ms.map(|v| v.to_string()).unwrap_or_default(),
            md_escape(&errors),
            md_escape(ctx.branch.as_deref().unwrap_or_default()),
            md_escape(ctx.worktree.as_deref().unwrap_or_default()),
            md_escape(ctx.sandbox.as_deref().unwrap_or_default()),
        ));
    }
    out
}

/// Split a table row on unescaped pipes, trimming cell padding.
fn split_md_row(line: &str) -> Vec<String> {
    let inner = line.trim().trim_start_matches('|').trim_end_matches('|');
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                cell.push(c);
                if let Some(next) = chars.next() {
                    cell.push(next);
                }
            }
            '|' => cells.push(std::mem::take(&mut cell)),
            _ => cell.push(c),
        }
    }
    cells.push(cell);
    cells.iter().map(|c| md_unescape(c.trim())).collect()
}

fn decode_markdown(content: &str) -> Result<StateFile, StateError> {
    let mut version = super::STATE_VERSION;
    let mut last_updated = String::new();
    let mut tasks = IndexMap::new();
    let mut header_seen = false;

    for line in content.lines() {
        if let Some(v) = line.strip_prefix("<!-- version: ").and_then(|s| s.strip_suffix(" -->")) {
            version = v.trim().parse().unwrap_or(super::STATE_VERSION);
            continue;
        }
        if let Some(u) = line.strip_prefix("<!-- updated: ").and_then(|s| s.strip_suffix(" -->")) {
            last_updated = u.trim().to_string();
            continue;
        }
        if !line.trim_start().starts_with('|') {
            continue;
        }
        if !header_seen {
            // Skip the header row and its `---` separator
            if line.contains("---") {
                header_seen = true;
            }
            continue;
        }
        let cells = split_md_row(line);
        if cells.len() < MD_COLUMNS {
            return Err(StateError::Codec(format!("malformed state row: {line}")));
        }
        let state = TaskState::parse(&cells[2])
            .ok_or_else(|| StateError::Codec(format!("bad state value `{}`", cells[2])))?;
        let key = cells[0].clone();
        let id = key.rsplit(':').next().unwrap_or_default().to_string();
        let context = ExecutionContext {
            branch: non_empty(&cells[6]),
            worktree: non_empty(&cells[7]),
            sandbox: non_empty(&cells[8]),
        };
        tasks.insert(
            key,
            TaskStateEntry {
                id,
                title: cells[1].clone(),
                state,
                attempt_count: cells[3].parse().unwrap_or(0),
                last_attempt_ms: cells[4].parse().ok(),
                error_history: serde_json::from_str(&cells[5]).unwrap_or_default(),
                execution_context: (!context.is_empty()).then_some(context),
            },
        );
    }
    Ok(StateFile { version, last_updated, tasks })
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
