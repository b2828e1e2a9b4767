// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CSV task lists: header `id,title,done,group,desc`.
//!
//! Values may be quoted with `"`; inner quotes are doubled. Quoted fields
//! may span lines. Missing trailing fields default to empty/0.

use crate::error::SourceError;
use ralphy_core::Task;

const HEADER: &str = "id,title,done,group,desc";

/// Split content into records of fields, honoring quoting.
fn read_records(content: &str) -> Result<Vec<Vec<String>>, SourceError> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => {
                if field.is_empty() {
                    in_quotes = true;
                } else {
                    return Err(SourceError::parse("csv", "quote inside unquoted field"));
                }
            }
            ',' => {
                fields.push(std::mem::take(&mut field));
            }
            '\r' => {} // swallow; \n terminates the record
            '\n' => {
                fields.push(std::mem::take(&mut field));
                if !(fields.len() == 1 && fields[0].is_empty()) {
                    records.push(std::mem::take(&mut fields));
                } else {
                    fields.clear();
                }
            }
            _ => field.push(c),
        }
    }
    if in_quotes {
        return Err(SourceError::parse("csv", "unterminated quoted field"));
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push(fields);
    }
    Ok(records)
}

fn parse_done(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "1" | "true")
}

pub fn parse(content: &str) -> Result<Vec<Task>, SourceError> {
    let mut records = read_records(content)?.into_iter();
    // Header row is required but tolerated verbatim only
    match records.next() {
        Some(header) if header.join(",") == HEADER => {}
        Some(_) => return Err(SourceError::parse("csv", format!("expected header `{HEADER}`"))),
        None => return Ok(Vec::new()),
    }

    let mut tasks = Vec::new();
    for record in records {
        let get = |i: usize| record.get(i).map(String::as_str).unwrap_or_default();
        let id = get(0);
        if id.is_empty() {
            continue;
        }
        let group: u32 = get(3).parse().unwrap_or(0);
        let desc = get(4);
        tasks.push(Task {
            id: id.to_string(),
            title: get(1).to_string(),
            body: (!desc.is_empty()).then(|| desc.to_string()),
            parallel_group: (group != 0).then_some(group),
            completed: parse_done(get(2)),
        });
    }
    Ok(tasks)
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        quote(field)
    } else {
        field.to_string()
    }
}

pub fn write(tasks: &[Task]) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for task in tasks {
        // desc is always quoted when present; the other fields only as needed
        let desc = task.body.as_deref().unwrap_or_default();
        let row = [
            escape(&task.id),
            escape(&task.title),
            if task.completed { "1".to_string() } else { "0".to_string() },
            task.parallel_group.unwrap_or(0).to_string(),
            if desc.is_empty() { String::new() } else { quote(desc) },
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

#[cfg(test)]
#[path = "csv_tests.rs"]
mod tests;
