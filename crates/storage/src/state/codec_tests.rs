// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ralphy_core::TaskStateEntry;

fn sample_file() -> StateFile {
    let mut tasks = IndexMap::new();
    let mut entry = TaskStateEntry::new("1", "Add login");
    entry.state = TaskState::Failed;
    entry.attempt_count = 2;
    entry.last_attempt_ms = Some(1_234);
    entry.error_history = vec!["TIMEOUT: engine stalled".to_string(), "it, broke | badly".to_string()];
    entry.execution_context = Some(ExecutionContext {
        branch: Some("task/1".to_string()),
        worktree: None,
        sandbox: None,
    });
    tasks.insert("csv:/w/tasks.csv:1".to_string(), entry);

    let mut simple = TaskStateEntry::new("2", "Fix, bug | pipe");
    simple.state = TaskState::Pending;
    tasks.insert("csv:/w/tasks.csv:2".to_string(), simple);

    StateFile { version: 1, last_updated: "2026-08-01T00:00:00+00:00".to_string(), tasks }
}

#[yare::parameterized(
    json = { SourceFormat::Json },
    yaml = { SourceFormat::Yaml },
    csv = { SourceFormat::Csv },
    markdown = { SourceFormat::Markdown },
)]
fn round_trip(format: SourceFormat) {
    let file = sample_file();
    let encoded = encode(format, &file).unwrap();
    let decoded = decode(format, &encoded).unwrap();

    assert_eq!(decoded.version, file.version);
    assert_eq!(decoded.last_updated, file.last_updated);
    assert_eq!(decoded.tasks.len(), file.tasks.len());
    for (key, entry) in &file.tasks {
        let got = decoded.tasks.get(key).unwrap_or_else(|| panic!("missing {key}"));
        assert_eq!(got, entry, "format {format:?} key {key}");
    }
}

#[test]
fn json_is_versioned() {
    let encoded = encode(SourceFormat::Json, &sample_file()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
    assert_eq!(value["version"], 1);
    assert!(value["tasks"]["csv:/w/tasks.csv:1"]["state"].is_string());
}

#[test]
fn csv_rejects_bad_state() {
    let content = "# version=1 updated=now\nkey,id,title,state,attempts,last_attempt_ms,errors,branch,worktree,sandbox\nk,1,T,bogus,0,,[],,,\n";
    assert!(decode(SourceFormat::Csv, content).is_err());
}

#[test]
fn markdown_rejects_short_rows() {
    let content = "| key | title |\n| --- | --- |\n| k | t |\n";
    assert!(decode(SourceFormat::Markdown, content).is_err());
}
