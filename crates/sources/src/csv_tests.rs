// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const SAMPLE: &str = "id,title,done,group,desc\n1,Add login,0,1,\"Use OAuth\"\n2,\"Fix, bug\",1,0,\n";

#[test]
fn parses_sample() {
    let tasks = parse(SAMPLE).unwrap();
    assert_eq!(tasks.len(), 2);

    assert_eq!(tasks[0].id, "1");
    assert_eq!(tasks[0].title, "Add login");
    assert!(!tasks[0].completed);
    assert_eq!(tasks[0].parallel_group, Some(1));
    assert_eq!(tasks[0].body.as_deref(), Some("Use OAuth"));

    assert_eq!(tasks[1].id, "2");
    assert_eq!(tasks[1].title, "Fix, bug");
    assert!(tasks[1].completed);
    assert_eq!(tasks[1].parallel_group, None);
    assert_eq!(tasks[1].body, None);
}

#[test]
fn round_trip_is_byte_identical() {
    let tasks = parse(SAMPLE).unwrap();
    let written = write(&tasks);
    assert_eq!(written, SAMPLE);
    assert_eq!(parse(&written).unwrap(), tasks);
}

#[yare::parameterized(
    one = { "1", true },
    zero = { "0", false },
    true_upper = { "TRUE", true },
    true_lower = { "true", true },
    false_mixed = { "False", false },
    empty = { "", false },
)]
fn done_values(value: &str, expected: bool) {
    let content = format!("id,title,done,group,desc\n1,T,{},0,\n", value);
    let tasks = parse(&content).unwrap();
    assert_eq!(tasks[0].completed, expected);
}

#[test]
fn doubled_quotes_unescape() {
    let content = "id,title,done,group,desc\n1,\"say \"\"hi\"\"\",0,0,\n";
    let tasks = parse(content).unwrap();
    assert_eq!(tasks[0].title, "say \"hi\"");
    // And escape again on write
    assert!(write(&tasks).contains("\"say \"\"hi\"\"\""));
}

#[test]
fn quoted_field_may_span_lines() {
    let content = "id,title,done,group,desc\n1,\"two\nlines\",0,0,\n";
    let tasks = parse(content).unwrap();
    assert_eq!(tasks[0].title, "two\nlines");
}

#[test]
fn missing_trailing_fields_default() {
    let content = "id,title,done,group,desc\n7,Bare\n";
    let tasks = parse(content).unwrap();
    assert_eq!(tasks[0].id, "7");
    assert!(!tasks[0].completed);
    assert_eq!(tasks[0].parallel_group, None);
    assert_eq!(tasks[0].body, None);
}

#[test]
fn rejects_wrong_header() {
    assert!(parse("name,done\nfoo,1\n").is_err());
}

#[test]
fn empty_content_is_empty_list() {
    assert!(parse("").unwrap().is_empty());
}

#[test]
fn unterminated_quote_is_error() {
    assert!(parse("id,title,done,group,desc\n1,\"oops,0,0,\n").is_err());
}
