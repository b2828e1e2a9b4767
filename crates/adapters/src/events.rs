// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine stream event parsing.
//!
//! The engine writes one JSON object per line on stdout, interleaved with
//! free text. Lines starting with `{` get bracket-balanced extraction of a
//! single complete object (tracking string escapes), validated against the
//! tagged union of known event variants; everything else stays plain text.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Action labels derived from tool names and commands.
pub const ACTION_LABELS: &[&str] = &[
    "Reading code",
    "Writing tests",
    "Implementing",
    "Linting",
    "Testing",
    "Staging",
    "Committing",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPart {
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub tokens: Option<TokenCounts>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Recognized engine events. Unknown variants stay free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    StepStart {
        #[serde(default)]
        tool: Option<String>,
        #[serde(default)]
        command: Option<String>,
    },
    StepFinish {
        #[serde(default)]
        part: Option<StepPart>,
        #[serde(default)]
        tokens: Option<TokenCounts>,
    },
    Text {
        #[serde(default)]
        text: String,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        is_error: bool,
    },
    ToolUse {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        input: Option<serde_json::Value>,
    },
    Result {
        #[serde(default)]
        usage: Option<Usage>,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
    },
}

/// Extract one complete JSON object from the start of `line`, tracking
/// string escapes. Returns the object slice and the remaining text.
pub fn extract_json_object(line: &str) -> Option<(&str, &str)> {
    if !line.starts_with('{') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = i + 1;
                    return Some((&line[..end], &line[end..]));
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a line into an event if it carries one. Free text and unknown
/// variants come back as `Text`; unparseable JSON is discarded as `None`.
pub fn parse_event_line(line: &str) -> Option<(EngineEvent, String)> {
    let trimmed = line.trim_start();
    let Some((object, remaining)) = extract_json_object(trimmed) else {
        return None;
    };
    match serde_json::from_str::<EngineEvent>(object) {
        Ok(event) => Some((event, remaining.to_string())),
        Err(_) => {
            // Valid JSON but not a recognized variant: preserve as text
            if serde_json::from_str::<serde_json::Value>(object).is_ok() {
                Some((EngineEvent::Text { text: object.to_string() }, remaining.to_string()))
            } else {
                None
            }
        }
    }
}

/// Map a tool name and optional command to an action label.
pub fn action_label(tool: &str, command: Option<&str>) -> Option<&'static str> {
    let command = command.unwrap_or_default().to_lowercase();
    if command.contains("git add") {
        return Some("Staging");
    }
    if command.contains("git commit") {
        return Some("Committing");
    }
    if command.contains("lint") || command.contains("clippy") {
        return Some("Linting");
    }
    if command.contains("test") || command.contains("pytest") {
        return Some("Testing");
    }
    match tool {
        "Read" | "Grep" | "Glob" => Some("Reading code"),
        "Write" | "Edit" => {
            if command.contains("test") {
                Some("Writing tests")
            } else {
                Some("Implementing")
            }
        }
        "Bash" => None,
        _ => None,
    }
}

#[allow(clippy::expect_used)]
static RATE_LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)rate limit|too many requests|quota exceeded|usage limit")
        .expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static CONNECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)connection refused|econnrefused|econnreset|network error|socket hang up|unable to connect")
        .expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static MODEL_NOT_FOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)model .*not found|unknown model").expect("constant regex pattern is valid")
});

/// Classify a free-text line as a structured error message, if it is one.
pub fn classify_text_error(line: &str) -> Option<String> {
    if RATE_LIMIT.is_match(line) {
        return Some(format!("rate limit reported by engine: {}", line.trim()));
    }
    if CONNECTION.is_match(line) {
        return Some(format!("connection failure reported by engine: {}", line.trim()));
    }
    if MODEL_NOT_FOUND.is_match(line) {
        return Some(format!("model not found: {}", line.trim()));
    }
    None
}

const AUTH_KEYWORDS: &[&str] = &[
    "not authenticated",
    "authentication failed",
    "authentication_failed",
    "please run /login",
    "invalid api key",
    "unauthorized",
    "401",
];

/// Pull an authentication failure out of an event, if present.
///
/// Candidates are `type == "error"` events, any event flagged
/// `is_error == true`, and `error == "authentication_failed"`; the message
/// must additionally match the keyword set.
pub fn auth_error(event: &EngineEvent) -> Option<String> {
    let message = match event {
        EngineEvent::Error { message, error, .. } => {
            if error.as_deref() == Some("authentication_failed") {
                return Some(
                    message.clone().unwrap_or_else(|| "authentication_failed".to_string()),
                );
            }
            message.clone().or_else(|| error.clone()).unwrap_or_default()
        }
        EngineEvent::Result { is_error: true, result, .. } => {
            result.clone().unwrap_or_default()
        }
        _ => return None,
    };
    let lower = message.to_lowercase();
    AUTH_KEYWORDS.iter().any(|k| lower.contains(k)).then_some(message)
}

/// Running totals extracted from the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenTotals {
    pub input: u64,
    pub output: u64,
}

/// Stateful parser over a full engine stream.
///
/// Feed lines in arrival order; it accumulates token counts, step labels,
/// plain text, structured errors, and the first authentication failure.
#[derive(Debug, Default)]
pub struct StreamParser {
    pub tokens: TokenTotals,
    pub steps: Vec<String>,
    pub text: String,
    pub errors: Vec<String>,
    pub auth_failure: Option<String>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one line, returning the event it carried (if any).
    pub fn feed(&mut self, line: &str) -> Option<EngineEvent> {
        let parsed = parse_event_line(line);
        let Some((event, _remaining)) = parsed else {
            // Plain free text: keep it, and mine it for error patterns
            if let Some(error) = classify_text_error(line) {
                self.errors.push(error);
            }
            self.push_text(line);
            return None;
        };

        if self.auth_failure.is_none() {
            self.auth_failure = auth_error(&event);
        }
        match &event {
            EngineEvent::StepStart { tool, command } => {
                if let Some(label) =
                    action_label(tool.as_deref().unwrap_or_default(), command.as_deref())
                {
                    self.steps.push(label.to_string());
                }
            }
            EngineEvent::StepFinish { part, tokens } => {
                let counts = part
                    .as_ref()
                    .and_then(|p| p.tokens.as_ref())
                    .or(tokens.as_ref());
                if let Some(counts) = counts {
                    self.tokens.input += counts.input;
                    self.tokens.output += counts.output;
                }
            }
            EngineEvent::Text { text } => {
                if let Some(error) = classify_text_error(text) {
                    self.errors.push(error);
                }
                self.push_text(text);
            }
            EngineEvent::Error { message, error, .. } => {
                let text = message.clone().or_else(|| error.clone()).unwrap_or_default();
                if !text.is_empty() {
                    self.errors.push(text);
                }
            }
            EngineEvent::ToolUse { .. } => {}
            EngineEvent::Result { usage, result, .. } => {
                if let Some(usage) = usage {
                    // Authoritative totals when present
                    self.tokens.input = usage.input_tokens;
                    self.tokens.output = usage.output_tokens;
                }
                if let Some(result) = result {
                    self.push_text(result);
                }
            }
        }
        Some(event)
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(text);
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
