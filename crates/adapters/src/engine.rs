// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The engine adapter: drives an opaque external AI CLI.
//!
//! The engine binary is a black box that reads a prompt on stdin and writes
//! line-delimited JSON events on stdout. The adapter never writes files; it
//! returns the parsed stream for the caller to act on.

use crate::command::CommandRunner;
use crate::events::{EngineEvent, StreamParser, TokenTotals};
use async_trait::async_trait;
use ralphy_core::{ErrorCode, TaskError};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// One engine invocation.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub prompt: String,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
}

impl EngineRequest {
    pub fn new(prompt: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self { prompt: prompt.into(), cwd: cwd.into(), env: HashMap::new() }
    }
}

/// Parsed outcome of an engine invocation.
#[derive(Debug, Clone, Default)]
pub struct EngineResponse {
    /// Concatenated text and result payloads, in stream order.
    pub text: String,
    pub tokens: TokenTotals,
    pub steps: Vec<String>,
}

/// Drives an engine and parses its stream.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    /// Whether the engine emits events incrementally.
    fn supports_streaming(&self) -> bool {
        true
    }

    /// Run the engine to completion. Events are forwarded as they arrive
    /// when a sender is supplied.
    async fn run(
        &self,
        request: EngineRequest,
        events: Option<mpsc::UnboundedSender<EngineEvent>>,
    ) -> Result<EngineResponse, TaskError>;
}

fn normalize_command_error(error: crate::command::CommandError) -> TaskError {
    use crate::command::CommandError;
    match error {
        CommandError::Spawn { command, source }
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            TaskError::auth(format!("{command}: command not found"))
        }
        CommandError::InvalidCommand(_) | CommandError::UnsafeArgument(_) => {
            TaskError::validation(error.to_string())
        }
        other => TaskError::new(ErrorCode::Process, other.to_string()),
    }
}

/// Turn a finished parse into a response or the error it carried.
fn finish(
    parser: StreamParser,
    exit_code: i32,
    stderr_tail: Option<&str>,
) -> Result<EngineResponse, TaskError> {
    if let Some(message) = parser.auth_failure {
        return Err(TaskError::auth(message));
    }
    if exit_code != 0 {
        let detail = parser
            .errors
            .last()
            .cloned()
            .or_else(|| stderr_tail.map(str::to_string))
            .unwrap_or_else(|| format!("engine exited with code {exit_code}"));
        let mut error = TaskError::new(ErrorCode::Process, detail);
        if !parser.text.is_empty() {
            error = error.with_context(parser.text);
        }
        return Err(error);
    }
    Ok(EngineResponse { text: parser.text, tokens: parser.tokens, steps: parser.steps })
}

/// Engine adapter over a real CLI subprocess. The prompt goes in on stdin
/// so its content never has to pass argument validation.
pub struct CliEngine {
    binary: String,
    args: Vec<String>,
    runner: CommandRunner,
    streaming: bool,
}

impl CliEngine {
    pub fn new(binary: impl Into<String>, args: Vec<String>, runner: CommandRunner) -> Self {
        Self { binary: binary.into(), args, runner, streaming: true }
    }

    pub fn batch(mut self) -> Self {
        self.streaming = false;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

#[async_trait]
impl EngineAdapter for CliEngine {
    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn run(
        &self,
        request: EngineRequest,
        events: Option<mpsc::UnboundedSender<EngineEvent>>,
    ) -> Result<EngineResponse, TaskError> {
        let mut parser = StreamParser::new();

        if self.streaming {
            let exit_code = self
                .runner
                .exec_streaming(
                    &self.binary,
                    &self.args,
                    &request.cwd,
                    &request.env,
                    Some(&request.prompt),
                    |line| {
                        if let Some(event) = parser.feed(line) {
                            if let Some(tx) = &events {
                                let _ = tx.send(event);
                            }
                        }
                    },
                )
                .await
                .map_err(normalize_command_error)?;
            finish(parser, exit_code, None)
        } else {
            let result = self
                .runner
                .exec(&self.binary, &self.args, &request.cwd, &request.env, Some(&request.prompt))
                .await
                .map_err(normalize_command_error)?;
            for line in result.stdout.lines().filter(|l| !l.is_empty()) {
                if let Some(event) = parser.feed(line) {
                    if let Some(tx) = &events {
                        let _ = tx.send(event);
                    }
                }
            }
            let stderr_tail = result.stderr.lines().last().map(str::to_string);
            finish(parser, result.exit_code, stderr_tail.as_deref())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
enum FakeResponse {
    Lines(Vec<String>),
    Failure(TaskError),
}

/// Scripted engine for tests: each call pops the next canned response.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeEngine {
    responses: parking_lot::Mutex<std::collections::VecDeque<FakeResponse>>,
    prompts: parking_lot::Mutex<Vec<String>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeEngine {
    pub fn new() -> Self {
        Self {
            responses: parking_lot::Mutex::new(std::collections::VecDeque::new()),
            prompts: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Queue raw stdout lines for the next invocation.
    pub fn push_lines(&self, lines: &[&str]) {
        self.responses
            .lock()
            .push_back(FakeResponse::Lines(lines.iter().map(|s| s.to_string()).collect()));
    }

    /// Queue a plain result payload for the next invocation.
    pub fn push_result(&self, text: &str) {
        let event = serde_json::json!({ "type": "result", "result": text });
        self.responses.lock().push_back(FakeResponse::Lines(vec![event.to_string()]));
    }

    /// Queue an outright failure for the next invocation.
    pub fn push_failure(&self, error: TaskError) {
        self.responses.lock().push_back(FakeResponse::Failure(error));
    }

    /// Prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl EngineAdapter for FakeEngine {
    async fn run(
        &self,
        request: EngineRequest,
        events: Option<mpsc::UnboundedSender<EngineEvent>>,
    ) -> Result<EngineResponse, TaskError> {
        self.prompts.lock().push(request.prompt);
        let response = self
            .responses
            .lock()
            .pop_front()
            .ok_or_else(|| TaskError::validation("fake engine has no scripted response"))?;
        let lines = match response {
            FakeResponse::Lines(lines) => lines,
            FakeResponse::Failure(error) => return Err(error),
        };

        let mut parser = StreamParser::new();
        for line in &lines {
            if let Some(event) = parser.feed(line) {
                if let Some(tx) = &events {
                    let _ = tx.send(event);
                }
            }
        }
        finish(parser, 0, None)
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
