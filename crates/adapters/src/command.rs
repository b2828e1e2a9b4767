// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution without a shell.
//!
//! Commands are always exec'd directly. The validator rejects shell
//! metacharacters anyway so a value that *would* have been dangerous under
//! a shell never reaches a child, and command names are held to a strict
//! allow-list. Children register with the process registry for shutdown.

use crate::cleanup::ProcessRegistry;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Sequences that mean shell substitution or chaining.
const DENIED_SEQUENCES: &[&str] = &["$(", "${", "&&", "||", ">>", "<<"];

/// Single characters with shell meaning.
const DENIED_CHARS: &[char] = &[';', '&', '|', '`', '$', '<', '>'];

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid command name `{0}`")]
    InvalidCommand(String),
    #[error("unsafe argument `{0}`")]
    UnsafeArgument(String),
    #[error("spawn failed for `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Command names allow only `[A-Za-z0-9._/-]` (plus `\` and `:` on Windows).
pub fn validate_command_name(name: &str) -> Result<(), CommandError> {
    let extra_ok = |c: char| cfg!(windows) && (c == '\\' || c == ':');
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-') || extra_ok(c))
    {
        return Err(CommandError::InvalidCommand(name.to_string()));
    }
    Ok(())
}

/// Arguments are deny-listed: no chaining, substitution, or redirection.
pub fn validate_argument(arg: &str) -> Result<(), CommandError> {
    if DENIED_SEQUENCES.iter().any(|s| arg.contains(s))
        || arg.chars().any(|c| DENIED_CHARS.contains(&c))
    {
        return Err(CommandError::UnsafeArgument(arg.to_string()));
    }
    Ok(())
}

fn validate_all(command: &str, args: &[String]) -> Result<(), CommandError> {
    validate_command_name(command)?;
    for arg in args {
        validate_argument(arg)?;
    }
    Ok(())
}

/// Check whether a binary is reachable: as a path, or on PATH.
pub fn command_exists(name: &str) -> bool {
    if validate_command_name(name).is_err() {
        return false;
    }
    if name.contains('/') || name.contains('\\') {
        return Path::new(name).is_file();
    }
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return true;
        }
        if cfg!(windows) {
            for ext in ["exe", "cmd", "bat"] {
                if dir.join(format!("{name}.{ext}")).is_file() {
                    return true;
                }
            }
        }
    }
    false
}

/// Captured output of a finished subprocess.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Spawns subprocesses with validation, registry tracking, and optional
/// stdin piping.
#[derive(Clone)]
pub struct CommandRunner {
    registry: Arc<ProcessRegistry>,
}

impl CommandRunner {
    pub fn new(registry: Arc<ProcessRegistry>) -> Self {
        Self { registry }
    }

    fn build(
        &self,
        command: &str,
        args: &[String],
        cwd: &Path,
        env: &HashMap<String, String>,
        stdin: bool,
    ) -> Command {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(cwd)
            .envs(env)
            .stdin(if stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run to completion, capturing stdout and stderr.
    pub async fn exec(
        &self,
        command: &str,
        args: &[String],
        cwd: &Path,
        env: &HashMap<String, String>,
        stdin: Option<&str>,
    ) -> Result<ExecResult, CommandError> {
        validate_all(command, args)?;
        let mut child = self
            .build(command, args, cwd, env, stdin.is_some())
            .spawn()
            .map_err(|source| CommandError::Spawn { command: command.to_string(), source })?;

        let pid = child.id().unwrap_or_default();
        self.registry.register(pid, command);

        // Feed stdin from a task so a large payload cannot deadlock against
        // a filling output pipe
        if let (Some(input), Some(mut handle)) = (stdin, child.stdin.take()) {
            let input = input.to_string();
            tokio::spawn(async move {
                let _ = handle.write_all(input.as_bytes()).await;
            });
        }

        let output = child.wait_with_output().await;
        self.registry.unregister(pid);
        let output = output?;
        Ok(ExecResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Run while streaming non-empty output lines in arrival order.
    ///
    /// stdout and stderr are read concurrently and interleaved as they
    /// arrive; each non-empty line reaches `on_line` exactly once.
    pub async fn exec_streaming(
        &self,
        command: &str,
        args: &[String],
        cwd: &Path,
        env: &HashMap<String, String>,
        stdin: Option<&str>,
        mut on_line: impl FnMut(&str),
    ) -> Result<i32, CommandError> {
        validate_all(command, args)?;
        let mut child = self
            .build(command, args, cwd, env, stdin.is_some())
            .spawn()
            .map_err(|source| CommandError::Spawn { command: command.to_string(), source })?;

        let pid = child.id().unwrap_or_default();
        self.registry.register(pid, command);

        if let (Some(input), Some(mut handle)) = (stdin, child.stdin.take()) {
            let input = input.to_string();
            tokio::spawn(async move {
                let _ = handle.write_all(input.as_bytes()).await;
            });
        }

        let (tx, mut rx) = mpsc::channel::<String>(256);
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, tx.clone()));
        }
        drop(tx);

        while let Some(line) = rx.recv().await {
            on_line(&line);
        }
        for reader in readers {
            let _ = reader.await;
        }

        let status = child.wait().await;
        self.registry.unregister(pid);
        Ok(status?.code().unwrap_or(-1))
    }
}

fn spawn_line_reader(
    stream: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    tx: mpsc::Sender<String>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.is_empty() {
                continue;
            }
            if tx.send(line).await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
