// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy and retry classification.
//!
//! Every failure that reaches the retry engine is first normalized into a
//! [`TaskError`] carrying a [`ErrorCode`]. Classification is by code first,
//! then by message pattern; fatal patterns always win over retryable ones.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message fragments that mark an error as retryable regardless of code.
const RETRYABLE_PATTERNS: &[&str] = &[
    "timeout",
    "connection refused",
    "network",
    "rate limit",
    "too many requests",
    "temporary failure",
    "try again",
    "econnrefused",
    "econnreset",
    "socket hang up",
    "fetch failed",
    "unable to connect",
];

/// Message fragments that mark an error as fatal. Overrides retryable.
const FATAL_PATTERNS: &[&str] = &[
    "not authenticated",
    "authentication failed",
    "invalid token",
    "invalid api key",
    "unauthorized",
    "401",
    "403",
    "command not found",
    "not installed",
    "not recognized",
];

/// Subset of retryable patterns that indicate connection-level trouble.
/// Only these feed the circuit breaker's failure counter.
const CONNECTION_PATTERNS: &[&str] = &[
    "connection refused",
    "network",
    "econnrefused",
    "econnreset",
    "socket hang up",
    "fetch failed",
    "unable to connect",
];

/// Normalized error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Validation,
    Timeout,
    Process,
    Network,
    RateLimit,
    /// Authentication failures and missing binaries. Never retried.
    Auth,
    StringError,
    UnknownError,
}

impl ErrorCode {
    /// Codes retryable by themselves, before any message inspection.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::Timeout | ErrorCode::Process | ErrorCode::Network | ErrorCode::RateLimit
        )
    }
}

crate::simple_display! {
    ErrorCode {
        Validation => "VALIDATION",
        Timeout => "TIMEOUT",
        Process => "PROCESS",
        Network => "NETWORK",
        RateLimit => "RATE_LIMIT",
        Auth => "AUTH",
        StringError => "STRING_ERROR",
        UnknownError => "UNKNOWN_ERROR",
    }
}

/// Uniform error value for task execution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct TaskError {
    pub code: ErrorCode,
    pub message: String,
    /// Original error detail (debug representation, chain, stderr tail).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

fn matches_any(message: &str, patterns: &[&str]) -> bool {
    let lower = message.to_lowercase();
    patterns.iter().any(|p| lower.contains(p))
}

impl TaskError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), context: None }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Auth, message)
    }

    /// Normalize a bare string into an error (`STRING_ERROR`).
    pub fn from_message(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StringError, message)
    }

    /// Normalize an arbitrary error value, keeping its message and recording
    /// the debug representation as context.
    pub fn normalize<E: std::fmt::Debug + std::fmt::Display>(err: &E) -> Self {
        Self {
            code: ErrorCode::UnknownError,
            message: err.to_string(),
            context: Some(format!("{:?}", err)),
        }
    }

    /// Retryable iff the code is in the retryable set or the message matches
    /// a retryable pattern, and no fatal pattern matches.
    pub fn is_retryable(&self) -> bool {
        if self.is_fatal() {
            return false;
        }
        self.code.is_retryable() || matches_any(&self.message, RETRYABLE_PATTERNS)
    }

    /// Fatal errors abort the retry chain and the task.
    pub fn is_fatal(&self) -> bool {
        self.code == ErrorCode::Auth || matches_any(&self.message, FATAL_PATTERNS)
    }

    /// Connection-level failures are the only ones counted by the circuit
    /// breaker.
    pub fn is_connection(&self) -> bool {
        self.code == ErrorCode::Network || matches_any(&self.message, CONNECTION_PATTERNS)
    }
}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let code = match err.kind() {
            ErrorKind::TimedOut => ErrorCode::Timeout,
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected => ErrorCode::Network,
            ErrorKind::NotFound => ErrorCode::Auth,
            _ => ErrorCode::Process,
        };
        Self { code, message: err.to_string(), context: Some(format!("{:?}", err)) }
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self::from_message(message)
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self::from_message(message)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
