// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    timeout = { ErrorCode::Timeout, true },
    process = { ErrorCode::Process, true },
    network = { ErrorCode::Network, true },
    rate_limit = { ErrorCode::RateLimit, true },
    validation = { ErrorCode::Validation, false },
    auth = { ErrorCode::Auth, false },
    string = { ErrorCode::StringError, false },
    unknown = { ErrorCode::UnknownError, false },
)]
fn code_retryability(code: ErrorCode, expected: bool) {
    assert_eq!(code.is_retryable(), expected);
}

#[yare::parameterized(
    econnreset = { "read failed: ECONNRESET" },
    refused = { "connection refused by host" },
    rate_limited = { "Rate limit exceeded, slow down" },
    too_many = { "429 Too Many Requests" },
    hang_up = { "socket hang up" },
    temporary = { "Temporary failure in name resolution" },
    fetch = { "fetch failed" },
)]
fn message_patterns_are_retryable(message: &str) {
    assert!(TaskError::from_message(message).is_retryable());
}

#[yare::parameterized(
    not_authenticated = { "not authenticated; run login first" },
    auth_failed = { "Authentication failed" },
    bad_token = { "invalid token supplied" },
    bad_key = { "Invalid API key" },
    unauthorized = { "401 Unauthorized" },
    forbidden = { "server returned 403" },
    missing_binary = { "claude: command not found" },
    not_installed = { "engine not installed" },
)]
fn fatal_patterns_never_retry(message: &str) {
    let err = TaskError::from_message(message);
    assert!(err.is_fatal());
    assert!(!err.is_retryable());
}

#[test]
fn fatal_overrides_retryable_code() {
    // A timeout code with an auth message must not be retried
    let err = TaskError::timeout("timeout waiting for login: not authenticated");
    assert!(err.is_fatal());
    assert!(!err.is_retryable());
}

#[test]
fn connection_classification_feeds_breaker() {
    assert!(TaskError::new(ErrorCode::Network, "down").is_connection());
    assert!(TaskError::from_message("ECONNREFUSED 127.0.0.1:443").is_connection());
    assert!(!TaskError::from_message("rate limit exceeded").is_connection());
    assert!(!TaskError::timeout("operation timeout").is_connection());
}

#[test]
fn normalize_keeps_message_and_context() {
    let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
    let err = TaskError::normalize(&io);
    assert_eq!(err.code, ErrorCode::UnknownError);
    assert_eq!(err.message, "disk on fire");
    assert!(err.context.is_some());
}

#[test]
fn string_normalization_uses_string_error() {
    let err: TaskError = "something odd".into();
    assert_eq!(err.code, ErrorCode::StringError);
    assert!(!err.is_retryable());
}

#[test]
fn io_not_found_maps_to_fatal() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory");
    let err: TaskError = io.into();
    assert_eq!(err.code, ErrorCode::Auth);
    assert!(!err.is_retryable());
}

#[test]
fn display_includes_code() {
    let err = TaskError::new(ErrorCode::RateLimit, "slow down");
    assert_eq!(err.to_string(), "RATE_LIMIT: slow down");
}
