// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The retry engine: backoff, jitter, and circuit admission.

use parking_lot::Mutex;
use ralphy_core::{BreakerDecision, CircuitBreaker, Clock, RetryPolicy, TaskError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long `wait_for_connection_restore` waits by default.
pub const RESTORE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Poll interval while waiting for the circuit to admit attempts.
const RESTORE_POLL: Duration = Duration::from_secs(5);

/// Options for one retried operation.
pub struct RetryOptions<C: Clock> {
    pub policy: RetryPolicy,
    pub breaker: Arc<Mutex<CircuitBreaker<C>>>,
    /// Cancels mid-backoff sleeps.
    pub cancel: CancellationToken,
}

impl<C: Clock> RetryOptions<C> {
    pub fn new(breaker: Arc<Mutex<CircuitBreaker<C>>>) -> Self {
        Self { policy: RetryPolicy::default(), breaker, cancel: CancellationToken::new() }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Run `operation`, retrying retryable failures with exponential backoff
/// while the circuit admits attempts.
///
/// Non-retryable errors and circuit blocks propagate immediately; the
/// final retryable failure is returned once the budget is exhausted.
pub async fn with_retry<T, C, F, Fut>(
    options: &RetryOptions<C>,
    mut operation: F,
) -> Result<T, TaskError>
where
    C: Clock,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TaskError>>,
{
    let max_attempts = options.policy.max_retries.max(1);
    let mut attempt = 1u32;
    loop {
        match options.breaker.lock().can_attempt() {
            BreakerDecision::Allowed => {}
            BreakerDecision::Blocked { remaining_ms } => {
                return Err(TaskError::new(
                    ralphy_core::ErrorCode::Network,
                    format!("circuit breaker is open; retry admitted in {remaining_ms}ms"),
                ));
            }
        }

        match operation(attempt).await {
            Ok(value) => {
                options.breaker.lock().record_success();
                return Ok(value);
            }
            Err(error) => {
                options.breaker.lock().record_failure(&error);
                if !error.is_retryable() {
                    return Err(error);
                }
                if attempt >= max_attempts {
                    tracing::warn!(attempts = attempt, error = %error, "retry budget exhausted");
                    return Err(error);
                }
                let delay = options.policy.delay_for_attempt(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "retrying");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = options.cancel.cancelled() => {
                        tracing::debug!("retry cancelled mid-backoff");
                        return Err(error);
                    }
                }
                attempt += 1;
            }
        }
    }
}

/// Poll until the circuit would admit an attempt, or until `timeout`.
/// Returns true when attempts are admitted again.
pub async fn wait_for_connection_restore<C: Clock>(
    breaker: &Mutex<CircuitBreaker<C>>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if breaker.lock().would_admit() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(RESTORE_POLL) => {}
            _ = cancel.cancelled() => return false,
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
