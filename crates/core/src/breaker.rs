// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry backoff policy and the connection circuit breaker.
//!
//! The breaker is an explicit authority object: constructed once at startup
//! and shared by reference, never a hidden global.

use crate::clock::Clock;
use crate::error::TaskError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Consecutive connection failures that open the circuit.
pub const FAILURE_THRESHOLD: u32 = 3;

/// Cooldown before an open circuit admits trial attempts.
pub const RESET_TIMEOUT: Duration = Duration::from_secs(30);

/// Trial attempts admitted while half-open.
pub const HALF_OPEN_MAX_TRIALS: u32 = 2;

/// Exponential backoff configuration for the retry engine.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound on the random fraction added to each delay.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Deterministic delay for a 1-based attempt: `base × 2^(attempt−1)`,
    /// clamped to `max_delay`.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let unclamped = self.base_delay.saturating_mul(1u32 << exp);
        unclamped.min(self.max_delay)
    }

    /// Delay for an attempt with up to `jitter_factor` of randomness added.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for_attempt(attempt);
        let jitter = base.mul_f64(rand::random::<f64>() * self.jitter_factor);
        base + jitter
    }
}

/// The three circuit states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

crate::simple_display! {
    CircuitState {
        Closed => "CLOSED",
        Open => "OPEN",
        HalfOpen => "HALF_OPEN",
    }
}

/// Outcome of asking the breaker for admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    Allowed,
    /// Blocked; cooldown remaining until trial attempts are admitted.
    Blocked { remaining_ms: u64 },
}

impl BreakerDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, BreakerDecision::Allowed)
    }
}

/// Circuit breaker over connection-level failures.
///
/// Only errors classified as connection trouble move the failure counter;
/// ordinary task failures pass through without touching the circuit.
pub struct CircuitBreaker<C: Clock> {
    clock: C,
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_ms: Option<u64>,
    half_open_attempts: u32,
}

impl<C: Clock> CircuitBreaker<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_ms: None,
            half_open_attempts: 0,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Ask for admission. May transition OPEN → HALF_OPEN when the cooldown
    /// has elapsed, and HALF_OPEN → OPEN when trials are exhausted.
    pub fn can_attempt(&mut self) -> BreakerDecision {
        match self.state {
            CircuitState::Closed => BreakerDecision::Allowed,
            CircuitState::Open => {
                let now = self.clock.epoch_ms();
                let last = self.last_failure_ms.unwrap_or(now);
                let elapsed = now.saturating_sub(last);
                let reset_ms = RESET_TIMEOUT.as_millis() as u64;
                if elapsed >= reset_ms {
                    self.state = CircuitState::HalfOpen;
                    self.half_open_attempts = 1;
                    tracing::info!("circuit half-open, admitting trial");
                    BreakerDecision::Allowed
                } else {
                    BreakerDecision::Blocked { remaining_ms: reset_ms - elapsed }
                }
            }
            CircuitState::HalfOpen => {
                if self.half_open_attempts < HALF_OPEN_MAX_TRIALS {
                    self.half_open_attempts += 1;
                    BreakerDecision::Allowed
                } else {
                    // Trials exhausted without a success
                    self.trip();
                    BreakerDecision::Blocked { remaining_ms: RESET_TIMEOUT.as_millis() as u64 }
                }
            }
        }
    }

    /// Non-mutating view of whether an attempt would currently be admitted.
    /// Used by restore-waiters so polling never consumes trial budget.
    pub fn would_admit(&self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => self.half_open_attempts < HALF_OPEN_MAX_TRIALS,
            CircuitState::Open => {
                let now = self.clock.epoch_ms();
                let last = self.last_failure_ms.unwrap_or(now);
                now.saturating_sub(last) >= RESET_TIMEOUT.as_millis() as u64
            }
        }
    }

    /// Record a successful attempt: closes the circuit and resets counters.
    pub fn record_success(&mut self) {
        if self.state != CircuitState::Closed {
            tracing::info!(from = %self.state, "circuit closed");
        }
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.half_open_attempts = 0;
        self.last_failure_ms = None;
    }

    /// Record a failed attempt. Only connection-classified errors count.
    pub fn record_failure(&mut self, error: &TaskError) {
        if !error.is_connection() {
            return;
        }
        self.consecutive_failures += 1;
        match self.state {
            CircuitState::HalfOpen => {
                tracing::warn!(error = %error, "trial failed, circuit re-opened");
                self.trip();
            }
            CircuitState::Closed if self.consecutive_failures >= FAILURE_THRESHOLD => {
                tracing::warn!(
                    failures = self.consecutive_failures,
                    error = %error,
                    "circuit opened"
                );
                self.trip();
            }
            _ => {
                self.last_failure_ms = Some(self.clock.epoch_ms());
            }
        }
    }

    fn trip(&mut self) {
        self.state = CircuitState::Open;
        self.last_failure_ms = Some(self.clock.epoch_ms());
        self.half_open_attempts = 0;
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
