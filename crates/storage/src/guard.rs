// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prototype-pollution guard for persisted JSON.
//!
//! State, index, and metadata files use dynamically-keyed maps. Before any
//! such file is parsed, content carrying the keys `__proto__`, `constructor`,
//! or `prototype` is rejected outright. The strong type system makes the
//! corruption itself impossible here, but the check is still required when
//! keys are used as map indices.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;
use thiserror::Error;

#[allow(clippy::expect_used)]
static FORBIDDEN_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:__proto__|constructor|prototype)"\s*:"#)
        .expect("constant regex pattern is valid")
});

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("refusing to parse: content contains forbidden key `{key}`")]
    ForbiddenKey { key: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reject content carrying a forbidden key, then parse it as JSON.
pub fn parse_guarded<T: DeserializeOwned>(content: &str) -> Result<T, GuardError> {
    check_keys(content)?;
    Ok(serde_json::from_str(content)?)
}

/// Key check alone, for callers that parse through another codec.
pub fn check_keys(content: &str) -> Result<(), GuardError> {
    if let Some(m) = FORBIDDEN_KEY.find(content) {
        let key = m.as_str().trim_end_matches(':').trim().trim_matches('"').to_string();
        return Err(GuardError::ForbiddenKey { key });
    }
    Ok(())
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
