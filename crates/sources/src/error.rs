// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use thiserror::Error;

/// Errors from parsing or writing task source files.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unrecognized task file extension: {}", path.display())]
    UnknownFormat { path: PathBuf },
    #[error("{format} parse error: {message}")]
    Parse { format: &'static str, message: String },
    #[error("unknown task id: {id}")]
    UnknownTask { id: String },
}

impl SourceError {
    pub fn parse(format: &'static str, message: impl Into<String>) -> Self {
        Self::Parse { format, message: message.into() }
    }
}
