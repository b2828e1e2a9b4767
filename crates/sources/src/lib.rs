// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ralphy-sources: task source file parsing and writing.
//!
//! Four input formats share one canonical mapping to [`Task`]: CSV, YAML,
//! JSON, and Markdown checklists. Parsers and writers are inverses for the
//! task subset each format represents.

mod csv;
mod error;
mod json;
mod markdown;
mod yaml;

pub use error::SourceError;

use ralphy_core::Task;
use std::fs;
use std::path::{Path, PathBuf};

/// A task source format, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Yaml,
    Json,
    Markdown,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        match ext.to_lowercase().as_str() {
            "csv" => Ok(SourceFormat::Csv),
            "yaml" | "yml" => Ok(SourceFormat::Yaml),
            "json" => Ok(SourceFormat::Json),
            "md" | "markdown" => Ok(SourceFormat::Markdown),
            _ => Err(SourceError::UnknownFormat { path: path.to_path_buf() }),
        }
    }

    /// Short name used in state-store keys.
    pub fn source_type(self) -> &'static str {
        match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Yaml => "yaml",
            SourceFormat::Json => "json",
            SourceFormat::Markdown => "markdown",
        }
    }

    /// Extension used for the sibling state file.
    pub fn extension(self) -> &'static str {
        match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Yaml => "yaml",
            SourceFormat::Json => "json",
            SourceFormat::Markdown => "md",
        }
    }

    pub fn parse(self, content: &str) -> Result<Vec<Task>, SourceError> {
        match self {
            SourceFormat::Csv => csv::parse(content),
            SourceFormat::Yaml => yaml::parse(content),
            SourceFormat::Json => json::parse(content),
            SourceFormat::Markdown => Ok(markdown::parse(content)),
        }
    }

    pub fn write(self, tasks: &[Task]) -> Result<String, SourceError> {
        match self {
            SourceFormat::Csv => Ok(csv::write(tasks)),
            SourceFormat::Yaml => yaml::write(tasks),
            SourceFormat::Json => json::write(tasks),
            SourceFormat::Markdown => Ok(markdown::write(tasks)),
        }
    }
}

ralphy_core::simple_display! {
    SourceFormat {
        Csv => "csv",
        Yaml => "yaml",
        Json => "json",
        Markdown => "markdown",
    }
}

/// A task list backed by a file on disk.
#[derive(Debug, Clone)]
pub struct TaskSource {
    path: PathBuf,
    format: SourceFormat,
}

impl TaskSource {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let path = path.into();
        let format = SourceFormat::from_path(&path)?;
        Ok(Self { path, format })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    pub fn load(&self) -> Result<Vec<Task>, SourceError> {
        let content = fs::read_to_string(&self.path)?;
        self.format.parse(&content)
    }

    pub fn save(&self, tasks: &[Task]) -> Result<(), SourceError> {
        let content = self.format.write(tasks)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    /// Mark one task complete in the source file, preserving everything else.
    ///
    /// Markdown edits the matching checklist line in place so surrounding
    /// prose survives; structured formats round-trip the full task list.
    pub fn mark_complete(&self, id: &str) -> Result<(), SourceError> {
        if self.format == SourceFormat::Markdown {
            let content = fs::read_to_string(&self.path)?;
            let updated = markdown::mark_complete(&content, id)?;
            fs::write(&self.path, updated)?;
            return Ok(());
        }
        let mut tasks = self.load()?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| SourceError::UnknownTask { id: id.to_string() })?;
        task.completed = true;
        self.save(&tasks)
    }

    pub fn count_remaining(&self) -> Result<usize, SourceError> {
        Ok(self.load()?.iter().filter(|t| !t.completed).count())
    }

    pub fn count_completed(&self) -> Result<usize, SourceError> {
        Ok(self.load()?.iter().filter(|t| t.completed).count())
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
