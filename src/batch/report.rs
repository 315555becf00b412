//! Batch Outcome Reporting
//!
//! Collects the outcome of every subject in a batch, prints a console
//! summary and optionally writes the whole report as JSON.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use colored::Colorize;
use log::info;
use serde::Serialize;
use thiserror::Error;

/// Final state of one subject.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Every step ran (or was printed, in a dry run)
    Completed,
    /// A step failed; later steps were not attempted
    Aborted,
    /// The subject never started: invalid input, no prefix, staging failure
    Skipped,
}

/// What happened to one input volume.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SubjectOutcome {
    pub input: PathBuf,
    pub prefix: Option<String>,
    pub status: OutcomeStatus,
    pub workspace: Option<PathBuf>,
    pub failed_step: Option<usize>,
    /// Rendered command of the failed step
    pub failed_command: Option<String>,
    pub error: Option<String>,
    /// Wall time per finished step, in milliseconds
    pub step_durations_ms: BTreeMap<usize, u128>,
}

impl SubjectOutcome {
    /// A subject that could not be started.
    pub fn skipped(input: impl Into<PathBuf>, prefix: Option<String>, error: impl ToString) -> Self {
        Self {
            input: input.into(),
            prefix,
            status: OutcomeStatus::Skipped,
            workspace: None,
            failed_step: None,
            failed_command: None,
            error: Some(error.to_string()),
            step_durations_ms: BTreeMap::new(),
        }
    }
}

/// Failure to write a report file.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write report {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Outcome of a whole batch.
#[derive(Serialize, Debug, Clone)]
pub struct BatchReport {
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub dry_run: bool,
    pub output_root: PathBuf,
    pub subjects: Vec<SubjectOutcome>,
}

impl BatchReport {
    /// Starts an empty report timestamped now.
    pub fn new(output_root: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            started_at: Local::now(),
            finished_at: None,
            dry_run,
            output_root: output_root.into(),
            subjects: Vec::new(),
        }
    }

    pub fn push(&mut self, outcome: SubjectOutcome) {
        self.subjects.push(outcome);
    }

    /// Stamps the finish time.
    pub fn finish(&mut self) {
        self.finished_at = Some(Local::now());
    }

    fn count(&self, status: OutcomeStatus) -> usize {
        self.subjects.iter().filter(|s| s.status == status).count()
    }

    pub fn completed(&self) -> usize {
        self.count(OutcomeStatus::Completed)
    }

    pub fn aborted(&self) -> usize {
        self.count(OutcomeStatus::Aborted)
    }

    pub fn skipped(&self) -> usize {
        self.count(OutcomeStatus::Skipped)
    }

    /// True when any subject was aborted or skipped.
    pub fn has_failures(&self) -> bool {
        self.aborted() > 0 || self.skipped() > 0
    }

    /// Renders the console summary.
    pub fn summary(&self) -> String {
        let mut output = String::new();

        for subject in &self.subjects {
            let label = subject
                .prefix
                .clone()
                .unwrap_or_else(|| subject.input.display().to_string());

            let line = match subject.status {
                OutcomeStatus::Completed => format!("  {:<10} {}", label, "completed".green()),
                OutcomeStatus::Aborted => format!(
                    "  {:<10} {} at step {}",
                    label,
                    "aborted".red(),
                    subject.failed_step.unwrap_or_default()
                ),
                OutcomeStatus::Skipped => format!(
                    "  {:<10} {}: {}",
                    label,
                    "skipped".yellow(),
                    subject.error.as_deref().unwrap_or("unknown reason")
                ),
            };
            output.push_str(&line);
            output.push('\n');
        }

        output.push_str(&format!(
            "\n{} subject(s): {} completed, {} aborted, {} skipped\n",
            self.subjects.len(),
            self.completed(),
            self.aborted(),
            self.skipped()
        ));
        output
    }

    /// Writes the report as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        info!("Wrote batch report to {}", path.display());
        Ok(())
    }
}
