//! Run reporting: per-task outcomes, aggregated summaries, and the report
//! artifacts other tooling consumes.
//!
//! A completed run always yields three things regardless of how many tasks
//! failed: the index, the output directory, and the reports written here —
//! a task-outcome CSV enumerating every task with enough context to retry
//! or hand off, a conflict CSV describing every naming collision, and an
//! optional JSON summary for machine consumption. Partial completion is the
//! expected steady state; the summary is how coverage is verified.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::naming::ConflictReport;

/// Errors writing report artifacts.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Underlying CSV write failure.
    #[error("CSV error for {path}: {source}")]
    Csv {
        /// The report file involved.
        path: String,
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// Underlying IO failure.
    #[error("IO error for {path}: {source}")]
    Io {
        /// The report file involved.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization failure.
    #[error("JSON error for {path}: {source}")]
    Json {
        /// The report file involved.
        path: String,
        /// The underlying serialization error.
        #[source]
        source: serde_json::Error,
    },
}

impl ReportError {
    fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.display().to_string(),
            source,
        }
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Final state of one download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    /// File fetched and written under its assigned name.
    Downloaded,
    /// A non-empty file already existed under the assigned name.
    SkippedExisting,
    /// Fetch or validation failed.
    Failed,
    /// The indirect host's resolution protocol produced no usable link.
    UnresolvedNepis,
}

impl OutcomeKind {
    /// Machine-readable label used in the outcome CSV.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Downloaded => "downloaded",
            Self::SkippedExisting => "skipped-existing",
            Self::Failed => "failed",
            Self::UnresolvedNepis => "unresolved-nepis",
        }
    }
}

impl FromStr for OutcomeKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "downloaded" => Ok(Self::Downloaded),
            "skipped-existing" => Ok(Self::SkippedExisting),
            "failed" => Ok(Self::Failed),
            "unresolved-nepis" => Ok(Self::UnresolvedNepis),
            _ => Err(()),
        }
    }
}

/// One task's result with the context needed to retry or hand off.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// Owning record's stable identifier.
    pub record_id: String,
    /// Index CSV column the URL came from.
    pub column: String,
    /// The download URL as stored in the index.
    pub url: String,
    /// The URL's host.
    pub host: String,
    /// The assigned filename.
    pub filename: String,
    /// Final state.
    pub kind: OutcomeKind,
    /// Failure or resolution detail, when there is one.
    pub detail: Option<String>,
}

/// Per-host outcome counts.
#[derive(Debug, Default, Clone, Serialize)]
pub struct HostStats {
    /// Files fetched from this host.
    pub downloaded: usize,
    /// Tasks satisfied by existing files.
    pub skipped_existing: usize,
    /// Fetch or validation failures.
    pub failed: usize,
    /// Unresolved indirect-host tasks.
    pub unresolved: usize,
}

/// Aggregated counts for a whole run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    /// Files fetched this run.
    pub downloaded: usize,
    /// Tasks satisfied by existing files.
    pub skipped_existing: usize,
    /// Fetch or validation failures.
    pub failed: usize,
    /// Unresolved indirect-host tasks.
    pub unresolved: usize,
    /// Counts broken down by host, in host order.
    pub hosts: BTreeMap<String, HostStats>,
}

impl RunSummary {
    /// Total tasks accounted for.
    #[must_use]
    pub fn total(&self) -> usize {
        self.downloaded + self.skipped_existing + self.failed + self.unresolved
    }

    /// Logs the summary at info level.
    pub fn log(&self) {
        info!(
            downloaded = self.downloaded,
            skipped_existing = self.skipped_existing,
            failed = self.failed,
            unresolved = self.unresolved,
            total = self.total(),
            "run complete"
        );
        for (host, stats) in &self.hosts {
            info!(
                host = %host,
                downloaded = stats.downloaded,
                skipped_existing = stats.skipped_existing,
                failed = stats.failed,
                unresolved = stats.unresolved,
                "host outcomes"
            );
        }
    }

    /// Writes the summary as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] on serialization or IO failure.
    pub fn write_json(&self, path: &Path) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| ReportError::Json {
            path: path.display().to_string(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| ReportError::io(path, e))
    }
}

/// Every task outcome of one downloader run.
#[derive(Debug, Default)]
pub struct RunReport {
    outcomes: Vec<TaskOutcome>,
}

impl RunReport {
    /// Wraps collected outcomes.
    #[must_use]
    pub fn new(outcomes: Vec<TaskOutcome>) -> Self {
        Self { outcomes }
    }

    /// The outcomes in completion order.
    #[must_use]
    pub fn outcomes(&self) -> &[TaskOutcome] {
        &self.outcomes
    }

    /// Aggregates outcomes into run-level and per-host counts.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            downloaded: 0,
            skipped_existing: 0,
            failed: 0,
            unresolved: 0,
            hosts: BTreeMap::new(),
        };
        for outcome in &self.outcomes {
            let host_stats = summary.hosts.entry(outcome.host.clone()).or_default();
            match outcome.kind {
                OutcomeKind::Downloaded => {
                    summary.downloaded += 1;
                    host_stats.downloaded += 1;
                }
                OutcomeKind::SkippedExisting => {
                    summary.skipped_existing += 1;
                    host_stats.skipped_existing += 1;
                }
                OutcomeKind::Failed => {
                    summary.failed += 1;
                    host_stats.failed += 1;
                }
                OutcomeKind::UnresolvedNepis => {
                    summary.unresolved += 1;
                    host_stats.unresolved += 1;
                }
            }
        }
        summary
    }

    /// Writes the task-outcome CSV:
    /// `record_id,column,url,host,filename,outcome,detail`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] on any write failure.
    pub fn write_outcomes_csv(&self, path: &Path) -> Result<(), ReportError> {
        let mut writer = csv::Writer::from_path(path).map_err(|e| ReportError::csv(path, e))?;
        writer
            .write_record(["record_id", "column", "url", "host", "filename", "outcome", "detail"])
            .map_err(|e| ReportError::csv(path, e))?;
        for outcome in &self.outcomes {
            writer
                .write_record([
                    outcome.record_id.as_str(),
                    outcome.column.as_str(),
                    outcome.url.as_str(),
                    outcome.host.as_str(),
                    outcome.filename.as_str(),
                    outcome.kind.as_str(),
                    outcome.detail.as_deref().unwrap_or(""),
                ])
                .map_err(|e| ReportError::csv(path, e))?;
        }
        writer.flush().map_err(|e| ReportError::io(path, e))?;
        Ok(())
    }
}

/// Writes the conflict report CSV:
/// `kind,name,record_id,column,url,resolved,disambiguator`.
///
/// Conflict rows describe every claim on a contested name; anomaly rows
/// describe tasks the letter scheme could not name.
///
/// # Errors
///
/// Returns [`ReportError`] on any write failure.
pub fn write_conflicts_csv(report: &ConflictReport, path: &Path) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| ReportError::csv(path, e))?;
    writer
        .write_record(["kind", "name", "record_id", "column", "url", "resolved", "disambiguator"])
        .map_err(|e| ReportError::csv(path, e))?;

    for conflict in &report.conflicts {
        for claim in &conflict.claims {
            writer
                .write_record([
                    "conflict",
                    conflict.name.as_str(),
                    claim.record_id.as_str(),
                    claim.column.as_str(),
                    claim.url.as_str(),
                    claim.resolved.as_deref().unwrap_or(""),
                    claim.tag.as_str(),
                ])
                .map_err(|e| ReportError::csv(path, e))?;
        }
    }
    for anomaly in &report.anomalies {
        writer
            .write_record([
                "anomaly",
                anomaly.name.as_str(),
                anomaly.record_id.as_str(),
                anomaly.column.as_str(),
                anomaly.url.as_str(),
                "",
                "",
            ])
            .map_err(|e| ReportError::csv(path, e))?;
    }

    writer.flush().map_err(|e| ReportError::io(path, e))?;
    Ok(())
}
