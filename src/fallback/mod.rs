//! Manual-fallback splitter: partitions an index by a run's outcomes.
//!
//! After a downloader run, some indirect-host tasks end unresolved — the
//! popup protocol found no usable link or the document is contact-only.
//! This module derives two artifacts from the index and the run's outcome
//! CSV so a human can recover the remainder out of band:
//!
//! - `<index>_resolved.csv` — index rows whose tasks all completed through
//!   automation, in the index's own column layout
//! - `<index>_manual.csv` — one row per unresolved task, carrying the full
//!   record context plus the extracted document key and a reconstructed
//!   catalog search URL
//!
//! A record with at least one unresolved task lands in the manual artifact;
//! its unresolved tasks are enumerated there individually.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::info;

use crate::index::{Index, IndexError};
use crate::report::OutcomeKind;
use crate::resolver::nepis;

/// Errors splitting an index.
#[derive(Debug, Error)]
pub enum SplitError {
    /// The index artifact could not be read or written.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// The outcome CSV could not be read or the manual CSV written.
    #[error("CSV error for {path}: {source}")]
    Csv {
        /// The file involved.
        path: String,
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// The outcome CSV is missing a required column.
    #[error("outcome file {path} is missing required column '{column}'")]
    MissingColumn {
        /// The outcome file involved.
        path: String,
        /// The missing column name.
        column: String,
    },
}

impl SplitError {
    fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Result of a split: where the artifacts were written and what they hold.
#[derive(Debug)]
pub struct SplitOutcome {
    /// Path of the automation-resolved index.
    pub resolved_path: PathBuf,
    /// Path of the manual-handling index.
    pub manual_path: PathBuf,
    /// Records whose tasks all resolved automatically.
    pub resolved_records: usize,
    /// Records with at least one unresolved task.
    pub manual_records: usize,
    /// Unresolved tasks enumerated in the manual artifact.
    pub manual_tasks: usize,
}

/// One unresolved task pulled from the outcome CSV.
struct UnresolvedTask {
    column: String,
    url: String,
}

/// Splits `index_path` by the outcomes in `outcomes_path`.
///
/// The derived artifacts are written next to the index as
/// `<stem>_resolved.csv` and `<stem>_manual.csv`.
///
/// # Errors
///
/// Returns [`SplitError`] when either input cannot be parsed or an artifact
/// cannot be written.
pub fn split_index(
    index_path: &Path,
    outcomes_path: &Path,
    column_override: &[String],
) -> Result<SplitOutcome, SplitError> {
    let index = Index::read_csv(index_path, column_override)?;
    let unresolved = read_unresolved_tasks(outcomes_path)?;

    let mut resolved = Index::new();
    let mut manual_records = 0usize;
    let mut manual_rows: Vec<Vec<String>> = Vec::new();

    for record in index.records() {
        match unresolved.get(&record.id) {
            Some(tasks) => {
                manual_records += 1;
                for task in tasks {
                    let dockey = nepis::extract_dockey(&task.url);
                    manual_rows.push(vec![
                        record.url.clone(),
                        record.title.clone(),
                        record.category.as_str().to_string(),
                        task.column.clone(),
                        task.url.clone(),
                        dockey.clone().unwrap_or_default(),
                        dockey.map(|k| nepis::search_url(&k)).unwrap_or_default(),
                    ]);
                }
            }
            None => resolved.push(record.clone()),
        }
    }

    let resolved_path = derived_path(index_path, "resolved");
    let manual_path = derived_path(index_path, "manual");

    resolved.write_csv(&resolved_path)?;
    write_manual_csv(&manual_path, &manual_rows)?;

    info!(
        resolved = resolved.len(),
        manual_records,
        manual_tasks = manual_rows.len(),
        resolved_path = %resolved_path.display(),
        manual_path = %manual_path.display(),
        "index split complete"
    );

    Ok(SplitOutcome {
        resolved_path,
        manual_path,
        resolved_records: resolved.len(),
        manual_records,
        manual_tasks: manual_rows.len(),
    })
}

/// Reads the outcome CSV and groups unresolved tasks by record id.
fn read_unresolved_tasks(
    path: &Path,
) -> Result<HashMap<String, Vec<UnresolvedTask>>, SplitError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| SplitError::csv(path, e))?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| SplitError::csv(path, e))?
        .iter()
        .map(str::to_string)
        .collect();

    let col = |name: &str| -> Result<usize, SplitError> {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| SplitError::MissingColumn {
                path: path.display().to_string(),
                column: name.to_string(),
            })
    };
    let record_col = col("record_id")?;
    let column_col = col("column")?;
    let url_col = col("url")?;
    let outcome_col = col("outcome")?;

    let mut unresolved: HashMap<String, Vec<UnresolvedTask>> = HashMap::new();
    for row in reader.records() {
        let row = row.map_err(|e| SplitError::csv(path, e))?;
        let kind = row
            .get(outcome_col)
            .and_then(|v| OutcomeKind::from_str(v).ok());
        if kind != Some(OutcomeKind::UnresolvedNepis) {
            continue;
        }
        unresolved
            .entry(row.get(record_col).unwrap_or("").to_string())
            .or_default()
            .push(UnresolvedTask {
                column: row.get(column_col).unwrap_or("").to_string(),
                url: row.get(url_col).unwrap_or("").to_string(),
            });
    }
    Ok(unresolved)
}

fn write_manual_csv(path: &Path, rows: &[Vec<String>]) -> Result<(), SplitError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| SplitError::csv(path, e))?;
    writer
        .write_record([
            "original_url",
            "title",
            "document_type",
            "column",
            "url",
            "dockey",
            "search_url",
        ])
        .map_err(|e| SplitError::csv(path, e))?;
    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| SplitError::csv(path, e))?;
    }
    writer
        .flush()
        .map_err(|e| SplitError::csv(path, csv::Error::from(e)))?;
    Ok(())
}

/// Builds `<stem>_<suffix>.csv` next to the input file.
fn derived_path(index_path: &Path, suffix: &str) -> PathBuf {
    let stem = index_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("index");
    index_path.with_file_name(format!("{stem}_{suffix}.csv"))
}
