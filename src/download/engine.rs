//! Download engine: a bounded concurrent batch over assigned tasks.
//!
//! The engine walks the filename assignment, spawning one Tokio task per
//! download up to a semaphore-bounded concurrency limit. Requests to one
//! host are serialized through the shared [`RateLimiter`]; concurrency
//! exists only across hosts. Individual failures never abort the batch —
//! every task ends in exactly one [`OutcomeKind`] and the batch always
//! returns a complete [`RunReport`].
//!
//! # Concurrency Model
//!
//! - Each download runs in its own Tokio task
//! - A semaphore permit is acquired before starting each download
//! - Permits are released automatically when downloads complete (RAII)
//! - A stop flag provides coarse interruption between tasks: an in-flight
//!   fetch runs to completion or to its own timeout, but no new task starts
//!
//! # Idempotent Resume
//!
//! A task whose assigned file already exists non-empty is counted as
//! already satisfied and never re-fetched, so a full run can be repeated
//! after interruption without redoing completed work. The check is keyed by
//! the assigned filename, which the naming pass guarantees is unique per
//! task.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::ProgressBar;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::rate_limiter::{RateLimiter, extract_host};
use super::{DownloadError, HttpClient};
use crate::naming::Assignment;
use crate::report::{OutcomeKind, RunReport, TaskOutcome};
use crate::resolver::{ResolveError, ResolverRegistry};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Error type for download engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The output directory could not be created.
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        /// The directory that could not be created.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Batch downloader over an index's filename assignment.
#[derive(Debug)]
pub struct DownloadEngine {
    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
    /// Configured concurrency limit.
    concurrency: usize,
    /// Per-host request pacer shared with the resolvers.
    rate_limiter: Arc<RateLimiter>,
    /// Resolver registry for indirect-host URLs.
    registry: Arc<ResolverRegistry>,
    /// Coarse interruption flag checked before each task starts.
    stop: Arc<AtomicBool>,
}

impl DownloadEngine {
    /// Creates an engine with the given concurrency limit.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] outside 1-100.
    #[instrument(level = "debug", skip(rate_limiter, registry))]
    pub fn new(
        concurrency: usize,
        rate_limiter: Arc<RateLimiter>,
        registry: Arc<ResolverRegistry>,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            rate_limit_ms = rate_limiter.default_interval().as_millis(),
            rate_limit_disabled = rate_limiter.is_disabled(),
            "creating download engine"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            rate_limiter,
            registry,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// The stop flag; setting it halts the batch before the next task.
    #[must_use]
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Runs the batch: one outcome per assignment, in completion order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] only for setup problems (output directory,
    /// closed semaphore). Individual task failures are outcomes, not errors.
    #[instrument(skip(self, assignments, client, progress), fields(tasks = assignments.len(), output_dir = %output_dir.display()))]
    pub async fn run(
        &self,
        assignments: &[Assignment],
        client: &HttpClient,
        output_dir: &Path,
        progress: Option<ProgressBar>,
    ) -> Result<RunReport, EngineError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| EngineError::OutputDir {
                path: output_dir.display().to_string(),
                source: e,
            })?;

        info!("starting download batch");
        let mut handles = Vec::new();

        for assignment in assignments {
            if self.stop.load(Ordering::SeqCst) {
                info!("stop requested; not starting further tasks");
                break;
            }

            // Acquire semaphore permit (blocks at the concurrency limit).
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let assignment = assignment.clone();
            let client = client.clone();
            let rate_limiter = Arc::clone(&self.rate_limiter);
            let registry = Arc::clone(&self.registry);
            let output_dir = output_dir.to_path_buf();
            let progress = progress.clone();

            handles.push(tokio::spawn(async move {
                // Permit is dropped when this block exits (RAII).
                let _permit = permit;
                let outcome =
                    process_task(&client, &registry, &rate_limiter, &assignment, &output_dir)
                        .await;
                if let Some(bar) = progress {
                    bar.inc(1);
                }
                outcome
            }));
        }

        debug!(task_count = handles.len(), "waiting for downloads to complete");

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                // Task panics are logged but don't fail the batch.
                Err(e) => warn!(error = %e, "download task panicked"),
            }
        }

        let report = RunReport::new(outcomes);
        report.summary().log();
        Ok(report)
    }
}

/// Runs one task to its outcome. Never returns an error: every failure mode
/// maps to an [`OutcomeKind`] with detail.
#[instrument(skip_all, fields(record_id = %assignment.record_id, url = %assignment.url))]
async fn process_task(
    client: &HttpClient,
    registry: &ResolverRegistry,
    rate_limiter: &RateLimiter,
    assignment: &Assignment,
    output_dir: &Path,
) -> TaskOutcome {
    let host = extract_host(&assignment.url);
    let dest = output_dir.join(&assignment.filename);

    let outcome = |kind: OutcomeKind, detail: Option<String>| TaskOutcome {
        record_id: assignment.record_id.clone(),
        column: assignment.column.clone(),
        url: assignment.url.clone(),
        host: host.clone(),
        filename: assignment.filename.clone(),
        kind,
        detail,
    };

    // Idempotent resume: a non-empty file under the assigned name satisfies
    // the task.
    match tokio::fs::metadata(&dest).await {
        Ok(meta) if meta.len() > 0 => {
            debug!(path = %dest.display(), "file already present; skipping");
            return outcome(OutcomeKind::SkippedExisting, None);
        }
        _ => {}
    }

    // Classification and (for indirect hosts) resolution.
    let fetch_url = match registry.resolve_url(&assignment.url).await {
        Ok(url) => url,
        Err(error @ ResolveError::NoHandler { .. }) => {
            warn!(error = %error, "task has no resolver");
            return outcome(OutcomeKind::Failed, Some(error.to_string()));
        }
        Err(error) => {
            info!(error = %error, kind = error.kind(), "indirect resolution failed");
            return outcome(
                OutcomeKind::UnresolvedNepis,
                Some(format!("{}: {error}", error.kind())),
            );
        }
    };

    rate_limiter.acquire(&fetch_url).await;
    match client.download_to_path(&fetch_url, &dest).await {
        Ok(bytes) => {
            debug!(bytes, path = %dest.display(), "task complete");
            outcome(OutcomeKind::Downloaded, None)
        }
        Err(error) => {
            warn!(error = %error, "task failed");
            outcome(OutcomeKind::Failed, Some(error.to_string()))
        }
    }
}

/// Maps a download error to a short label (used by tests and logs).
#[must_use]
pub fn failure_label(error: &DownloadError) -> &'static str {
    match error {
        DownloadError::Network { .. } => "network",
        DownloadError::Timeout { .. } => "timeout",
        DownloadError::HttpStatus { .. } => "http-status",
        DownloadError::Io { .. } => "io",
        DownloadError::InvalidUrl { .. } => "invalid-url",
        DownloadError::InvalidPayload { .. } => "invalid-payload",
    }
}
