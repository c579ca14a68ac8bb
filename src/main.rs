//! CLI entry point for the harvester tool.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use harvester_core::download::constants::DEFAULT_NEPIS_INTERVAL_SECS;
use harvester_core::resolver::nepis::NEPIS_HOST;
use harvester_core::{
    DownloadEngine, HttpClient, Index, IndexScraper, RateLimiter, ScrapeConfig, assign_filenames,
    build_default_registry, split_index,
};

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    match args.command {
        Command::Scrape {
            start_page,
            end_page,
            out,
            base_url,
            exclude_types,
            max_records,
            rate_limit,
        } => {
            info!(start_page, end_page, "scrape starting");

            let rate_limiter = Arc::new(build_rate_limiter(rate_limit, None));
            let config = ScrapeConfig {
                base_url,
                start_page,
                end_page,
                excluded_types: exclude_types,
                max_records,
            };
            let scraper = IndexScraper::new(HttpClient::new(), rate_limiter, config);
            let (index, _stats) = scraper.scrape().await?;

            index.write_csv(&out)?;
            info!(records = index.len(), path = %out.display(), "index written");
        }

        Command::Download {
            index,
            output_dir,
            url_columns,
            concurrency,
            rate_limit,
            nepis_interval,
            max_records,
            outcomes,
            conflicts,
            summary_json,
        } => {
            let mut index = Index::read_csv(&index, &url_columns)?;
            if let Some(cap) = max_records {
                index.truncate(cap);
            }
            info!(records = index.len(), "index loaded");

            // Filename assignment is a pure pass over the whole index; the
            // conflict artifact is written before any network traffic.
            let plan = assign_filenames(&index);
            harvester_core::report::write_conflicts_csv(&plan.report, &conflicts)?;
            if !plan.report.anomalies.is_empty() {
                warn!(
                    anomalies = plan.report.anomalies.len(),
                    path = %conflicts.display(),
                    "naming anomalies present; affected tasks will not be downloaded"
                );
            }
            info!(
                tasks = plan.assignments.len(),
                conflicts = plan.report.conflicts.len(),
                path = %conflicts.display(),
                "filenames assigned"
            );

            let rate_limiter = Arc::new(build_rate_limiter(rate_limit, Some(nepis_interval)));
            let client = HttpClient::new();
            let registry = Arc::new(build_default_registry(
                client.clone(),
                Arc::clone(&rate_limiter),
            ));
            let engine = DownloadEngine::new(usize::from(concurrency), rate_limiter, registry)?;

            // Coarse-grained interruption: Ctrl-C stops the batch before the
            // next task; in-flight fetches run to their own timeout.
            let stop = engine.stop_flag();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received; finishing in-flight tasks");
                    stop.store(true, Ordering::SeqCst);
                }
            });

            let progress = if args.quiet {
                None
            } else {
                Some(batch_progress_bar(plan.assignments.len() as u64))
            };

            let report = engine
                .run(&plan.assignments, &client, &output_dir, progress.clone())
                .await?;
            if let Some(bar) = progress {
                bar.finish_and_clear();
            }

            report.write_outcomes_csv(&outcomes)?;
            info!(path = %outcomes.display(), "outcome report written");
            if let Some(path) = summary_json {
                report.summary().write_json(&path)?;
                info!(path = %path.display(), "summary written");
            }
        }

        Command::Split {
            index,
            outcomes,
            url_columns,
        } => {
            let outcome = split_index(&index, &outcomes, &url_columns)?;
            info!(
                resolved = outcome.resolved_records,
                manual_records = outcome.manual_records,
                manual_tasks = outcome.manual_tasks,
                "split written"
            );
        }
    }

    Ok(())
}

/// Builds the shared per-host pacer: `0` disables pacing entirely; the
/// indirect document host gets its own interval when one is given.
fn build_rate_limiter(rate_limit_secs: u64, nepis_interval_secs: Option<u64>) -> RateLimiter {
    if rate_limit_secs == 0 {
        debug!("rate limiting disabled");
        return RateLimiter::disabled();
    }
    debug!(rate_limit_secs, "rate limiting enabled");
    let limiter = RateLimiter::new(Duration::from_secs(rate_limit_secs));
    let nepis = nepis_interval_secs.unwrap_or(DEFAULT_NEPIS_INTERVAL_SECS);
    limiter.with_host_interval(NEPIS_HOST, Duration::from_secs(nepis))
}

fn batch_progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}
