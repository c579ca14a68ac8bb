//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use harvester_core::DEFAULT_CONCURRENCY;
use harvester_core::download::constants::{DEFAULT_HOST_INTERVAL_SECS, DEFAULT_NEPIS_INTERVAL_SECS};
use harvester_core::scrape::DEFAULT_BASE_URL;

/// Harvest a paginated document catalog into an organized local archive.
///
/// The pipeline runs in three stages: `scrape` builds a CSV index of records
/// and download links, `download` fetches every referenced file under a
/// deterministic collision-free name, and `split` partitions the index by a
/// run's outcomes for manual follow-up.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scrape the catalog listing into a CSV index
    Scrape {
        /// First listing page (1-based, inclusive)
        #[arg(long, default_value_t = 1)]
        start_page: usize,

        /// Last listing page (inclusive); clamped to the catalog's own count
        #[arg(long, default_value_t = 10)]
        end_page: usize,

        /// Where to write the index CSV
        #[arg(short, long, default_value = "index.csv")]
        out: PathBuf,

        /// Catalog base URL
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        base_url: String,

        /// Document types to skip (repeatable)
        #[arg(long = "exclude-type", default_values_t = [String::from("JOURNAL")])]
        exclude_types: Vec<String>,

        /// Stop after this many records (for bounded test runs)
        #[arg(long)]
        max_records: Option<usize>,

        /// Minimum seconds between requests to one host (0 to disable)
        #[arg(short = 'l', long, default_value_t = DEFAULT_HOST_INTERVAL_SECS)]
        rate_limit: u64,
    },

    /// Download every file referenced by an index
    Download {
        /// The index CSV produced by `scrape`
        index: PathBuf,

        /// Directory downloaded files are written to
        #[arg(short, long, default_value = "downloads")]
        output_dir: PathBuf,

        /// URL column names to use instead of auto-detection (repeatable)
        #[arg(long = "url-column")]
        url_columns: Vec<String>,

        /// Maximum concurrent downloads (1-100); one host is never hit concurrently
        #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
        concurrency: u8,

        /// Minimum seconds between requests to one host (0 to disable)
        #[arg(short = 'l', long, default_value_t = DEFAULT_HOST_INTERVAL_SECS)]
        rate_limit: u64,

        /// Minimum seconds between requests to the indirect document host
        #[arg(long, default_value_t = DEFAULT_NEPIS_INTERVAL_SECS)]
        nepis_interval: u64,

        /// Process at most this many index records (for bounded test runs)
        #[arg(long)]
        max_records: Option<usize>,

        /// Where to write the per-task outcome CSV
        #[arg(long, default_value = "outcomes.csv")]
        outcomes: PathBuf,

        /// Where to write the filename conflict CSV
        #[arg(long, default_value = "conflicts.csv")]
        conflicts: PathBuf,

        /// Also write a machine-readable JSON run summary here
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },

    /// Partition an index by a run's outcomes for manual follow-up
    Split {
        /// The index CSV produced by `scrape`
        index: PathBuf,

        /// The outcome CSV produced by `download`
        outcomes: PathBuf,

        /// URL column names to use instead of auto-detection (repeatable)
        #[arg(long = "url-column")]
        url_columns: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_scrape_defaults() {
        let args = Args::try_parse_from(["harvester", "scrape"]).unwrap();
        match args.command {
            Command::Scrape {
                start_page,
                end_page,
                out,
                exclude_types,
                rate_limit,
                max_records,
                ..
            } => {
                assert_eq!(start_page, 1);
                assert_eq!(end_page, 10);
                assert_eq!(out, PathBuf::from("index.csv"));
                assert_eq!(exclude_types, vec!["JOURNAL".to_string()]);
                assert_eq!(rate_limit, 3);
                assert_eq!(max_records, None);
            }
            other => panic!("expected scrape, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_scrape_page_range_flags() {
        let args =
            Args::try_parse_from(["harvester", "scrape", "--start-page", "40", "--end-page", "60"])
                .unwrap();
        match args.command {
            Command::Scrape {
                start_page,
                end_page,
                ..
            } => {
                assert_eq!(start_page, 40);
                assert_eq!(end_page, 60);
            }
            other => panic!("expected scrape, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_download_defaults() {
        let args = Args::try_parse_from(["harvester", "download", "index.csv"]).unwrap();
        match args.command {
            Command::Download {
                index,
                output_dir,
                concurrency,
                rate_limit,
                nepis_interval,
                url_columns,
                ..
            } => {
                assert_eq!(index, PathBuf::from("index.csv"));
                assert_eq!(output_dir, PathBuf::from("downloads"));
                assert_eq!(usize::from(concurrency), DEFAULT_CONCURRENCY);
                assert_eq!(rate_limit, DEFAULT_HOST_INTERVAL_SECS);
                assert_eq!(nepis_interval, DEFAULT_NEPIS_INTERVAL_SECS);
                assert!(url_columns.is_empty());
            }
            other => panic!("expected download, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_download_url_column_repeatable() {
        let args = Args::try_parse_from([
            "harvester",
            "download",
            "index.csv",
            "--url-column",
            "url1",
            "--url-column",
            "url2",
        ])
        .unwrap();
        match args.command {
            Command::Download { url_columns, .. } => {
                assert_eq!(url_columns, vec!["url1".to_string(), "url2".to_string()]);
            }
            other => panic!("expected download, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_download_concurrency_range_enforced() {
        let result = Args::try_parse_from(["harvester", "download", "index.csv", "-c", "0"]);
        assert!(result.is_err());
        let result = Args::try_parse_from(["harvester", "download", "index.csv", "-c", "101"]);
        assert!(result.is_err());
        let args = Args::try_parse_from(["harvester", "download", "index.csv", "-c", "100"]).unwrap();
        match args.command {
            Command::Download { concurrency, .. } => assert_eq!(concurrency, 100),
            other => panic!("expected download, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_split_requires_both_paths() {
        let result = Args::try_parse_from(["harvester", "split", "index.csv"]);
        assert!(result.is_err());

        let args = Args::try_parse_from(["harvester", "split", "index.csv", "outcomes.csv"]).unwrap();
        match args.command {
            Command::Split {
                index, outcomes, ..
            } => {
                assert_eq!(index, PathBuf::from("index.csv"));
                assert_eq!(outcomes, PathBuf::from("outcomes.csv"));
            }
            other => panic!("expected split, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_verbose_and_quiet_are_global() {
        let args = Args::try_parse_from(["harvester", "scrape", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["harvester", "-q", "download", "index.csv"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["harvester", "--help"]);
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::DisplayHelp
        );
    }

    #[test]
    fn test_cli_unknown_subcommand_rejected() {
        let result = Args::try_parse_from(["harvester", "upload"]);
        assert!(result.is_err());
    }
}
