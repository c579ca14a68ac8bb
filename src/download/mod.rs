//! Download pipeline: HTTP client, per-host pacing, and the batch engine.
//!
//! This module is the second pass of the harvest: it consumes the index and
//! the filename assignment, fetches every task that is not already on disk,
//! and records one outcome per task. Streaming keeps memory flat for large
//! files; per-host pacing keeps the pipeline polite.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use harvester_core::download::{DownloadEngine, HttpClient, RateLimiter};
//! use harvester_core::resolver::build_default_registry;
//!
//! # async fn example(assignments: Vec<harvester_core::naming::Assignment>)
//! #     -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = Arc::new(RateLimiter::new(Duration::from_secs(3)));
//! let client = HttpClient::new();
//! let registry = Arc::new(build_default_registry(client.clone(), Arc::clone(&limiter)));
//! let engine = DownloadEngine::new(8, limiter, registry)?;
//! let report = engine
//!     .run(&assignments, &client, Path::new("./archive"), None)
//!     .await?;
//! report.summary().log();
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
pub mod rate_limiter;

pub use client::HttpClient;
pub use engine::{DEFAULT_CONCURRENCY, DownloadEngine, EngineError, failure_label};
pub use error::DownloadError;
pub use rate_limiter::{RateLimiter, extract_host};
