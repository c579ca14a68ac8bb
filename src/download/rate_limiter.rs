//! Per-host request pacing.
//!
//! This module provides the [`RateLimiter`] which enforces a minimum interval
//! between requests to the same host. Every outbound request — listing pages,
//! record pages, popup pages, and file downloads — acquires the limiter
//! first, so all traffic to one host is serialized and spaced while requests
//! to different hosts proceed independently.
//!
//! Hosts with stricter policies (the indirect document host enforces an
//! hourly budget) get their own interval via [`RateLimiter::with_host_interval`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use harvester_core::download::RateLimiter;
//!
//! # async fn example() {
//! let limiter = Arc::new(
//!     RateLimiter::new(Duration::from_secs(3))
//!         .with_host_interval("nepis.epa.gov", Duration::from_secs(40)),
//! );
//!
//! // First request to a host proceeds immediately.
//! limiter.acquire("https://example.com/file1.pdf").await;
//!
//! // Second request to the same host waits out the interval.
//! limiter.acquire("https://example.com/file2.pdf").await;
//!
//! // A different host proceeds immediately.
//! limiter.acquire("https://other.com/file.pdf").await;
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Warning threshold for cumulative delay per host (5 minutes).
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(300);

/// Per-host request pacer.
///
/// Designed to be wrapped in `Arc` and shared across Tokio tasks. Uses
/// `DashMap` for lock-free access to per-host state and `tokio::sync::Mutex`
/// for the atomic check-then-update on each host's timing.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum interval between requests to the same host.
    default_interval: Duration,

    /// Hosts with their own (usually stricter) interval.
    host_intervals: HashMap<String, Duration>,

    /// Whether pacing is disabled (interval 0).
    disabled: bool,

    /// Per-host state tracking.
    /// Arc lets the state be cloned out so the `DashMap` shard lock is
    /// released before awaiting on the inner Mutex.
    hosts: DashMap<String, Arc<HostState>>,
}

/// State tracked for each host.
#[derive(Debug)]
struct HostState {
    /// Time of the last request to this host.
    /// `None` means the host has not been requested yet (first request is
    /// immediate).
    last_request: Mutex<Option<Instant>>,

    /// Cumulative delay applied to this host, in milliseconds.
    cumulative_delay_ms: AtomicU64,
}

impl HostState {
    fn new() -> Self {
        Self {
            last_request: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    /// Adds to the cumulative delay and returns the new total.
    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let new_total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(new_total)
    }
}

impl RateLimiter {
    /// Creates a limiter with the given default per-host interval.
    #[must_use]
    #[instrument(skip_all, fields(interval_ms = default_interval.as_millis()))]
    pub fn new(default_interval: Duration) -> Self {
        debug!("creating rate limiter");
        Self {
            default_interval,
            host_intervals: HashMap::new(),
            disabled: false,
            hosts: DashMap::new(),
        }
    }

    /// Creates a disabled limiter that applies no delays.
    #[must_use]
    #[instrument]
    pub fn disabled() -> Self {
        debug!("creating disabled rate limiter");
        Self {
            default_interval: Duration::ZERO,
            host_intervals: HashMap::new(),
            disabled: true,
            hosts: DashMap::new(),
        }
    }

    /// Sets a host-specific interval, overriding the default for that host.
    #[must_use]
    pub fn with_host_interval(mut self, host: &str, interval: Duration) -> Self {
        self.host_intervals
            .insert(host.to_ascii_lowercase(), interval);
        self
    }

    /// Returns whether pacing is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the default interval between requests.
    #[must_use]
    pub fn default_interval(&self) -> Duration {
        self.default_interval
    }

    /// Returns the interval that applies to the given host.
    #[must_use]
    pub fn interval_for(&self, host: &str) -> Duration {
        self.host_intervals
            .get(&host.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default_interval)
    }

    /// Blocks until the minimum interval since the last request to the URL's
    /// host has elapsed, then records the new request time.
    ///
    /// The first request to any host proceeds immediately. Hosts never wait
    /// on each other. Callers waiting on the same host are admitted in lock
    /// acquisition order.
    #[instrument(skip(self), fields(host))]
    pub async fn acquire(&self, url: &str) {
        if self.disabled {
            return;
        }

        let host = extract_host(url);
        tracing::Span::current().record("host", &host);
        let interval = self.interval_for(&host);

        // Get or create host state, clone Arc to release the DashMap lock
        // before awaiting.
        let state = self
            .hosts
            .entry(host.clone())
            .or_insert_with(|| Arc::new(HostState::new()))
            .clone();

        // Only the Mutex lock is held across the await.
        let mut last_request_guard = state.last_request.lock().await;

        if let Some(last_request) = *last_request_guard {
            let elapsed = last_request.elapsed();

            if elapsed < interval {
                let delay = interval.saturating_sub(elapsed);
                let cumulative = state.add_cumulative_delay(delay);

                debug!(
                    host = %host,
                    delay_ms = delay.as_millis(),
                    cumulative_ms = cumulative.as_millis(),
                    "applying pacing delay"
                );

                if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
                    warn!(
                        host = %host,
                        cumulative_delay_secs = cumulative.as_secs(),
                        "large cumulative pacing delay for host"
                    );
                }

                tokio::time::sleep(delay).await;
            }
        } else {
            debug!(host = %host, "first request to host - no delay");
        }

        // Update last request time after any delay.
        *last_request_guard = Some(Instant::now());
    }
}

/// Extracts the host from a URL.
///
/// Returns "unknown" for malformed URLs, ensuring all requests are still
/// paced even if the URL cannot be parsed.
#[must_use]
pub fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}
