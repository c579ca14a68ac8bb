//! Constants for the download module (timeouts, pacing, validation).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default minimum interval between requests to one host (seconds).
pub const DEFAULT_HOST_INTERVAL_SECS: u64 = 3;

/// Default minimum interval for the indirect document host (seconds).
///
/// The host enforces an hourly request budget; this spacing keeps a full run
/// under it. Repeated runs, not one run, are expected to finish the backlog.
pub const DEFAULT_NEPIS_INTERVAL_SECS: u64 = 40;

/// Smallest credible size for a binary document payload (bytes).
pub const MIN_BINARY_BYTES: u64 = 100;
