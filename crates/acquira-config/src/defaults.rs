//! Documented defaults for every tunable the plugin recognises.

/// Minutes between RSS scheduler ticks.
pub const RSS_CHECK_INTERVAL_MINUTES: u64 = 30;

/// Seconds between poll attempts against the torrent manager and the media
/// processor.
pub const POLL_INTERVAL_SECONDS: u64 = 30;

/// Maximum poll attempts for a torrent download (roughly six hours at the
/// default interval).
pub const DOWNLOAD_POLL_MAX_ATTEMPTS: u32 = 720;

/// Maximum poll attempts for an encoding job (roughly twenty-four hours at
/// the default interval).
pub const ENCODING_POLL_MAX_ATTEMPTS: u32 = 2_880;

/// Per-request HTTP timeout in milliseconds.
pub const HTTP_TIMEOUT_MS: u64 = 30_000;

/// Similarity threshold for fuzzy title matching.
pub const FUZZY_MATCH_THRESHOLD: f64 = 0.8;

/// Concurrent feed checks allowed per scheduler tick.
pub const FEED_CHECK_CONCURRENCY: usize = 4;

/// Consecutive feed failures before the scheduler escalates its logging.
pub const FEED_FAILURE_ESCALATION: i32 = 5;

/// Concurrent download workers driving the state machine.
pub const DOWNLOAD_WORKER_COUNT: usize = 2;
