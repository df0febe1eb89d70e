//! Typed configuration model and the environment loader.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};
use crate::validate::validate;

/// Complete configuration recognised by the plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// VPN manager base URL.
    pub vpn_url: String,
    /// Torrent manager base URL.
    pub torrent_url: String,
    /// Metadata enrichment base URL.
    pub metadata_url: String,
    /// Subtitle manager base URL.
    pub subtitle_url: String,
    /// Media processor base URL; empty means encoding auto-skips.
    pub media_url: Option<String>,
    /// Publishing backend base URL; empty means publishing auto-skips.
    pub publish_url: Option<String>,
    /// Minutes between RSS scheduler ticks.
    pub rss_check_interval_minutes: u64,
    /// Seconds between poll attempts.
    pub poll_interval_seconds: u64,
    /// Maximum poll attempts for torrent downloads.
    pub download_poll_max_attempts: u32,
    /// Maximum poll attempts for encoding jobs.
    pub encoding_poll_max_attempts: u32,
    /// Per-request HTTP timeout in milliseconds.
    pub http_timeout_ms: u64,
    /// Similarity threshold for fuzzy title matching.
    pub fuzzy_match_threshold: f64,
    /// Concurrent feed checks per scheduler tick.
    pub feed_check_concurrency: usize,
    /// Concurrent download workers.
    pub download_worker_count: usize,
}

impl AppConfig {
    /// Load configuration from the process environment, applying defaults
    /// for everything but the database and the four mandatory sibling URLs.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is absent, a value fails to
    /// parse, or validation rejects the assembled configuration.
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self {
            database_url: require("ACQUIRA_DATABASE_URL")?,
            vpn_url: require("ACQUIRA_VPN_URL")?,
            torrent_url: require("ACQUIRA_TORRENT_URL")?,
            metadata_url: require("ACQUIRA_METADATA_URL")?,
            subtitle_url: require("ACQUIRA_SUBTITLE_URL")?,
            media_url: optional("ACQUIRA_MEDIA_URL"),
            publish_url: optional("ACQUIRA_PUBLISH_URL"),
            rss_check_interval_minutes: parsed(
                "ACQUIRA_RSS_CHECK_INTERVAL_MINUTES",
                "rss_check_interval_minutes",
                defaults::RSS_CHECK_INTERVAL_MINUTES,
            )?,
            poll_interval_seconds: parsed(
                "ACQUIRA_POLL_INTERVAL_SECONDS",
                "poll_interval_seconds",
                defaults::POLL_INTERVAL_SECONDS,
            )?,
            download_poll_max_attempts: parsed(
                "ACQUIRA_DOWNLOAD_POLL_MAX_ATTEMPTS",
                "download_poll_max_attempts",
                defaults::DOWNLOAD_POLL_MAX_ATTEMPTS,
            )?,
            encoding_poll_max_attempts: parsed(
                "ACQUIRA_ENCODING_POLL_MAX_ATTEMPTS",
                "encoding_poll_max_attempts",
                defaults::ENCODING_POLL_MAX_ATTEMPTS,
            )?,
            http_timeout_ms: parsed(
                "ACQUIRA_HTTP_TIMEOUT_MS",
                "http_timeout_ms",
                defaults::HTTP_TIMEOUT_MS,
            )?,
            fuzzy_match_threshold: parsed(
                "ACQUIRA_FUZZY_MATCH_THRESHOLD",
                "fuzzy_match_threshold",
                defaults::FUZZY_MATCH_THRESHOLD,
            )?,
            feed_check_concurrency: parsed(
                "ACQUIRA_FEED_CHECK_CONCURRENCY",
                "feed_check_concurrency",
                defaults::FEED_CHECK_CONCURRENCY,
            )?,
            download_worker_count: parsed(
                "ACQUIRA_DOWNLOAD_WORKER_COUNT",
                "download_worker_count",
                defaults::DOWNLOAD_WORKER_COUNT,
            )?,
        };

        validate(&config)?;
        Ok(config)
    }

    /// Per-request HTTP timeout as a [`Duration`].
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Interval between poll attempts as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Interval between RSS scheduler ticks as a [`Duration`].
    #[must_use]
    pub const fn rss_check_interval(&self) -> Duration {
        Duration::from_secs(self.rss_check_interval_minutes * 60)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            vpn_url: String::new(),
            torrent_url: String::new(),
            metadata_url: String::new(),
            subtitle_url: String::new(),
            media_url: None,
            publish_url: None,
            rss_check_interval_minutes: defaults::RSS_CHECK_INTERVAL_MINUTES,
            poll_interval_seconds: defaults::POLL_INTERVAL_SECONDS,
            download_poll_max_attempts: defaults::DOWNLOAD_POLL_MAX_ATTEMPTS,
            encoding_poll_max_attempts: defaults::ENCODING_POLL_MAX_ATTEMPTS,
            http_timeout_ms: defaults::HTTP_TIMEOUT_MS,
            fuzzy_match_threshold: defaults::FUZZY_MATCH_THRESHOLD,
            feed_check_concurrency: defaults::FEED_CHECK_CONCURRENCY,
            download_worker_count: defaults::DOWNLOAD_WORKER_COUNT,
        }
    }
}

fn require(name: &'static str) -> ConfigResult<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::MissingEnv { name })
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(
    name: &str,
    field: &'static str,
    default: T,
) -> ConfigResult<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidField {
                    field,
                    value: Some(raw),
                    reason: "could not be parsed",
                })
        }
        _ => Ok(default),
    }
}
