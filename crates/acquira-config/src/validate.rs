//! Validation applied to an assembled configuration before bootstrap.

use crate::error::{ConfigError, ConfigResult};
use crate::model::AppConfig;

/// Validate an assembled configuration.
///
/// # Errors
///
/// Returns the first [`ConfigError::InvalidField`] encountered.
pub fn validate(config: &AppConfig) -> ConfigResult<()> {
    check_url("vpn_url", &config.vpn_url)?;
    check_url("torrent_url", &config.torrent_url)?;
    check_url("metadata_url", &config.metadata_url)?;
    check_url("subtitle_url", &config.subtitle_url)?;
    if let Some(url) = config.media_url.as_deref() {
        check_url("media_url", url)?;
    }
    if let Some(url) = config.publish_url.as_deref() {
        check_url("publish_url", url)?;
    }

    check_nonzero(
        "rss_check_interval_minutes",
        config.rss_check_interval_minutes,
    )?;
    check_nonzero("poll_interval_seconds", config.poll_interval_seconds)?;
    check_nonzero("http_timeout_ms", config.http_timeout_ms)?;
    check_nonzero(
        "download_poll_max_attempts",
        u64::from(config.download_poll_max_attempts),
    )?;
    check_nonzero(
        "encoding_poll_max_attempts",
        u64::from(config.encoding_poll_max_attempts),
    )?;
    check_nonzero(
        "feed_check_concurrency",
        config.feed_check_concurrency as u64,
    )?;
    check_nonzero(
        "download_worker_count",
        config.download_worker_count as u64,
    )?;

    if !(config.fuzzy_match_threshold > 0.0 && config.fuzzy_match_threshold <= 1.0) {
        return Err(ConfigError::InvalidField {
            field: "fuzzy_match_threshold",
            value: Some(config.fuzzy_match_threshold.to_string()),
            reason: "must be within (0, 1]",
        });
    }

    Ok(())
}

fn check_url(field: &'static str, url: &str) -> ConfigResult<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidField {
            field,
            value: Some(url.to_string()),
            reason: "must be an http(s) URL",
        })
    }
}

fn check_nonzero(field: &'static str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        Err(ConfigError::InvalidField {
            field,
            value: Some("0".to_string()),
            reason: "must be positive",
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/acquira".to_string(),
            vpn_url: "http://vpn.local".to_string(),
            torrent_url: "http://torrent.local".to_string(),
            metadata_url: "http://metadata.local".to_string(),
            subtitle_url: "http://subtitles.local".to_string(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn valid_configuration_passes() {
        assert_eq!(validate(&valid_config()), Ok(()));
    }

    #[test]
    fn non_http_url_is_rejected() {
        let mut config = valid_config();
        config.torrent_url = "torrent.local".to_string();
        let error = validate(&config).expect_err("bare host should be rejected");
        assert!(matches!(
            error,
            ConfigError::InvalidField {
                field: "torrent_url",
                ..
            }
        ));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut config = valid_config();
        config.poll_interval_seconds = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn threshold_outside_unit_interval_is_rejected() {
        let mut config = valid_config();
        config.fuzzy_match_threshold = 1.2;
        assert!(validate(&config).is_err());

        config.fuzzy_match_threshold = 0.0;
        assert!(validate(&config).is_err());

        config.fuzzy_match_threshold = 1.0;
        assert_eq!(validate(&config), Ok(()));
    }

    #[test]
    fn optional_media_url_is_validated_when_present() {
        let mut config = valid_config();
        config.media_url = Some("not-a-url".to_string());
        assert!(validate(&config).is_err());

        config.media_url = Some("https://media.local".to_string());
        assert_eq!(validate(&config), Ok(()));
    }
}
