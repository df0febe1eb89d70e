//! Configuration error types.

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable was absent.
    #[error("missing required environment variable {name}")]
    MissingEnv {
        /// Variable name.
        name: &'static str,
    },
    /// A provided value could not be parsed or failed validation.
    #[error("invalid value for {field}: {reason}")]
    InvalidField {
        /// Configuration field name.
        field: &'static str,
        /// Offending value, when printable.
        value: Option<String>,
        /// Why the value was rejected.
        reason: &'static str,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_field_context() {
        let missing = ConfigError::MissingEnv {
            name: "ACQUIRA_DATABASE_URL",
        };
        assert!(missing.to_string().contains("ACQUIRA_DATABASE_URL"));

        let invalid = ConfigError::InvalidField {
            field: "fuzzy_match_threshold",
            value: Some("1.7".to_string()),
            reason: "must be within (0, 1]",
        };
        assert!(invalid.to_string().contains("fuzzy_match_threshold"));
    }
}
