//! Boot-time error type with operation tags for diagnosis.

use thiserror::Error;

/// Errors raised while assembling or running the application.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration loading or validation failed.
    #[error("configuration error during {operation}")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying configuration error.
        #[source]
        source: acquira_config::ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("telemetry error during {operation}")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },
    /// The store could not be reached or migrated.
    #[error("store error during {operation}")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying data error.
        #[source]
        source: acquira_data::DataError,
    },
    /// An HTTP client could not be constructed.
    #[error("http client error during {operation}")]
    Client {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: acquira_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) fn telemetry(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn store(operation: &'static str, source: acquira_data::DataError) -> Self {
        Self::Store { operation, source }
    }

    pub(crate) const fn client(operation: &'static str, source: reqwest::Error) -> Self {
        Self::Client { operation, source }
    }
}

/// Convenience alias for application results.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_carry_operation_tags() {
        let error = AppError::config(
            "config.from_env",
            acquira_config::ConfigError::MissingEnv {
                name: "ACQUIRA_DATABASE_URL",
            },
        );
        assert!(error.to_string().contains("config.from_env"));
        assert!(std::error::Error::source(&error).is_some());
    }
}
