//! Error types for the data access layer.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use acquira_core::StateError;

/// Result alias for data layer operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised by the data access layer.
#[derive(Debug)]
pub enum DataError {
    /// Migration execution failed.
    MigrationFailed {
        /// Underlying migration error.
        source: sqlx::migrate::MigrateError,
    },
    /// A database operation failed.
    QueryFailed {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying SQL error.
        source: sqlx::Error,
    },
    /// A row the operation requires does not exist.
    NotFound {
        /// Entity kind that was missing.
        entity: &'static str,
    },
    /// A state-machine rule rejected the operation.
    State {
        /// Underlying state error.
        source: StateError,
    },
}

impl DataError {
    /// Whether the error is an illegal state transition.
    #[must_use]
    pub const fn is_invalid_transition(&self) -> bool {
        matches!(
            self,
            Self::State {
                source: StateError::InvalidTransition { .. }
            }
        )
    }
}

impl Display for DataError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MigrationFailed { .. } => formatter.write_str("migration failed"),
            Self::QueryFailed { operation, .. } => {
                write!(formatter, "database operation failed: {operation}")
            }
            Self::NotFound { entity } => write!(formatter, "{entity} not found"),
            Self::State { source } => write!(formatter, "{source}"),
        }
    }
}

impl Error for DataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MigrationFailed { source } => Some(source),
            Self::QueryFailed { source, .. } => Some(source),
            Self::NotFound { .. } => None,
            Self::State { source } => Some(source),
        }
    }
}

impl From<StateError> for DataError {
    fn from(source: StateError) -> Self {
        Self::State { source }
    }
}

/// Tag a raw `sqlx` error with the operation that produced it.
pub(crate) fn query_failed(operation: &'static str) -> impl FnOnce(sqlx::Error) -> DataError {
    move |source| DataError::QueryFailed { operation, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acquira_core::DownloadState;

    #[test]
    fn data_error_display_and_source() {
        let query = DataError::QueryFailed {
            operation: "downloads.fetch",
            source: sqlx::Error::RowNotFound,
        };
        assert_eq!(
            query.to_string(),
            "database operation failed: downloads.fetch"
        );
        assert!(query.source().is_some());

        let missing = DataError::NotFound { entity: "download" };
        assert_eq!(missing.to_string(), "download not found");
        assert!(missing.source().is_none());

        let state = DataError::from(StateError::InvalidTransition {
            from: DownloadState::Completed,
            to: DownloadState::Created,
        });
        assert!(state.is_invalid_transition());
        assert!(state.source().is_some());
    }
}
