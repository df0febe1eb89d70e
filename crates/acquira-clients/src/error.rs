//! Three-way error classification for sibling service calls.

use std::error::Error as StdError;

use thiserror::Error;

/// Errors raised by sibling service clients.
///
/// The three variants are the classification the orchestrator's
/// skip-vs-fail policy keys on: an unreachable sibling degrades optional
/// stages gracefully, a reachable-but-errored sibling fails them.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No HTTP response was obtained: connection refused, DNS failure, or
    /// request timeout.
    #[error("{service} unreachable during {operation}")]
    Unreachable {
        /// Sibling service name.
        service: &'static str,
        /// Operation identifier.
        operation: &'static str,
        /// Underlying transport failure.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    /// The sibling answered with a non-2xx status.
    #[error("{service} returned status {status} during {operation}")]
    HttpStatus {
        /// Sibling service name.
        service: &'static str,
        /// Operation identifier.
        operation: &'static str,
        /// HTTP status code received.
        status: u16,
    },
    /// The sibling answered 2xx but the body was missing required fields.
    #[error("{service} returned a malformed response during {operation}: {detail}")]
    Malformed {
        /// Sibling service name.
        service: &'static str,
        /// Operation identifier.
        operation: &'static str,
        /// What was wrong with the body.
        detail: String,
    },
}

impl ClientError {
    /// Whether the failure means the sibling could not be reached at all.
    #[must_use]
    pub const fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }

    /// The HTTP status carried by the error, when one was received.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Unreachable { .. } | Self::Malformed { .. } => None,
        }
    }
}

/// Convenience alias for sibling client results.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_helpers() {
        let malformed = ClientError::Malformed {
            service: "torrent",
            operation: "submit",
            detail: "missing id".to_string(),
        };
        assert!(!malformed.is_unreachable());
        assert_eq!(malformed.status(), None);

        let http = ClientError::HttpStatus {
            service: "metadata",
            operation: "enrich",
            status: 500,
        };
        assert!(!http.is_unreachable());
        assert_eq!(http.status(), Some(500));
        assert!(http.to_string().contains("500"));
    }
}
