//! Error types shared across the acquisition domain.

use thiserror::Error;

use crate::download::DownloadState;

/// Errors raised when validating or applying state-machine operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// The requested transition is not present in the legal transition table.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// State the download currently occupies.
        from: DownloadState,
        /// State the caller attempted to enter.
        to: DownloadState,
    },
    /// A persisted state label was not recognised by the transition table.
    #[error("unknown download state '{label}'")]
    UnknownState {
        /// Raw label read from the store.
        label: String,
    },
}

/// Convenience alias for state-machine results.
pub type StateResult<T> = Result<T, StateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_names_both_states() {
        let error = StateError::InvalidTransition {
            from: DownloadState::Completed,
            to: DownloadState::Downloading,
        };
        assert_eq!(
            error.to_string(),
            "invalid transition from completed to downloading"
        );
    }

    #[test]
    fn unknown_state_carries_label() {
        let error = StateError::UnknownState {
            label: "warp".to_string(),
        };
        assert!(error.to_string().contains("warp"));
    }
}
