//! User-facing download records and the legal state transition table.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{StateError, StateResult};
use crate::run::ContentType;

/// Lifecycle states of a download.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    /// Row created; nothing started yet.
    Created,
    /// Waiting for VPN verification.
    VpnConnecting,
    /// Searching indexers for a release.
    Searching,
    /// Torrent transfer in progress.
    Downloading,
    /// Encoding job in progress.
    Encoding,
    /// Subtitle fetch in progress.
    Subtitles,
    /// Uploading artifacts to the library backend.
    Uploading,
    /// Final bookkeeping before completion.
    Finalizing,
    /// Terminal success.
    Completed,
    /// Terminal failure; retryable back to `created`.
    Failed,
    /// Terminal cancellation.
    Cancelled,
    /// Paused by the user; resumable.
    Paused,
}

impl DownloadState {
    /// Every state the machine recognises.
    pub const ALL: [Self; 12] = [
        Self::Created,
        Self::VpnConnecting,
        Self::Searching,
        Self::Downloading,
        Self::Encoding,
        Self::Subtitles,
        Self::Uploading,
        Self::Finalizing,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
        Self::Paused,
    ];

    /// Render the state as its lowercase storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::VpnConnecting => "vpn_connecting",
            Self::Searching => "searching",
            Self::Downloading => "downloading",
            Self::Encoding => "encoding",
            Self::Subtitles => "subtitles",
            Self::Uploading => "uploading",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Paused => "paused",
        }
    }

    /// Parse a storage label back into a state.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownState`] for labels outside the table.
    pub fn parse(label: &str) -> StateResult<Self> {
        match label {
            "created" => Ok(Self::Created),
            "vpn_connecting" => Ok(Self::VpnConnecting),
            "searching" => Ok(Self::Searching),
            "downloading" => Ok(Self::Downloading),
            "encoding" => Ok(Self::Encoding),
            "subtitles" => Ok(Self::Subtitles),
            "uploading" => Ok(Self::Uploading),
            "finalizing" => Ok(Self::Finalizing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "paused" => Ok(Self::Paused),
            other => Err(StateError::UnknownState {
                label: other.to_string(),
            }),
        }
    }

    /// States reachable from this one.
    #[must_use]
    pub const fn allowed_transitions(self) -> &'static [Self] {
        match self {
            Self::Created => &[Self::VpnConnecting, Self::Failed, Self::Cancelled],
            Self::VpnConnecting => &[Self::Searching, Self::Failed, Self::Cancelled],
            Self::Searching => &[
                Self::Downloading,
                Self::Paused,
                Self::Failed,
                Self::Cancelled,
            ],
            Self::Downloading => &[Self::Encoding, Self::Paused, Self::Failed, Self::Cancelled],
            Self::Encoding => &[Self::Subtitles, Self::Paused, Self::Failed, Self::Cancelled],
            Self::Subtitles => &[Self::Uploading, Self::Failed, Self::Cancelled],
            Self::Uploading => &[Self::Finalizing, Self::Failed, Self::Cancelled],
            Self::Finalizing => &[Self::Completed, Self::Failed, Self::Cancelled],
            Self::Completed | Self::Cancelled => &[],
            Self::Failed => &[Self::Created],
            Self::Paused => &[
                Self::Searching,
                Self::Downloading,
                Self::Encoding,
                Self::Failed,
                Self::Cancelled,
            ],
        }
    }

    /// Whether `to` is a legal next state.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        self.allowed_transitions().contains(&to)
    }

    /// Validate a requested transition.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidTransition`] when the transition table
    /// does not permit moving from `self` to `to`.
    pub fn validate_transition(self, to: Self) -> StateResult<()> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(StateError::InvalidTransition { from: self, to })
        }
    }

    /// Whether the state admits no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl Display for DownloadState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A user-facing download tracked by the state machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Download {
    /// Unique identifier.
    pub id: Uuid,
    /// Account scope that owns the download.
    pub account_id: Uuid,
    /// User who initiated the download.
    pub user_id: Uuid,
    /// Kind of content being acquired.
    pub content_type: ContentType,
    /// Display title.
    pub title: String,
    /// Current state-machine state.
    pub state: DownloadState,
    /// Completion fraction in `[0, 1]`.
    pub progress: f64,
    /// Magnet URI when known.
    pub magnet_uri: Option<String>,
    /// Torrent-manager identifier when submitted.
    pub torrent_id: Option<String>,
    /// Media-processor job identifier when submitted.
    pub encoding_job_id: Option<String>,
    /// Quality profile label requested by the user.
    pub quality_profile: Option<String>,
    /// Number of `failed -> created` retries performed.
    pub retry_count: i32,
    /// Most recent human-readable failure cause.
    pub error_message: Option<String>,
    /// Owning show, for episodic content.
    pub show_id: Option<Uuid>,
    /// Season number, for episodic content.
    pub season: Option<i32>,
    /// Episode number, for episodic content.
    pub episode: Option<i32>,
    /// TMDB identifier when resolved.
    pub tmdb_id: Option<i64>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

/// Append-only record of a single state transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateHistoryEvent {
    /// Download the event belongs to.
    pub download_id: Uuid,
    /// State before the transition; `None` for the creation row.
    pub from_state: Option<DownloadState>,
    /// State after the transition.
    pub to_state: DownloadState,
    /// Opaque context recorded alongside the transition.
    pub metadata: Value,
    /// When the transition was committed.
    pub created_at: DateTime<Utc>,
}

/// Replay an ordered history and return the final state it produces.
///
/// Used by invariant checks: iterating history in order must reproduce the
/// download's current state.
#[must_use]
pub fn replay_history(history: &[StateHistoryEvent]) -> Option<DownloadState> {
    history.last().map(|event| event.to_state)
}

/// Find the state a paused download should resume to.
///
/// Walks the history in reverse for the most recent transition into
/// `paused` and resumes to that event's origin, defaulting to
/// `downloading` when the history is missing or malformed.
#[must_use]
pub fn resume_state(history: &[StateHistoryEvent]) -> DownloadState {
    history
        .iter()
        .rev()
        .find(|event| event.to_state == DownloadState::Paused)
        .and_then(|event| event.from_state)
        .unwrap_or(DownloadState::Downloading)
}
