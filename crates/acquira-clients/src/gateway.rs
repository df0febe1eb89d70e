//! Gateway trait and response DTOs shared by the HTTP implementation and
//! the orchestrator's test doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientResult;

/// VPN manager status payload.
///
/// The manager reports either `{active: bool}` or `{status: "connected"}`
/// depending on its version; both shapes are accepted.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct VpnStatus {
    /// Explicit active flag, when present.
    #[serde(default)]
    pub active: Option<bool>,
    /// Status label, when present.
    #[serde(default)]
    pub status: Option<String>,
}

impl VpnStatus {
    /// Whether the VPN is verified active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active == Some(true) || self.status.as_deref() == Some("connected")
    }
}

/// Torrent transfer status as reported by the torrent manager.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferStatus {
    /// Raw status label.
    pub status: String,
    /// Completion fraction when reported.
    #[serde(default)]
    pub progress: Option<f64>,
    /// Payload path when reported.
    #[serde(default)]
    pub download_path: Option<String>,
}

impl TransferStatus {
    /// Whether the transfer finished (completed or seeding).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.status.as_str(), "completed" | "seeding")
    }

    /// Whether the transfer failed terminally.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.status.as_str(), "error" | "failed")
    }
}

/// Request payload for submitting an encoding job.
#[derive(Debug, Clone, Serialize)]
pub struct EncodeRequest {
    /// Location of the downloaded payload.
    pub input_url: String,
    /// Input kind; always `file` for pipeline submissions.
    pub input_type: String,
    /// Encoding profile to apply, when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    /// Scheduling priority within the media processor.
    pub priority: i32,
}

impl EncodeRequest {
    /// Build a file-input encode request at the pipeline's default priority.
    #[must_use]
    pub fn for_file(input_url: impl Into<String>, profile_id: Option<String>) -> Self {
        Self {
            input_url: input_url.into(),
            input_type: "file".to_string(),
            profile_id,
            priority: 5,
        }
    }
}

/// Media processor job status with its outputs.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct JobStatus {
    /// Raw status label.
    #[serde(default)]
    pub status: String,
    /// Rendition outputs, populated on completion.
    #[serde(default)]
    pub outputs: Option<JobOutputs>,
    /// Failure detail when the job errored.
    #[serde(default)]
    pub error: Option<String>,
}

impl JobStatus {
    /// Whether the job finished successfully.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status == "completed"
    }

    /// Whether the job failed terminally.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.status.as_str(), "failed" | "error")
    }
}

/// Rendition outputs produced by an encoding job.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct JobOutputs {
    /// HLS manifest location.
    #[serde(default)]
    pub hls_manifest_url: Option<String>,
    /// DASH manifest location.
    #[serde(default)]
    pub dash_manifest_url: Option<String>,
    /// Subtitle tracks muxed alongside the renditions.
    #[serde(default)]
    pub subtitle_tracks: Vec<SubtitleTrack>,
}

/// A single subtitle track attached to encoded output.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubtitleTrack {
    /// BCP-47 language tag.
    pub language: String,
    /// Track location.
    pub url: String,
}

/// Request payload for publishing to the library backend.
#[derive(Debug, Clone, Serialize)]
pub struct PublishRequest {
    /// TMDB identifier, when resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<i64>,
    /// Display title.
    pub title: String,
    /// Content kind label.
    #[serde(rename = "type")]
    pub content_type: String,
    /// HLS manifest location; null when encoding was skipped.
    pub hls_manifest_url: Option<String>,
    /// DASH manifest location; null when encoding was skipped.
    pub dash_manifest_url: Option<String>,
    /// Subtitle tracks; empty when unavailable.
    pub subtitle_tracks: Vec<SubtitleTrack>,
    /// Forwarded metadata bag.
    pub metadata: Value,
}

/// Typed calls to the sibling services, one method per endpoint.
///
/// Implementations classify every failure via [`crate::ClientError`]; the
/// orchestrator never inspects transport details itself.
#[async_trait]
pub trait SiblingGateway: Send + Sync {
    /// Fetch the VPN manager's status.
    async fn vpn_status(&self) -> ClientResult<VpnStatus>;

    /// Submit a magnet or torrent URL; returns the manager's download id.
    async fn submit_torrent(&self, url: &str) -> ClientResult<String>;

    /// Fetch the transfer status for a previously submitted download.
    async fn torrent_status(&self, download_id: &str) -> ClientResult<TransferStatus>;

    /// Request metadata enrichment for a title.
    async fn enrich_metadata(&self, title: &str, content_type: &str) -> ClientResult<()>;

    /// Request a subtitle search for a title.
    async fn search_subtitles(&self, title: &str) -> ClientResult<()>;

    /// Submit an encoding job; returns the processor's job id.
    async fn submit_encode_job(&self, request: &EncodeRequest) -> ClientResult<String>;

    /// Fetch the status (and outputs) of an encoding job.
    async fn encode_job_status(&self, job_id: &str) -> ClientResult<JobStatus>;

    /// Publish encoded content to the library backend.
    async fn publish(&self, request: &PublishRequest) -> ClientResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vpn_status_accepts_both_shapes() {
        let flag: VpnStatus = serde_json::from_value(json!({"active": true})).expect("flag shape");
        assert!(flag.is_active());

        let label: VpnStatus =
            serde_json::from_value(json!({"status": "connected"})).expect("label shape");
        assert!(label.is_active());

        let inactive: VpnStatus =
            serde_json::from_value(json!({"active": false, "status": "connecting"}))
                .expect("inactive shape");
        assert!(!inactive.is_active());

        let empty: VpnStatus = serde_json::from_value(json!({})).expect("empty shape");
        assert!(!empty.is_active());
    }

    #[test]
    fn transfer_status_terminal_labels() {
        for label in ["completed", "seeding"] {
            let status: TransferStatus =
                serde_json::from_value(json!({"status": label})).expect("status");
            assert!(status.is_finished());
            assert!(!status.is_failed());
        }
        for label in ["error", "failed"] {
            let status: TransferStatus =
                serde_json::from_value(json!({"status": label})).expect("status");
            assert!(status.is_failed());
        }
        let in_progress: TransferStatus =
            serde_json::from_value(json!({"status": "downloading", "progress": 0.4}))
                .expect("status");
        assert!(!in_progress.is_finished());
        assert!(!in_progress.is_failed());
    }

    #[test]
    fn encode_request_defaults() {
        let request = EncodeRequest::for_file("/downloads/dune.mkv", Some("hevc".to_string()));
        assert_eq!(request.input_type, "file");
        assert_eq!(request.priority, 5);
        let body = serde_json::to_value(&request).expect("serializable");
        assert_eq!(body["profile_id"], "hevc");
    }

    #[test]
    fn publish_request_serialises_nulls_for_missing_manifests() {
        let request = PublishRequest {
            tmdb_id: None,
            title: "Dune".to_string(),
            content_type: "movie".to_string(),
            hls_manifest_url: None,
            dash_manifest_url: None,
            subtitle_tracks: Vec::new(),
            metadata: json!({}),
        };
        let body = serde_json::to_value(&request).expect("serializable");
        assert!(body["hls_manifest_url"].is_null());
        assert!(body["dash_manifest_url"].is_null());
        assert_eq!(body["type"], "movie");
        assert!(body.get("tmdb_id").is_none());
    }
}
