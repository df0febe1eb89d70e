//! Pipeline run model: aggregate status, per-stage progress, and the typed
//! metadata record the orchestrator inspects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// How a pipeline run came into existence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    /// A user submitted the content directly.
    Manual,
    /// The RSS ingestor matched a feed item against a subscription.
    Rss,
    /// A scheduled job created the run.
    Scheduled,
}

impl RunTrigger {
    /// Render the trigger as its lowercase storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Rss => "rss",
            Self::Scheduled => "scheduled",
        }
    }

    /// Parse a storage label back into a trigger.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "manual" => Some(Self::Manual),
            "rss" => Some(Self::Rss),
            "scheduled" => Some(Self::Scheduled),
            _ => None,
        }
    }
}

/// Kind of content a run or download acquires.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Feature-length film.
    Movie,
    /// Television episode or season pack.
    TvShow,
    /// Anime release.
    Anime,
    /// Music album or track.
    Music,
    /// Podcast episode.
    Podcast,
    /// Content whose kind the trigger did not identify.
    Other,
}

impl ContentType {
    /// Render the content type as its lowercase storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::TvShow => "tv_show",
            Self::Anime => "anime",
            Self::Music => "music",
            Self::Podcast => "podcast",
            Self::Other => "other",
        }
    }

    /// Parse a storage label, falling back to [`Self::Other`] for labels
    /// written by newer versions of the platform.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        match label {
            "movie" => Self::Movie,
            "tv_show" => Self::TvShow,
            "anime" => Self::Anime,
            "music" => Self::Music,
            "podcast" => Self::Podcast,
            _ => Self::Other,
        }
    }
}

/// Stages of the acquisition pipeline, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// VPN verification; downloads never run without it.
    Vpn,
    /// Torrent submission and download polling.
    Torrent,
    /// Metadata enrichment (optional).
    Metadata,
    /// Subtitle search (optional).
    Subtitle,
    /// Encoding job submission and polling (optional).
    Encoding,
    /// Library publishing (optional).
    Publishing,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Self; 6] = [
        Self::Vpn,
        Self::Torrent,
        Self::Metadata,
        Self::Subtitle,
        Self::Encoding,
        Self::Publishing,
    ];

    /// Render the stage as its lowercase storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vpn => "vpn",
            Self::Torrent => "torrent",
            Self::Metadata => "metadata",
            Self::Subtitle => "subtitle",
            Self::Encoding => "encoding",
            Self::Publishing => "publishing",
        }
    }

    /// Whether a failure of this stage halts the pipeline unconditionally.
    ///
    /// Optional stages degrade gracefully when their sibling service is
    /// unreachable; mandatory stages never do.
    #[must_use]
    pub const fn is_mandatory(self) -> bool {
        matches!(self, Self::Vpn | Self::Torrent)
    }
}

/// Status of a single stage within a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The stage has not been entered yet.
    #[default]
    Pending,
    /// The stage is currently executing (or polling).
    Running,
    /// The stage finished successfully.
    Completed,
    /// The stage failed.
    Failed,
    /// The stage was skipped under graceful degradation.
    Skipped,
}

impl StageStatus {
    /// Render the status as its lowercase storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Parse a storage label back into a status.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Whether the stage has reached a terminal status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// Aggregate status of a pipeline run. Tracks the latest stage entered plus
/// the terminal outcomes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Created but not yet picked up by the orchestrator.
    #[default]
    Pending,
    /// VPN verification in progress.
    VpnChecking,
    /// Parked because the VPN was inactive or unreachable.
    VpnWaiting,
    /// Torrent submitted; download in progress.
    Downloading,
    /// Metadata enrichment in progress.
    Enriching,
    /// Subtitle search in progress.
    FetchingSubtitles,
    /// Encoding job submitted or polling.
    Encoding,
    /// Publishing to the library backend.
    Publishing,
    /// Every stage reached a terminal status without a hard failure.
    Completed,
    /// A stage failed and the pipeline stopped.
    Failed,
    /// An operator cancelled the run externally.
    Cancelled,
}

impl PipelineStatus {
    /// Render the status as its lowercase storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::VpnChecking => "vpn_checking",
            Self::VpnWaiting => "vpn_waiting",
            Self::Downloading => "downloading",
            Self::Enriching => "enriching",
            Self::FetchingSubtitles => "fetching_subtitles",
            Self::Encoding => "encoding",
            Self::Publishing => "publishing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse a storage label back into a status.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(Self::Pending),
            "vpn_checking" => Some(Self::VpnChecking),
            "vpn_waiting" => Some(Self::VpnWaiting),
            "downloading" => Some(Self::Downloading),
            "enriching" => Some(Self::Enriching),
            "fetching_subtitles" => Some(Self::FetchingSubtitles),
            "encoding" => Some(Self::Encoding),
            "publishing" => Some(Self::Publishing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether the run can no longer advance.
    ///
    /// `vpn_waiting` is deliberately excluded: a parked run resumes once the
    /// VPN comes back, via the retry planner.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// The aggregate status entered alongside a stage.
    #[must_use]
    pub const fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Vpn => Self::VpnChecking,
            Stage::Torrent => Self::Downloading,
            Stage::Metadata => Self::Enriching,
            Stage::Subtitle => Self::FetchingSubtitles,
            Stage::Encoding => Self::Encoding,
            Stage::Publishing => Self::Publishing,
        }
    }
}

/// Typed metadata record carried by a run, plus a free-form bag for fields
/// the orchestrator forwards without inspecting.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RunMetadata {
    /// Magnet URI handed to the torrent manager.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub magnet_url: Option<String>,
    /// `.torrent` file URL handed to the torrent manager.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torrent_url: Option<String>,
    /// Path the torrent manager reported the payload at.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_path: Option<String>,
    /// TMDB identifier used for enrichment and publishing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<i64>,
    /// Encoding profile requested for the media processor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_profile_id: Option<String>,
    /// Forwarder data the orchestrator never inspects.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RunMetadata {
    /// The URL submitted to the torrent manager, magnet preferred.
    #[must_use]
    pub fn source_url(&self) -> Option<&str> {
        fn present(url: &Option<String>) -> Option<&str> {
            url.as_deref().filter(|url| !url.is_empty())
        }
        present(&self.magnet_url).or_else(|| present(&self.torrent_url))
    }
}

/// Started/completed timestamps plus status for a single stage of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StageProgress {
    /// Current status of the stage.
    pub status: StageStatus,
    /// When the stage was entered.
    pub started_at: Option<DateTime<Utc>>,
    /// When the stage reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

/// A single traversal of the seven-stage acquisition workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineRun {
    /// Monotonically increasing identifier.
    pub id: i64,
    /// Account scope that owns the run.
    pub account_id: Uuid,
    /// How the run was triggered.
    pub trigger: RunTrigger,
    /// Title of the content being acquired.
    pub content_title: String,
    /// Kind of content being acquired.
    pub content_type: ContentType,
    /// Aggregate pipeline status.
    pub status: PipelineStatus,
    /// VPN verification progress.
    pub vpn: StageProgress,
    /// Torrent submit/poll progress.
    pub torrent: StageProgress,
    /// Metadata enrichment progress.
    pub metadata_stage: StageProgress,
    /// Subtitle search progress.
    pub subtitle: StageProgress,
    /// Encoding progress.
    pub encoding: StageProgress,
    /// Publishing progress.
    pub publishing: StageProgress,
    /// Typed metadata record plus forwarder bag.
    pub metadata: RunMetadata,
    /// Identifier the torrent manager assigned on submission.
    pub torrent_download_id: Option<String>,
    /// Identifier the media processor assigned on submission.
    pub encoding_job_id: Option<String>,
    /// Most recent human-readable failure cause.
    pub error_message: Option<String>,
    /// When the run row was created.
    pub created_at: DateTime<Utc>,
    /// When the run row was last written.
    pub updated_at: DateTime<Utc>,
    /// When the run reached `completed`.
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Progress record for the given stage.
    #[must_use]
    pub const fn stage(&self, stage: Stage) -> &StageProgress {
        match stage {
            Stage::Vpn => &self.vpn,
            Stage::Torrent => &self.torrent,
            Stage::Metadata => &self.metadata_stage,
            Stage::Subtitle => &self.subtitle,
            Stage::Encoding => &self.encoding,
            Stage::Publishing => &self.publishing,
        }
    }

    /// Mutable progress record for the given stage.
    #[must_use]
    pub const fn stage_mut(&mut self, stage: Stage) -> &mut StageProgress {
        match stage {
            Stage::Vpn => &mut self.vpn,
            Stage::Torrent => &mut self.torrent,
            Stage::Metadata => &mut self.metadata_stage,
            Stage::Subtitle => &mut self.subtitle,
            Stage::Encoding => &mut self.encoding,
            Stage::Publishing => &mut self.publishing,
        }
    }

    /// Whether any stage is still recorded as `running`.
    #[must_use]
    pub fn has_running_stage(&self) -> bool {
        Stage::ALL
            .iter()
            .any(|stage| self.stage(*stage).status == StageStatus::Running)
    }
}
