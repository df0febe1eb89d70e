//! Narrow repository traits the pipeline components depend on.
//!
//! The sqlx-backed stores implement these directly; tests substitute
//! in-memory doubles so stage policy runs without a database.

use acquira_core::{
    Download, DownloadState, PipelineRun, PipelineStatus, QueueEntry, RunMetadata, Stage,
    StageStatus, StateHistoryEvent,
};
use acquira_data::{DataError, DownloadStore, QueueStore, RunStore};
use async_trait::async_trait;
use uuid::Uuid;

/// Store surface the orchestrator and retry planner require.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Fetch a run that must exist.
    async fn fetch_required(&self, id: i64) -> Result<PipelineRun, DataError>;

    /// Runs that have not reached a terminal aggregate status.
    async fn list_unfinished(&self) -> Result<Vec<PipelineRun>, DataError>;

    /// Mark a stage running and mirror the aggregate status.
    async fn mark_stage_running(&self, id: i64, stage: Stage) -> Result<(), DataError>;

    /// Record a stage's terminal status.
    async fn mark_stage_terminal(
        &self,
        id: i64,
        stage: Stage,
        status: StageStatus,
    ) -> Result<(), DataError>;

    /// Set the aggregate status.
    async fn set_status(&self, id: i64, status: PipelineStatus) -> Result<(), DataError>;

    /// Record (or clear) the failure cause.
    async fn set_error(&self, id: i64, message: Option<&str>) -> Result<(), DataError>;

    /// Persist the torrent manager's download identifier.
    async fn set_torrent_download_id(&self, id: i64, download_id: &str) -> Result<(), DataError>;

    /// Persist the media processor's job identifier.
    async fn set_encoding_job_id(&self, id: i64, job_id: &str) -> Result<(), DataError>;

    /// Replace the run's metadata record.
    async fn update_metadata(&self, id: i64, metadata: &RunMetadata) -> Result<(), DataError>;
}

#[async_trait]
impl RunRepository for RunStore {
    async fn fetch_required(&self, id: i64) -> Result<PipelineRun, DataError> {
        Self::fetch_required(self, id).await
    }

    async fn list_unfinished(&self) -> Result<Vec<PipelineRun>, DataError> {
        Self::list_unfinished(self).await
    }

    async fn mark_stage_running(&self, id: i64, stage: Stage) -> Result<(), DataError> {
        Self::mark_stage_running(self, id, stage).await
    }

    async fn mark_stage_terminal(
        &self,
        id: i64,
        stage: Stage,
        status: StageStatus,
    ) -> Result<(), DataError> {
        Self::mark_stage_terminal(self, id, stage, status).await
    }

    async fn set_status(&self, id: i64, status: PipelineStatus) -> Result<(), DataError> {
        Self::set_status(self, id, status).await
    }

    async fn set_error(&self, id: i64, message: Option<&str>) -> Result<(), DataError> {
        Self::set_error(self, id, message).await
    }

    async fn set_torrent_download_id(&self, id: i64, download_id: &str) -> Result<(), DataError> {
        Self::set_torrent_download_id(self, id, download_id).await
    }

    async fn set_encoding_job_id(&self, id: i64, job_id: &str) -> Result<(), DataError> {
        Self::set_encoding_job_id(self, id, job_id).await
    }

    async fn update_metadata(&self, id: i64, metadata: &RunMetadata) -> Result<(), DataError> {
        Self::update_metadata(self, id, metadata).await
    }
}

/// Store surface the download worker requires.
#[async_trait]
pub trait DownloadRepository: Send + Sync {
    /// Fetch a download that must exist.
    async fn fetch_required(&self, id: Uuid) -> Result<Download, DataError>;

    /// Apply a state transition under the row lock.
    async fn transition(
        &self,
        id: Uuid,
        to: DownloadState,
        metadata: serde_json::Value,
        error_message: Option<&str>,
    ) -> Result<Download, DataError>;

    /// Full state history, oldest first.
    async fn history(&self, id: Uuid) -> Result<Vec<StateHistoryEvent>, DataError>;

    /// Update the completion fraction.
    async fn set_progress(&self, id: Uuid, progress: f64) -> Result<(), DataError>;

    /// Persist the torrent manager's identifier.
    async fn set_torrent_id(&self, id: Uuid, torrent_id: &str) -> Result<(), DataError>;

    /// Persist the media processor's job identifier.
    async fn set_encoding_job_id(&self, id: Uuid, job_id: &str) -> Result<(), DataError>;
}

#[async_trait]
impl DownloadRepository for DownloadStore {
    async fn fetch_required(&self, id: Uuid) -> Result<Download, DataError> {
        Self::fetch_required(self, id).await
    }

    async fn transition(
        &self,
        id: Uuid,
        to: DownloadState,
        metadata: serde_json::Value,
        error_message: Option<&str>,
    ) -> Result<Download, DataError> {
        Self::transition(self, id, to, metadata, error_message).await
    }

    async fn history(&self, id: Uuid) -> Result<Vec<StateHistoryEvent>, DataError> {
        Self::history(self, id).await
    }

    async fn set_progress(&self, id: Uuid, progress: f64) -> Result<(), DataError> {
        Self::set_progress(self, id, progress).await
    }

    async fn set_torrent_id(&self, id: Uuid, torrent_id: &str) -> Result<(), DataError> {
        Self::set_torrent_id(self, id, torrent_id).await
    }

    async fn set_encoding_job_id(&self, id: Uuid, job_id: &str) -> Result<(), DataError> {
        Self::set_encoding_job_id(self, id, job_id).await
    }
}

/// Queue surface the download worker requires.
#[async_trait]
pub trait AcquisitionQueue: Send + Sync {
    /// Pop the highest-priority entry, if any.
    async fn pop(&self) -> Result<Option<QueueEntry>, DataError>;

    /// Enqueue (or reprioritise) a download.
    async fn add(&self, download_id: Uuid, priority: i32) -> Result<(), DataError>;

    /// Remove a download from the queue.
    async fn remove(&self, download_id: Uuid) -> Result<(), DataError>;
}

#[async_trait]
impl AcquisitionQueue for QueueStore {
    async fn pop(&self) -> Result<Option<QueueEntry>, DataError> {
        Self::pop(self).await
    }

    async fn add(&self, download_id: Uuid, priority: i32) -> Result<(), DataError> {
        Self::add(self, download_id, priority).await
    }

    async fn remove(&self, download_id: Uuid) -> Result<(), DataError> {
        Self::remove(self, download_id).await
    }
}
