//! In-memory doubles for the repository traits and the sibling gateway,
//! shared by the stage-policy unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use acquira_clients::{
    ClientError, ClientResult, EncodeRequest, JobStatus, PublishRequest, SiblingGateway,
    TransferStatus, VpnStatus,
};
use acquira_core::{
    ContentType, Download, DownloadState, PipelineRun, PipelineStatus, QueueEntry, RunMetadata,
    RunTrigger, Stage, StageProgress, StageStatus, StateHistoryEvent,
};
use acquira_data::DataError;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::repo::{AcquisitionQueue, DownloadRepository, RunRepository};

pub(crate) fn unreachable(service: &'static str, operation: &'static str) -> ClientError {
    ClientError::Unreachable {
        service,
        operation,
        source: Box::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        )),
    }
}

pub(crate) fn http_error(service: &'static str, operation: &'static str, status: u16) -> ClientError {
    ClientError::HttpStatus {
        service,
        operation,
        status,
    }
}

pub(crate) fn transfer(status: &str) -> TransferStatus {
    TransferStatus {
        status: status.to_string(),
        progress: None,
        download_path: None,
    }
}

pub(crate) fn encode_job(status: &str) -> JobStatus {
    JobStatus {
        status: status.to_string(),
        outputs: None,
        error: None,
    }
}

pub(crate) fn blank_run(id: i64) -> PipelineRun {
    let now = Utc::now();
    PipelineRun {
        id,
        account_id: Uuid::new_v4(),
        trigger: RunTrigger::Manual,
        content_title: "Dune".to_string(),
        content_type: ContentType::Movie,
        status: PipelineStatus::Pending,
        vpn: StageProgress::default(),
        torrent: StageProgress::default(),
        metadata_stage: StageProgress::default(),
        subtitle: StageProgress::default(),
        encoding: StageProgress::default(),
        publishing: StageProgress::default(),
        metadata: RunMetadata {
            magnet_url: Some("magnet:?xt=urn:btih:abc".to_string()),
            ..RunMetadata::default()
        },
        torrent_download_id: None,
        encoding_job_id: None,
        error_message: None,
        created_at: now,
        updated_at: now,
        completed_at: None,
    }
}

/// In-memory run repository mirroring the store's stage bookkeeping.
#[derive(Default)]
pub(crate) struct InMemoryRuns {
    runs: Mutex<HashMap<i64, PipelineRun>>,
}

impl InMemoryRuns {
    pub(crate) fn with_run(run: PipelineRun) -> Arc<Self> {
        let runs = Self::default();
        runs.runs.lock().expect("runs lock").insert(run.id, run);
        Arc::new(runs)
    }

    pub(crate) fn get(&self, id: i64) -> PipelineRun {
        self.runs
            .lock()
            .expect("runs lock")
            .get(&id)
            .cloned()
            .expect("run should exist")
    }

    fn update<F: FnOnce(&mut PipelineRun)>(&self, id: i64, apply: F) -> Result<(), DataError> {
        let mut runs = self.runs.lock().expect("runs lock");
        let run = runs.get_mut(&id).ok_or(DataError::NotFound { entity: "run" })?;
        apply(run);
        run.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl RunRepository for InMemoryRuns {
    async fn fetch_required(&self, id: i64) -> Result<PipelineRun, DataError> {
        self.runs
            .lock()
            .expect("runs lock")
            .get(&id)
            .cloned()
            .ok_or(DataError::NotFound { entity: "run" })
    }

    async fn list_unfinished(&self) -> Result<Vec<PipelineRun>, DataError> {
        Ok(self
            .runs
            .lock()
            .expect("runs lock")
            .values()
            .filter(|run| !run.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn mark_stage_running(&self, id: i64, stage: Stage) -> Result<(), DataError> {
        self.update(id, |run| {
            let progress = run.stage_mut(stage);
            progress.status = StageStatus::Running;
            if progress.started_at.is_none() {
                progress.started_at = Some(Utc::now());
            }
            run.status = PipelineStatus::for_stage(stage);
        })
    }

    async fn mark_stage_terminal(
        &self,
        id: i64,
        stage: Stage,
        status: StageStatus,
    ) -> Result<(), DataError> {
        self.update(id, |run| {
            let progress = run.stage_mut(stage);
            progress.status = status;
            progress.completed_at = Some(Utc::now());
        })
    }

    async fn set_status(&self, id: i64, status: PipelineStatus) -> Result<(), DataError> {
        self.update(id, |run| {
            run.status = status;
            if status == PipelineStatus::Completed {
                run.completed_at = Some(Utc::now());
            }
        })
    }

    async fn set_error(&self, id: i64, message: Option<&str>) -> Result<(), DataError> {
        let message = message.map(ToOwned::to_owned);
        self.update(id, |run| run.error_message = message)
    }

    async fn set_torrent_download_id(&self, id: i64, download_id: &str) -> Result<(), DataError> {
        let download_id = download_id.to_string();
        self.update(id, |run| run.torrent_download_id = Some(download_id))
    }

    async fn set_encoding_job_id(&self, id: i64, job_id: &str) -> Result<(), DataError> {
        let job_id = job_id.to_string();
        self.update(id, |run| run.encoding_job_id = Some(job_id))
    }

    async fn update_metadata(&self, id: i64, metadata: &RunMetadata) -> Result<(), DataError> {
        let metadata = metadata.clone();
        self.update(id, |run| run.metadata = metadata)
    }
}

type Plan<T> = Mutex<VecDeque<ClientResult<T>>>;

fn next<T>(plan: &Plan<T>, default: impl FnOnce() -> T) -> ClientResult<T> {
    plan.lock()
        .expect("plan lock")
        .pop_front()
        .unwrap_or_else(|| Ok(default()))
}

/// Scripted sibling gateway: each endpoint pops planned responses and falls
/// back to a happy-path default when the script is exhausted.
#[derive(Default)]
pub(crate) struct StubGateway {
    pub(crate) vpn: Plan<VpnStatus>,
    pub(crate) submissions: Plan<String>,
    pub(crate) transfers: Plan<TransferStatus>,
    pub(crate) metadata: Plan<()>,
    pub(crate) subtitles: Plan<()>,
    pub(crate) encode_submissions: Plan<String>,
    pub(crate) encode_jobs: Plan<JobStatus>,
    pub(crate) publishes: Plan<()>,
    pub(crate) calls: Mutex<Vec<String>>,
}

impl StubGateway {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn plan<T>(plan: &Plan<T>, responses: Vec<ClientResult<T>>) {
        plan.lock().expect("plan lock").extend(responses);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().expect("calls lock").push(call.to_string());
    }
}

#[async_trait]
impl SiblingGateway for StubGateway {
    async fn vpn_status(&self) -> ClientResult<VpnStatus> {
        self.record("vpn_status");
        next(&self.vpn, || VpnStatus {
            active: Some(true),
            status: None,
        })
    }

    async fn submit_torrent(&self, _url: &str) -> ClientResult<String> {
        self.record("submit_torrent");
        next(&self.submissions, || "t1".to_string())
    }

    async fn torrent_status(&self, _download_id: &str) -> ClientResult<TransferStatus> {
        self.record("torrent_status");
        next(&self.transfers, || transfer("completed"))
    }

    async fn enrich_metadata(&self, _title: &str, _content_type: &str) -> ClientResult<()> {
        self.record("enrich_metadata");
        next(&self.metadata, || ())
    }

    async fn search_subtitles(&self, _title: &str) -> ClientResult<()> {
        self.record("search_subtitles");
        next(&self.subtitles, || ())
    }

    async fn submit_encode_job(&self, _request: &EncodeRequest) -> ClientResult<String> {
        self.record("submit_encode_job");
        next(&self.encode_submissions, || "e1".to_string())
    }

    async fn encode_job_status(&self, _job_id: &str) -> ClientResult<JobStatus> {
        self.record("encode_job_status");
        next(&self.encode_jobs, || encode_job("completed"))
    }

    async fn publish(&self, _request: &PublishRequest) -> ClientResult<()> {
        self.record("publish");
        next(&self.publishes, || ())
    }
}

/// In-memory download repository mirroring the store's transition rules.
#[derive(Default)]
pub(crate) struct InMemoryDownloads {
    rows: Mutex<HashMap<Uuid, Download>>,
    history: Mutex<Vec<StateHistoryEvent>>,
}

impl InMemoryDownloads {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn insert(&self, download: Download) {
        self.history.lock().expect("history lock").push(StateHistoryEvent {
            download_id: download.id,
            from_state: None,
            to_state: download.state,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
        });
        self.rows
            .lock()
            .expect("rows lock")
            .insert(download.id, download);
    }

    pub(crate) fn get(&self, id: Uuid) -> Download {
        self.rows
            .lock()
            .expect("rows lock")
            .get(&id)
            .cloned()
            .expect("download should exist")
    }
}

pub(crate) fn sample_download() -> Download {
    let now = Utc::now();
    Download {
        id: Uuid::new_v4(),
        account_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        content_type: ContentType::Movie,
        title: "Dune".to_string(),
        state: DownloadState::Created,
        progress: 0.0,
        magnet_uri: Some("magnet:?xt=urn:btih:abc".to_string()),
        torrent_id: None,
        encoding_job_id: None,
        quality_profile: None,
        retry_count: 0,
        error_message: None,
        show_id: None,
        season: None,
        episode: None,
        tmdb_id: None,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl DownloadRepository for InMemoryDownloads {
    async fn fetch_required(&self, id: Uuid) -> Result<Download, DataError> {
        self.rows
            .lock()
            .expect("rows lock")
            .get(&id)
            .cloned()
            .ok_or(DataError::NotFound { entity: "download" })
    }

    async fn transition(
        &self,
        id: Uuid,
        to: DownloadState,
        metadata: serde_json::Value,
        error_message: Option<&str>,
    ) -> Result<Download, DataError> {
        let mut rows = self.rows.lock().expect("rows lock");
        let row = rows
            .get_mut(&id)
            .ok_or(DataError::NotFound { entity: "download" })?;
        let from = row.state;
        from.validate_transition(to)?;

        let is_retry = from == DownloadState::Failed && to == DownloadState::Created;
        if is_retry {
            row.retry_count += 1;
            row.error_message = None;
        } else if to == DownloadState::Failed
            && let Some(message) = error_message
        {
            row.error_message = Some(message.to_string());
        }
        row.state = to;
        row.updated_at = Utc::now();

        self.history.lock().expect("history lock").push(StateHistoryEvent {
            download_id: id,
            from_state: Some(from),
            to_state: to,
            metadata,
            created_at: Utc::now(),
        });

        Ok(row.clone())
    }

    async fn history(&self, id: Uuid) -> Result<Vec<StateHistoryEvent>, DataError> {
        Ok(self
            .history
            .lock()
            .expect("history lock")
            .iter()
            .filter(|event| event.download_id == id)
            .cloned()
            .collect())
    }

    async fn set_progress(&self, id: Uuid, progress: f64) -> Result<(), DataError> {
        let mut rows = self.rows.lock().expect("rows lock");
        let row = rows
            .get_mut(&id)
            .ok_or(DataError::NotFound { entity: "download" })?;
        row.progress = progress.clamp(0.0, 1.0);
        Ok(())
    }

    async fn set_torrent_id(&self, id: Uuid, torrent_id: &str) -> Result<(), DataError> {
        let mut rows = self.rows.lock().expect("rows lock");
        let row = rows
            .get_mut(&id)
            .ok_or(DataError::NotFound { entity: "download" })?;
        row.torrent_id = Some(torrent_id.to_string());
        Ok(())
    }

    async fn set_encoding_job_id(&self, id: Uuid, job_id: &str) -> Result<(), DataError> {
        let mut rows = self.rows.lock().expect("rows lock");
        let row = rows
            .get_mut(&id)
            .ok_or(DataError::NotFound { entity: "download" })?;
        row.encoding_job_id = Some(job_id.to_string());
        Ok(())
    }
}

/// In-memory acquisition queue with the store's pop ordering.
#[derive(Default)]
pub(crate) struct InMemoryQueue {
    entries: Mutex<Vec<QueueEntry>>,
}

impl InMemoryQueue {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().expect("queue lock").len()
    }
}

#[async_trait]
impl AcquisitionQueue for InMemoryQueue {
    async fn pop(&self) -> Result<Option<QueueEntry>, DataError> {
        let mut entries = self.entries.lock().expect("queue lock");
        entries.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(if entries.is_empty() {
            None
        } else {
            Some(entries.remove(0))
        })
    }

    async fn add(&self, download_id: Uuid, priority: i32) -> Result<(), DataError> {
        let mut entries = self.entries.lock().expect("queue lock");
        if let Some(entry) = entries
            .iter_mut()
            .find(|entry| entry.download_id == download_id)
        {
            entry.priority = priority;
        } else {
            entries.push(QueueEntry {
                download_id,
                priority,
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn remove(&self, download_id: Uuid) -> Result<(), DataError> {
        self.entries
            .lock()
            .expect("queue lock")
            .retain(|entry| entry.download_id != download_id);
        Ok(())
    }
}
