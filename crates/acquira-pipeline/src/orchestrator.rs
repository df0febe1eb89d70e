//! Seven-stage pipeline orchestrator.
//!
//! Stages execute strictly sequentially. VPN verification and the torrent
//! stages are mandatory: any failure settles the run. The enrichment,
//! subtitle, encoding, and publishing stages degrade gracefully: an
//! unreachable sibling marks the stage `skipped` and the pipeline continues,
//! while a reachable-but-errored sibling fails it and stops.

use std::sync::Arc;
use std::time::Duration;

use acquira_clients::{EncodeRequest, PublishRequest, SiblingGateway};
use acquira_config::AppConfig;
use acquira_core::{PipelineStatus, Stage, StageStatus};
use acquira_data::DataError;
use acquira_events::{Event, EventBus};
use acquira_telemetry::Metrics;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::repo::RunRepository;
use crate::time::Sleeper;

/// Tunables the orchestrator reads from configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Interval between poll attempts.
    pub poll_interval: Duration,
    /// Maximum poll attempts for a torrent download.
    pub download_poll_max_attempts: u32,
    /// Maximum poll attempts for an encoding job.
    pub encoding_poll_max_attempts: u32,
    /// Whether a media processor is deployed; unset auto-skips encoding.
    pub encoding_enabled: bool,
    /// Whether a publishing backend is deployed; unset auto-skips publishing.
    pub publishing_enabled: bool,
}

impl OrchestratorConfig {
    /// Derive orchestrator tunables from the application configuration.
    #[must_use]
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            download_poll_max_attempts: config.download_poll_max_attempts,
            encoding_poll_max_attempts: config.encoding_poll_max_attempts,
            encoding_enabled: config.media_url.is_some(),
            publishing_enabled: config.publish_url.is_some(),
        }
    }
}

/// Per-stage control-flow signal: continue to the next stage or settle the
/// run with the given aggregate status.
enum StageOutcome {
    Advance,
    Stop(PipelineStatus),
}

/// Drives a single pipeline run through its stages.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    runs: Arc<dyn RunRepository>,
    siblings: Arc<dyn SiblingGateway>,
    sleeper: Arc<dyn Sleeper>,
    events: EventBus,
    metrics: Metrics,
    config: OrchestratorConfig,
}

impl PipelineOrchestrator {
    /// Construct an orchestrator with shared dependencies.
    #[must_use]
    pub fn new(
        runs: Arc<dyn RunRepository>,
        siblings: Arc<dyn SiblingGateway>,
        sleeper: Arc<dyn Sleeper>,
        events: EventBus,
        metrics: Metrics,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            runs,
            siblings,
            sleeper,
            events,
            metrics,
            config,
        }
    }

    /// Drive the run to a settled aggregate status.
    ///
    /// Stage failures never unwind out of this method; only store errors do.
    /// Executing an already-settled run is a no-op returning its status.
    ///
    /// # Errors
    ///
    /// Returns an error when the store itself fails.
    pub async fn execute(&self, run_id: i64) -> Result<PipelineStatus, DataError> {
        let run = self.runs.fetch_required(run_id).await?;
        if run.status.is_terminal() {
            debug!(run_id, status = run.status.as_str(), "run already settled");
            return Ok(run.status);
        }

        info!(run_id, title = %run.content_title, "executing acquisition pipeline");

        if let StageOutcome::Stop(status) = self.stage_vpn(run_id).await? {
            return Ok(status);
        }
        if let StageOutcome::Stop(status) = self.stage_torrent(run_id).await? {
            return Ok(status);
        }
        if let StageOutcome::Stop(status) = self.stage_metadata(run_id).await? {
            return Ok(status);
        }
        if let StageOutcome::Stop(status) = self.stage_subtitles(run_id).await? {
            return Ok(status);
        }
        if let StageOutcome::Stop(status) = self.stage_encoding(run_id).await? {
            return Ok(status);
        }
        if let StageOutcome::Stop(status) = self.stage_publishing(run_id).await? {
            return Ok(status);
        }

        self.runs.set_status(run_id, PipelineStatus::Completed).await?;
        self.events.publish(Event::RunFinished {
            run_id,
            status: PipelineStatus::Completed,
        });
        self.metrics.inc_run(PipelineStatus::Completed.as_str());
        info!(run_id, "acquisition pipeline completed");
        Ok(PipelineStatus::Completed)
    }

    async fn enter_stage(&self, run_id: i64, stage: Stage) -> Result<(), DataError> {
        self.runs.mark_stage_running(run_id, stage).await?;
        self.events.publish(Event::StageChanged {
            run_id,
            stage,
            status: StageStatus::Running,
        });
        Ok(())
    }

    async fn settle_stage(
        &self,
        run_id: i64,
        stage: Stage,
        status: StageStatus,
    ) -> Result<(), DataError> {
        self.runs.mark_stage_terminal(run_id, stage, status).await?;
        self.metrics.inc_stage(stage.as_str(), status.as_str());
        self.events.publish(Event::StageChanged {
            run_id,
            stage,
            status,
        });
        Ok(())
    }

    async fn fail_run(
        &self,
        run_id: i64,
        stage: Stage,
        message: &str,
    ) -> Result<StageOutcome, DataError> {
        warn!(run_id, stage = stage.as_str(), message, "pipeline stage failed");
        self.settle_stage(run_id, stage, StageStatus::Failed).await?;
        self.runs.set_error(run_id, Some(message)).await?;
        self.runs.set_status(run_id, PipelineStatus::Failed).await?;
        self.events.publish(Event::RunFinished {
            run_id,
            status: PipelineStatus::Failed,
        });
        self.metrics.inc_run(PipelineStatus::Failed.as_str());
        Ok(StageOutcome::Stop(PipelineStatus::Failed))
    }

    /// Stage 1: verify the VPN is active before anything touches a tracker.
    ///
    /// Unreachability is treated as inactivity: downloads never run without
    /// a verified VPN.
    async fn stage_vpn(&self, run_id: i64) -> Result<StageOutcome, DataError> {
        let run = self.runs.fetch_required(run_id).await?;
        if run.vpn.status == StageStatus::Completed {
            return Ok(StageOutcome::Advance);
        }

        self.enter_stage(run_id, Stage::Vpn).await?;
        let active = match self.siblings.vpn_status().await {
            Ok(status) => status.is_active(),
            Err(err) => {
                warn!(run_id, error = %err, "vpn manager unavailable; treating as inactive");
                false
            }
        };

        if active {
            self.settle_stage(run_id, Stage::Vpn, StageStatus::Completed)
                .await?;
            return Ok(StageOutcome::Advance);
        }

        self.settle_stage(run_id, Stage::Vpn, StageStatus::Failed)
            .await?;
        self.runs.set_error(run_id, Some("VPN is not active")).await?;
        self.runs
            .set_status(run_id, PipelineStatus::VpnWaiting)
            .await?;
        self.events.publish(Event::RunFinished {
            run_id,
            status: PipelineStatus::VpnWaiting,
        });
        self.metrics.inc_run(PipelineStatus::VpnWaiting.as_str());
        Ok(StageOutcome::Stop(PipelineStatus::VpnWaiting))
    }

    /// Stages 2 and 3: submit the torrent and poll the transfer to a
    /// terminal status.
    async fn stage_torrent(&self, run_id: i64) -> Result<StageOutcome, DataError> {
        let run = self.runs.fetch_required(run_id).await?;
        if run.torrent.status == StageStatus::Completed {
            return Ok(StageOutcome::Advance);
        }

        // A run resumed while the stage was still `running` re-attaches to
        // the download the torrent manager already knows about.
        let download_id = if run.torrent.status == StageStatus::Running
            && let Some(existing) = run.torrent_download_id.clone()
        {
            self.enter_stage(run_id, Stage::Torrent).await?;
            existing
        } else {
            let Some(source) = run.metadata.source_url().map(ToOwned::to_owned) else {
                return self
                    .fail_run(run_id, Stage::Torrent, "No magnet or torrent URL provided")
                    .await;
            };
            self.enter_stage(run_id, Stage::Torrent).await?;
            match self.siblings.submit_torrent(&source).await {
                Ok(id) => {
                    self.runs.set_torrent_download_id(run_id, &id).await?;
                    id
                }
                Err(err) => {
                    return self
                        .fail_run(
                            run_id,
                            Stage::Torrent,
                            &format!("Torrent submission failed: {err}"),
                        )
                        .await;
                }
            }
        };

        self.poll_torrent(run_id, &download_id).await
    }

    async fn poll_torrent(
        &self,
        run_id: i64,
        download_id: &str,
    ) -> Result<StageOutcome, DataError> {
        for attempt in 1..=self.config.download_poll_max_attempts {
            let run = self.runs.fetch_required(run_id).await?;
            if run.status.is_terminal() {
                info!(
                    run_id,
                    status = run.status.as_str(),
                    "run settled externally; aborting download poll"
                );
                self.settle_stage(run_id, Stage::Torrent, StageStatus::Failed)
                    .await?;
                return Ok(StageOutcome::Stop(run.status));
            }

            match self.siblings.torrent_status(download_id).await {
                Ok(status) if status.is_finished() => {
                    if let Some(path) = status.download_path {
                        let mut metadata = run.metadata.clone();
                        metadata.download_path = Some(path);
                        self.runs.update_metadata(run_id, &metadata).await?;
                    }
                    self.settle_stage(run_id, Stage::Torrent, StageStatus::Completed)
                        .await?;
                    return Ok(StageOutcome::Advance);
                }
                Ok(status) if status.is_failed() => {
                    return self
                        .fail_run(
                            run_id,
                            Stage::Torrent,
                            &format!("Download failed with status '{}'", status.status),
                        )
                        .await;
                }
                Ok(_) => {}
                Err(err) if err.is_unreachable() => {
                    // A momentary outage must not kill an hours-long
                    // download.
                    debug!(run_id, attempt, error = %err, "transient error polling download");
                }
                Err(err) => {
                    return self
                        .fail_run(
                            run_id,
                            Stage::Torrent,
                            &format!("Download status check failed: {err}"),
                        )
                        .await;
                }
            }

            self.sleeper.sleep(self.config.poll_interval).await;
        }

        self.fail_run(
            run_id,
            Stage::Torrent,
            &format!(
                "Download timed out after {} poll attempts",
                self.config.download_poll_max_attempts
            ),
        )
        .await
    }

    /// Stage 4: metadata enrichment, optional with graceful degradation.
    async fn stage_metadata(&self, run_id: i64) -> Result<StageOutcome, DataError> {
        let run = self.runs.fetch_required(run_id).await?;
        if matches!(
            run.metadata_stage.status,
            StageStatus::Completed | StageStatus::Skipped
        ) {
            return Ok(StageOutcome::Advance);
        }

        self.enter_stage(run_id, Stage::Metadata).await?;
        match self
            .siblings
            .enrich_metadata(&run.content_title, run.content_type.as_str())
            .await
        {
            Ok(()) => {
                self.settle_stage(run_id, Stage::Metadata, StageStatus::Completed)
                    .await?;
                Ok(StageOutcome::Advance)
            }
            Err(err) if err.is_unreachable() => {
                warn!(run_id, error = %err, "metadata service unreachable; skipping enrichment");
                self.settle_stage(run_id, Stage::Metadata, StageStatus::Skipped)
                    .await?;
                Ok(StageOutcome::Advance)
            }
            Err(err) => {
                self.fail_run(
                    run_id,
                    Stage::Metadata,
                    &format!("Metadata enrichment failed: {err}"),
                )
                .await
            }
        }
    }

    /// Stage 5: subtitle search, optional with graceful degradation.
    async fn stage_subtitles(&self, run_id: i64) -> Result<StageOutcome, DataError> {
        let run = self.runs.fetch_required(run_id).await?;
        if matches!(
            run.subtitle.status,
            StageStatus::Completed | StageStatus::Skipped
        ) {
            return Ok(StageOutcome::Advance);
        }

        self.enter_stage(run_id, Stage::Subtitle).await?;
        match self.siblings.search_subtitles(&run.content_title).await {
            Ok(()) => {
                self.settle_stage(run_id, Stage::Subtitle, StageStatus::Completed)
                    .await?;
                Ok(StageOutcome::Advance)
            }
            Err(err) if err.is_unreachable() => {
                warn!(run_id, error = %err, "subtitle service unreachable; skipping search");
                self.settle_stage(run_id, Stage::Subtitle, StageStatus::Skipped)
                    .await?;
                Ok(StageOutcome::Advance)
            }
            Err(err) => {
                self.fail_run(
                    run_id,
                    Stage::Subtitle,
                    &format!("Subtitle search failed: {err}"),
                )
                .await
            }
        }
    }

    /// Stage 6: encoding submission and polling; auto-skips when no media
    /// processor is deployed.
    async fn stage_encoding(&self, run_id: i64) -> Result<StageOutcome, DataError> {
        let run = self.runs.fetch_required(run_id).await?;
        if matches!(
            run.encoding.status,
            StageStatus::Completed | StageStatus::Skipped
        ) {
            return Ok(StageOutcome::Advance);
        }

        if !self.config.encoding_enabled {
            debug!(run_id, "media processor not configured; skipping encoding");
            self.settle_stage(run_id, Stage::Encoding, StageStatus::Skipped)
                .await?;
            return Ok(StageOutcome::Advance);
        }

        let job_id = if run.encoding.status == StageStatus::Running
            && let Some(existing) = run.encoding_job_id.clone()
        {
            self.enter_stage(run_id, Stage::Encoding).await?;
            existing
        } else {
            self.enter_stage(run_id, Stage::Encoding).await?;
            let input_url = run
                .metadata
                .download_path
                .clone()
                .or_else(|| run.metadata.source_url().map(ToOwned::to_owned))
                .unwrap_or_else(|| run.content_title.clone());
            let request =
                EncodeRequest::for_file(input_url, run.metadata.encoding_profile_id.clone());
            match self.siblings.submit_encode_job(&request).await {
                Ok(id) => {
                    self.runs.set_encoding_job_id(run_id, &id).await?;
                    id
                }
                Err(err) if err.is_unreachable() => {
                    warn!(run_id, error = %err, "media processor unreachable; skipping encoding");
                    self.settle_stage(run_id, Stage::Encoding, StageStatus::Skipped)
                        .await?;
                    return Ok(StageOutcome::Advance);
                }
                Err(err) => {
                    return self
                        .fail_run(
                            run_id,
                            Stage::Encoding,
                            &format!("Encoding submission failed: {err}"),
                        )
                        .await;
                }
            }
        };

        self.poll_encoding(run_id, &job_id).await
    }

    async fn poll_encoding(&self, run_id: i64, job_id: &str) -> Result<StageOutcome, DataError> {
        for attempt in 1..=self.config.encoding_poll_max_attempts {
            let run = self.runs.fetch_required(run_id).await?;
            if run.status.is_terminal() {
                info!(
                    run_id,
                    status = run.status.as_str(),
                    "run settled externally; aborting encoding poll"
                );
                self.settle_stage(run_id, Stage::Encoding, StageStatus::Failed)
                    .await?;
                return Ok(StageOutcome::Stop(run.status));
            }

            match self.siblings.encode_job_status(job_id).await {
                Ok(job) if job.is_finished() => {
                    self.settle_stage(run_id, Stage::Encoding, StageStatus::Completed)
                        .await?;
                    return Ok(StageOutcome::Advance);
                }
                Ok(job) if job.is_failed() => {
                    let detail = job.error.unwrap_or_else(|| job.status.clone());
                    return self
                        .fail_run(run_id, Stage::Encoding, &format!("Encoding failed: {detail}"))
                        .await;
                }
                Ok(_) => {}
                Err(err) if err.is_unreachable() => {
                    debug!(run_id, attempt, error = %err, "transient error polling encoding job");
                }
                Err(err) => {
                    return self
                        .fail_run(
                            run_id,
                            Stage::Encoding,
                            &format!("Encoding status check failed: {err}"),
                        )
                        .await;
                }
            }

            self.sleeper.sleep(self.config.poll_interval).await;
        }

        self.fail_run(
            run_id,
            Stage::Encoding,
            &format!(
                "Encoding timed out after {} poll attempts",
                self.config.encoding_poll_max_attempts
            ),
        )
        .await
    }

    /// Stage 7: publish to the library backend; auto-skips when no backend
    /// is deployed. Encoding outputs are fetched best-effort and missing
    /// fields publish as nulls.
    async fn stage_publishing(&self, run_id: i64) -> Result<StageOutcome, DataError> {
        let run = self.runs.fetch_required(run_id).await?;
        if matches!(
            run.publishing.status,
            StageStatus::Completed | StageStatus::Skipped
        ) {
            return Ok(StageOutcome::Advance);
        }

        if !self.config.publishing_enabled {
            debug!(run_id, "publishing backend not configured; skipping publish");
            self.settle_stage(run_id, Stage::Publishing, StageStatus::Skipped)
                .await?;
            return Ok(StageOutcome::Advance);
        }

        self.enter_stage(run_id, Stage::Publishing).await?;

        let outputs = if let Some(job_id) = run.encoding_job_id.as_deref() {
            match self.siblings.encode_job_status(job_id).await {
                Ok(job) => job.outputs,
                Err(err) => {
                    debug!(run_id, error = %err, "encoding outputs unavailable; publishing nulls");
                    None
                }
            }
        } else {
            None
        };
        let outputs = outputs.unwrap_or_default();

        let request = PublishRequest {
            tmdb_id: run.metadata.tmdb_id,
            title: run.content_title.clone(),
            content_type: run.content_type.as_str().to_string(),
            hls_manifest_url: outputs.hls_manifest_url,
            dash_manifest_url: outputs.dash_manifest_url,
            subtitle_tracks: outputs.subtitle_tracks,
            metadata: Value::Object(run.metadata.extra.clone()),
        };

        match self.siblings.publish(&request).await {
            Ok(()) => {
                self.settle_stage(run_id, Stage::Publishing, StageStatus::Completed)
                    .await?;
                Ok(StageOutcome::Advance)
            }
            Err(err) if err.is_unreachable() => {
                warn!(run_id, error = %err, "publishing backend unreachable; skipping publish");
                self.settle_stage(run_id, Stage::Publishing, StageStatus::Skipped)
                    .await?;
                Ok(StageOutcome::Advance)
            }
            Err(err) => {
                self.fail_run(run_id, Stage::Publishing, &format!("Publishing failed: {err}"))
                    .await
            }
        }
    }
}
