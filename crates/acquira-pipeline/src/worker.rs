//! Download worker: pops ready entries from the acquisition queue and drives
//! each download through the state machine to a terminal state.
//!
//! The worker owns the user-initiated path. Stage policy mirrors the
//! orchestrator's: unreachable optional siblings are tolerated, a
//! reachable-but-errored sibling fails the download.

use std::sync::Arc;
use std::time::Duration;

use acquira_clients::{EncodeRequest, PublishRequest, SiblingGateway};
use acquira_core::{Download, DownloadState, download::resume_state};
use acquira_data::DataError;
use acquira_events::{Event, EventBus};
use acquira_telemetry::Metrics;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::orchestrator::OrchestratorConfig;
use crate::repo::{AcquisitionQueue, DownloadRepository};
use crate::time::Sleeper;

/// Result of polling a long-running sibling job for a download.
enum Poll {
    Finished,
    Failed(String),
    Interrupted,
}

/// Drives queued downloads through the state machine.
#[derive(Clone)]
pub struct DownloadWorker {
    downloads: Arc<dyn DownloadRepository>,
    queue: Arc<dyn AcquisitionQueue>,
    siblings: Arc<dyn SiblingGateway>,
    sleeper: Arc<dyn Sleeper>,
    events: EventBus,
    metrics: Metrics,
    config: OrchestratorConfig,
}

impl DownloadWorker {
    /// Construct a worker with shared dependencies.
    #[must_use]
    pub fn new(
        downloads: Arc<dyn DownloadRepository>,
        queue: Arc<dyn AcquisitionQueue>,
        siblings: Arc<dyn SiblingGateway>,
        sleeper: Arc<dyn Sleeper>,
        events: EventBus,
        metrics: Metrics,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            downloads,
            queue,
            siblings,
            sleeper,
            events,
            metrics,
            config,
        }
    }

    /// Pop and process entries until the queue drains; returns the number
    /// processed.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn drain(&self) -> Result<usize, DataError> {
        let mut processed = 0;
        while let Some(entry) = self.queue.pop().await? {
            self.process(entry.download_id).await?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Worker loop: drain the queue, then idle before checking again.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn run(&self, idle_interval: Duration) -> Result<(), DataError> {
        loop {
            let processed = self.drain().await?;
            if processed > 0 {
                debug!(processed, "download worker drained queue");
            }
            self.sleeper.sleep(idle_interval).await;
        }
    }

    /// Drive one download from its current state to a terminal or parked
    /// state.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn process(&self, download_id: Uuid) -> Result<(), DataError> {
        loop {
            let download = self.downloads.fetch_required(download_id).await?;
            match download.state {
                DownloadState::Created => {
                    self.apply(download_id, DownloadState::VpnConnecting, json!({}), None)
                        .await?;
                }
                DownloadState::VpnConnecting => {
                    if self.vpn_active().await {
                        self.apply(download_id, DownloadState::Searching, json!({}), None)
                            .await?;
                    } else {
                        self.apply(
                            download_id,
                            DownloadState::Failed,
                            json!({}),
                            Some("VPN is not active"),
                        )
                        .await?;
                        return Ok(());
                    }
                }
                DownloadState::Searching => {
                    if !self.search(&download).await? {
                        return Ok(());
                    }
                }
                DownloadState::Downloading => {
                    match self.poll_transfer(&download).await? {
                        Poll::Finished => {
                            self.apply(download_id, DownloadState::Encoding, json!({}), None)
                                .await?;
                        }
                        Poll::Failed(message) => {
                            self.apply(
                                download_id,
                                DownloadState::Failed,
                                json!({}),
                                Some(&message),
                            )
                            .await?;
                            return Ok(());
                        }
                        Poll::Interrupted => return Ok(()),
                    }
                }
                DownloadState::Encoding => {
                    if !self.encode(&download).await? {
                        return Ok(());
                    }
                }
                DownloadState::Subtitles => {
                    if !self.subtitles(&download).await? {
                        return Ok(());
                    }
                }
                DownloadState::Uploading => {
                    if !self.upload(&download).await? {
                        return Ok(());
                    }
                }
                DownloadState::Finalizing => {
                    self.queue.remove(download_id).await?;
                    self.downloads.set_progress(download_id, 1.0).await?;
                    self.apply(download_id, DownloadState::Completed, json!({}), None)
                        .await?;
                    info!(download_id = %download_id, "download completed");
                    return Ok(());
                }
                DownloadState::Completed | DownloadState::Cancelled => {
                    self.queue.remove(download_id).await?;
                    return Ok(());
                }
                DownloadState::Failed | DownloadState::Paused => {
                    // Failed rows wait for an explicit retry; paused rows
                    // wait for resume.
                    return Ok(());
                }
            }
        }
    }

    /// Pause a download mid-flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is illegal or the store fails.
    pub async fn pause(&self, download_id: Uuid) -> Result<Download, DataError> {
        self.apply(download_id, DownloadState::Paused, json!({}), None)
            .await
    }

    /// Resume a paused download to the state it was paused from, defaulting
    /// to `downloading`, and re-enqueue it.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is illegal or the store fails.
    pub async fn resume(&self, download_id: Uuid, priority: i32) -> Result<Download, DataError> {
        let history = self.downloads.history(download_id).await?;
        let target = resume_state(&history);
        let download = self
            .apply(download_id, target, json!({"resumed": true}), None)
            .await?;
        self.queue.add(download_id, priority).await?;
        Ok(download)
    }

    /// Cancel a download and drop its queue entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is illegal or the store fails.
    pub async fn cancel(&self, download_id: Uuid) -> Result<Download, DataError> {
        let download = self
            .apply(download_id, DownloadState::Cancelled, json!({}), None)
            .await?;
        self.queue.remove(download_id).await?;
        Ok(download)
    }

    /// Retry a failed download: back to `created` (incrementing the retry
    /// counter in the store) and re-enqueue.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is illegal or the store fails.
    pub async fn retry(&self, download_id: Uuid, priority: i32) -> Result<Download, DataError> {
        let download = self
            .apply(download_id, DownloadState::Created, json!({"retry": true}), None)
            .await?;
        self.queue.add(download_id, priority).await?;
        Ok(download)
    }

    async fn apply(
        &self,
        download_id: Uuid,
        to: DownloadState,
        metadata: serde_json::Value,
        error_message: Option<&str>,
    ) -> Result<Download, DataError> {
        let before = self.downloads.fetch_required(download_id).await?;
        let updated = self
            .downloads
            .transition(download_id, to, metadata, error_message)
            .await?;
        self.events.publish(Event::DownloadStateChanged {
            download_id,
            from: Some(before.state),
            to,
        });
        self.metrics.inc_transition(to.as_str());
        Ok(updated)
    }

    async fn vpn_active(&self) -> bool {
        match self.siblings.vpn_status().await {
            Ok(status) => status.is_active(),
            Err(err) => {
                warn!(error = %err, "vpn manager unavailable; treating as inactive");
                false
            }
        }
    }

    /// Submit the torrent; `true` means the loop should continue.
    async fn search(&self, download: &Download) -> Result<bool, DataError> {
        let Some(magnet) = download.magnet_uri.clone() else {
            self.apply(
                download.id,
                DownloadState::Failed,
                json!({}),
                Some("No magnet URI on download"),
            )
            .await?;
            return Ok(false);
        };

        match self.siblings.submit_torrent(&magnet).await {
            Ok(torrent_id) => {
                self.downloads.set_torrent_id(download.id, &torrent_id).await?;
                self.apply(
                    download.id,
                    DownloadState::Downloading,
                    json!({"torrent_id": torrent_id}),
                    None,
                )
                .await?;
                Ok(true)
            }
            Err(err) => {
                self.apply(
                    download.id,
                    DownloadState::Failed,
                    json!({}),
                    Some(&format!("Torrent submission failed: {err}")),
                )
                .await?;
                Ok(false)
            }
        }
    }

    async fn poll_transfer(&self, download: &Download) -> Result<Poll, DataError> {
        let current = self.downloads.fetch_required(download.id).await?;
        let Some(torrent_id) = current.torrent_id.clone() else {
            return Ok(Poll::Failed("No torrent id recorded for download".to_string()));
        };

        for attempt in 1..=self.config.download_poll_max_attempts {
            let current = self.downloads.fetch_required(download.id).await?;
            if matches!(
                current.state,
                DownloadState::Paused | DownloadState::Cancelled
            ) {
                info!(download_id = %download.id, "download interrupted; aborting poll");
                return Ok(Poll::Interrupted);
            }

            match self.siblings.torrent_status(&torrent_id).await {
                Ok(status) if status.is_finished() => return Ok(Poll::Finished),
                Ok(status) if status.is_failed() => {
                    return Ok(Poll::Failed(format!(
                        "Download failed with status '{}'",
                        status.status
                    )));
                }
                Ok(status) => {
                    if let Some(progress) = status.progress {
                        self.downloads.set_progress(download.id, progress).await?;
                    }
                }
                Err(err) if err.is_unreachable() => {
                    debug!(download_id = %download.id, attempt, error = %err, "transient error polling transfer");
                }
                Err(err) => {
                    return Ok(Poll::Failed(format!("Download status check failed: {err}")));
                }
            }

            self.sleeper.sleep(self.config.poll_interval).await;
        }

        Ok(Poll::Failed(format!(
            "Download timed out after {} poll attempts",
            self.config.download_poll_max_attempts
        )))
    }

    /// Run the encoding leg; `true` means the loop should continue.
    async fn encode(&self, download: &Download) -> Result<bool, DataError> {
        if !self.config.encoding_enabled {
            self.apply(
                download.id,
                DownloadState::Subtitles,
                json!({"encoding": "skipped"}),
                None,
            )
            .await?;
            return Ok(true);
        }

        let input_url = download
            .magnet_uri
            .clone()
            .unwrap_or_else(|| download.title.clone());
        let request = EncodeRequest::for_file(input_url, download.quality_profile.clone());
        let job_id = match self.siblings.submit_encode_job(&request).await {
            Ok(job_id) => {
                self.downloads
                    .set_encoding_job_id(download.id, &job_id)
                    .await?;
                job_id
            }
            Err(err) if err.is_unreachable() => {
                warn!(download_id = %download.id, error = %err, "media processor unreachable; skipping encoding");
                self.apply(
                    download.id,
                    DownloadState::Subtitles,
                    json!({"encoding": "skipped"}),
                    None,
                )
                .await?;
                return Ok(true);
            }
            Err(err) => {
                self.apply(
                    download.id,
                    DownloadState::Failed,
                    json!({}),
                    Some(&format!("Encoding submission failed: {err}")),
                )
                .await?;
                return Ok(false);
            }
        };

        match self.poll_encode(download, &job_id).await? {
            Poll::Finished => {
                self.apply(download.id, DownloadState::Subtitles, json!({}), None)
                    .await?;
                Ok(true)
            }
            Poll::Failed(message) => {
                self.apply(
                    download.id,
                    DownloadState::Failed,
                    json!({}),
                    Some(&message),
                )
                .await?;
                Ok(false)
            }
            Poll::Interrupted => Ok(false),
        }
    }

    async fn poll_encode(&self, download: &Download, job_id: &str) -> Result<Poll, DataError> {
        for attempt in 1..=self.config.encoding_poll_max_attempts {
            let current = self.downloads.fetch_required(download.id).await?;
            if matches!(
                current.state,
                DownloadState::Paused | DownloadState::Cancelled
            ) {
                return Ok(Poll::Interrupted);
            }

            match self.siblings.encode_job_status(job_id).await {
                Ok(job) if job.is_finished() => return Ok(Poll::Finished),
                Ok(job) if job.is_failed() => {
                    let detail = job.error.unwrap_or_else(|| job.status.clone());
                    return Ok(Poll::Failed(format!("Encoding failed: {detail}")));
                }
                Ok(_) => {}
                Err(err) if err.is_unreachable() => {
                    debug!(download_id = %download.id, attempt, error = %err, "transient error polling encoding");
                }
                Err(err) => {
                    return Ok(Poll::Failed(format!("Encoding status check failed: {err}")));
                }
            }

            self.sleeper.sleep(self.config.poll_interval).await;
        }

        Ok(Poll::Failed(format!(
            "Encoding timed out after {} poll attempts",
            self.config.encoding_poll_max_attempts
        )))
    }

    /// Publish to the library backend; `true` means the loop should
    /// continue. Encoding outputs are fetched best-effort and missing
    /// fields publish as nulls.
    async fn upload(&self, download: &Download) -> Result<bool, DataError> {
        if !self.config.publishing_enabled {
            self.apply(
                download.id,
                DownloadState::Finalizing,
                json!({"publishing": "skipped"}),
                None,
            )
            .await?;
            return Ok(true);
        }

        let outputs = if let Some(job_id) = download.encoding_job_id.as_deref() {
            match self.siblings.encode_job_status(job_id).await {
                Ok(job) => job.outputs,
                Err(err) => {
                    debug!(download_id = %download.id, error = %err, "encoding outputs unavailable; publishing nulls");
                    None
                }
            }
        } else {
            None
        };
        let outputs = outputs.unwrap_or_default();

        let request = PublishRequest {
            tmdb_id: download.tmdb_id,
            title: download.title.clone(),
            content_type: download.content_type.as_str().to_string(),
            hls_manifest_url: outputs.hls_manifest_url,
            dash_manifest_url: outputs.dash_manifest_url,
            subtitle_tracks: outputs.subtitle_tracks,
            metadata: json!({}),
        };

        match self.siblings.publish(&request).await {
            Ok(()) => {
                self.apply(download.id, DownloadState::Finalizing, json!({}), None)
                    .await?;
                Ok(true)
            }
            Err(err) if err.is_unreachable() => {
                warn!(download_id = %download.id, error = %err, "publishing backend unreachable; continuing unpublished");
                self.apply(
                    download.id,
                    DownloadState::Finalizing,
                    json!({"publishing": "skipped"}),
                    None,
                )
                .await?;
                Ok(true)
            }
            Err(err) => {
                self.apply(
                    download.id,
                    DownloadState::Failed,
                    json!({}),
                    Some(&format!("Publishing failed: {err}")),
                )
                .await?;
                Ok(false)
            }
        }
    }

    /// Run the subtitle leg; `true` means the loop should continue.
    async fn subtitles(&self, download: &Download) -> Result<bool, DataError> {
        match self.siblings.search_subtitles(&download.title).await {
            Ok(()) => {
                self.apply(download.id, DownloadState::Uploading, json!({}), None)
                    .await?;
                Ok(true)
            }
            Err(err) if err.is_unreachable() => {
                warn!(download_id = %download.id, error = %err, "subtitle service unreachable; continuing without subtitles");
                self.apply(
                    download.id,
                    DownloadState::Uploading,
                    json!({"subtitles": "skipped"}),
                    None,
                )
                .await?;
                Ok(true)
            }
            Err(err) => {
                self.apply(
                    download.id,
                    DownloadState::Failed,
                    json!({}),
                    Some(&format!("Subtitle search failed: {err}")),
                )
                .await?;
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        InMemoryDownloads, InMemoryQueue, StubGateway, http_error, sample_download, transfer,
        unreachable,
    };
    use crate::time::NoopSleeper;
    use acquira_clients::TransferStatus;
    use acquira_core::download::replay_history;

    fn test_config() -> OrchestratorConfig {
        OrchestratorConfig {
            poll_interval: Duration::from_secs(30),
            download_poll_max_attempts: 720,
            encoding_poll_max_attempts: 2_880,
            encoding_enabled: true,
            publishing_enabled: true,
        }
    }

    fn worker(
        downloads: Arc<InMemoryDownloads>,
        queue: Arc<InMemoryQueue>,
        gateway: Arc<StubGateway>,
        config: OrchestratorConfig,
    ) -> DownloadWorker {
        DownloadWorker::new(
            downloads,
            queue,
            gateway,
            Arc::new(NoopSleeper),
            EventBus::new(),
            Metrics::new().expect("metrics registry"),
            config,
        )
    }

    #[tokio::test]
    async fn queued_download_walks_to_completed() {
        let downloads = InMemoryDownloads::new();
        let queue = InMemoryQueue::new();
        let gateway = StubGateway::new();
        StubGateway::plan(
            &gateway.transfers,
            vec![
                Ok(TransferStatus {
                    status: "downloading".to_string(),
                    progress: Some(0.5),
                    download_path: None,
                }),
                Ok(transfer("completed")),
            ],
        );

        let download = sample_download();
        let id = download.id;
        downloads.insert(download);
        queue.add(id, 10).await.expect("queue add");

        let worker = worker(
            Arc::clone(&downloads),
            Arc::clone(&queue),
            Arc::clone(&gateway),
            test_config(),
        );
        let processed = worker.drain().await.expect("drain should not error");
        assert_eq!(processed, 1);

        let row = downloads.get(id);
        assert_eq!(row.state, DownloadState::Completed);
        assert!((row.progress - 1.0).abs() < f64::EPSILON);
        assert_eq!(row.torrent_id.as_deref(), Some("t1"));
        assert_eq!(row.encoding_job_id.as_deref(), Some("e1"));
        assert_eq!(queue.len(), 0);
        assert!(gateway.calls().contains(&"publish".to_string()));

        let history = downloads.history(id).await.expect("history");
        assert_eq!(replay_history(&history), Some(DownloadState::Completed));
        for pair in history.windows(2) {
            assert_eq!(pair[1].from_state, Some(pair[0].to_state));
        }
    }

    #[tokio::test]
    async fn inactive_vpn_fails_the_download() {
        let downloads = InMemoryDownloads::new();
        let queue = InMemoryQueue::new();
        let gateway = StubGateway::new();
        StubGateway::plan(&gateway.vpn, vec![Err(unreachable("vpn", "status"))]);

        let download = sample_download();
        let id = download.id;
        downloads.insert(download);
        queue.add(id, 10).await.expect("queue add");

        let worker = worker(
            Arc::clone(&downloads),
            queue,
            gateway,
            test_config(),
        );
        worker.drain().await.expect("drain should not error");

        let row = downloads.get(id);
        assert_eq!(row.state, DownloadState::Failed);
        assert_eq!(row.error_message.as_deref(), Some("VPN is not active"));
    }

    #[tokio::test]
    async fn missing_magnet_uri_fails_during_search() {
        let downloads = InMemoryDownloads::new();
        let queue = InMemoryQueue::new();
        let gateway = StubGateway::new();

        let mut download = sample_download();
        download.magnet_uri = None;
        let id = download.id;
        downloads.insert(download);
        queue.add(id, 10).await.expect("queue add");

        let worker = worker(Arc::clone(&downloads), queue, gateway, test_config());
        worker.drain().await.expect("drain should not error");

        let row = downloads.get(id);
        assert_eq!(row.state, DownloadState::Failed);
        assert_eq!(row.error_message.as_deref(), Some("No magnet URI on download"));
    }

    #[tokio::test]
    async fn retry_increments_counter_and_reenqueues() {
        let downloads = InMemoryDownloads::new();
        let queue = InMemoryQueue::new();
        let gateway = StubGateway::new();
        StubGateway::plan(
            &gateway.submissions,
            vec![Err(http_error("torrent", "submit", 503))],
        );

        let download = sample_download();
        let id = download.id;
        downloads.insert(download);
        queue.add(id, 10).await.expect("queue add");

        let worker = worker(
            Arc::clone(&downloads),
            Arc::clone(&queue),
            gateway,
            test_config(),
        );
        worker.drain().await.expect("drain should not error");
        assert_eq!(downloads.get(id).state, DownloadState::Failed);

        let retried = worker.retry(id, 15).await.expect("retry should transition");
        assert_eq!(retried.state, DownloadState::Created);
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.error_message, None);
        assert_eq!(queue.len(), 1);

        // The default gateway script now succeeds end to end.
        worker.drain().await.expect("drain should not error");
        assert_eq!(downloads.get(id).state, DownloadState::Completed);
        assert_eq!(downloads.get(id).retry_count, 1);
    }

    #[tokio::test]
    async fn pause_and_resume_return_to_the_paused_state() {
        let downloads = InMemoryDownloads::new();
        let queue = InMemoryQueue::new();
        let gateway = StubGateway::new();

        let download = sample_download();
        let id = download.id;
        downloads.insert(download);

        // Walk the row into `downloading` by hand, then pause it.
        downloads
            .transition(id, DownloadState::VpnConnecting, serde_json::json!({}), None)
            .await
            .expect("transition");
        downloads
            .transition(id, DownloadState::Searching, serde_json::json!({}), None)
            .await
            .expect("transition");
        downloads
            .transition(id, DownloadState::Downloading, serde_json::json!({}), None)
            .await
            .expect("transition");

        let worker = worker(
            Arc::clone(&downloads),
            Arc::clone(&queue),
            gateway,
            test_config(),
        );
        let paused = worker.pause(id).await.expect("pause should transition");
        assert_eq!(paused.state, DownloadState::Paused);

        let resumed = worker.resume(id, 10).await.expect("resume should transition");
        assert_eq!(resumed.state, DownloadState::Downloading);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn cancel_removes_the_queue_entry() {
        let downloads = InMemoryDownloads::new();
        let queue = InMemoryQueue::new();
        let gateway = StubGateway::new();

        let download = sample_download();
        let id = download.id;
        downloads.insert(download);
        queue.add(id, 10).await.expect("queue add");

        let worker = worker(Arc::clone(&downloads), Arc::clone(&queue), gateway, test_config());
        let cancelled = worker.cancel(id).await.expect("cancel should transition");
        assert_eq!(cancelled.state, DownloadState::Cancelled);
        assert_eq!(queue.len(), 0);

        let error = worker.pause(id).await.expect_err("cancelled is terminal");
        assert!(error.is_invalid_transition());
    }

    #[tokio::test]
    async fn unreachable_publish_backend_does_not_block_completion() {
        let downloads = InMemoryDownloads::new();
        let queue = InMemoryQueue::new();
        let gateway = StubGateway::new();
        StubGateway::plan(
            &gateway.publishes,
            vec![Err(unreachable("publish", "publish"))],
        );

        let download = sample_download();
        let id = download.id;
        downloads.insert(download);
        queue.add(id, 10).await.expect("queue add");

        let worker = worker(Arc::clone(&downloads), queue, gateway, test_config());
        worker.drain().await.expect("drain should not error");

        let row = downloads.get(id);
        assert_eq!(row.state, DownloadState::Completed);
        assert!(row.error_message.is_none());
    }

    #[tokio::test]
    async fn publish_http_error_fails_the_download() {
        let downloads = InMemoryDownloads::new();
        let queue = InMemoryQueue::new();
        let gateway = StubGateway::new();
        StubGateway::plan(
            &gateway.publishes,
            vec![Err(http_error("publish", "publish", 500))],
        );

        let download = sample_download();
        let id = download.id;
        downloads.insert(download);
        queue.add(id, 10).await.expect("queue add");

        let worker = worker(Arc::clone(&downloads), queue, gateway, test_config());
        worker.drain().await.expect("drain should not error");

        let row = downloads.get(id);
        assert_eq!(row.state, DownloadState::Failed);
        assert!(
            row.error_message
                .as_deref()
                .is_some_and(|message| message.contains("Publishing failed")),
            "error was {:?}",
            row.error_message
        );
    }

    #[tokio::test]
    async fn disabled_publishing_skips_the_backend_call() {
        let downloads = InMemoryDownloads::new();
        let queue = InMemoryQueue::new();
        let gateway = StubGateway::new();
        let mut config = test_config();
        config.publishing_enabled = false;

        let download = sample_download();
        let id = download.id;
        downloads.insert(download);
        queue.add(id, 10).await.expect("queue add");

        let worker = worker(Arc::clone(&downloads), queue, Arc::clone(&gateway), config);
        worker.drain().await.expect("drain should not error");

        assert_eq!(downloads.get(id).state, DownloadState::Completed);
        assert!(!gateway.calls().contains(&"publish".to_string()));
    }

    #[tokio::test]
    async fn skipped_encoding_still_walks_the_machine() {
        let downloads = InMemoryDownloads::new();
        let queue = InMemoryQueue::new();
        let gateway = StubGateway::new();
        let mut config = test_config();
        config.encoding_enabled = false;

        let download = sample_download();
        let id = download.id;
        downloads.insert(download);
        queue.add(id, 10).await.expect("queue add");

        let worker = worker(Arc::clone(&downloads), queue, Arc::clone(&gateway), config);
        worker.drain().await.expect("drain should not error");

        let row = downloads.get(id);
        assert_eq!(row.state, DownloadState::Completed);
        assert!(row.encoding_job_id.is_none());
        assert!(!gateway.calls().contains(&"submit_encode_job".to_string()));

        let history = downloads.history(id).await.expect("history");
        assert!(
            history
                .iter()
                .any(|event| event.to_state == DownloadState::Encoding),
            "the machine has no bypass edge around encoding"
        );
    }
}
