//! Manual acquisition requests: the external trigger path alongside RSS.

use acquira_core::{ContentType, RunMetadata, RunTrigger};
use acquira_data::{DataError, NewPipelineRun, Store};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// A user- or operator-submitted acquisition request.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Account scope the acquisition belongs to.
    pub account_id: Uuid,
    /// Title of the content to acquire.
    pub content_title: String,
    /// Kind of content to acquire.
    pub content_type: ContentType,
    /// Magnet URI to hand to the torrent manager.
    pub magnet_url: Option<String>,
    /// `.torrent` file URL to hand to the torrent manager.
    pub torrent_url: Option<String>,
}

/// Create a pipeline run for the request and hand it to the dispatcher.
///
/// If the dispatcher channel is closed the run still exists; the recovery
/// sweep picks it up on the next boot.
///
/// # Errors
///
/// Returns an error if the run row cannot be created.
pub async fn submit_run(
    store: &Store,
    dispatcher: &mpsc::Sender<i64>,
    request: RunRequest,
) -> Result<i64, DataError> {
    let run = store
        .runs()
        .create(NewPipelineRun {
            account_id: request.account_id,
            trigger: RunTrigger::Manual,
            content_title: request.content_title,
            content_type: request.content_type,
            metadata: RunMetadata {
                magnet_url: request.magnet_url,
                torrent_url: request.torrent_url,
                ..RunMetadata::default()
            },
        })
        .await?;

    info!(run_id = run.id, title = %run.content_title, "manual acquisition submitted");
    if dispatcher.send(run.id).await.is_err() {
        warn!(run_id = run.id, "dispatcher channel closed; run awaits recovery sweep");
    }
    Ok(run.id)
}
