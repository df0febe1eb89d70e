//! Retry planner: computes the resume point for a failed or partial run and
//! delegates back to the orchestrator.
//!
//! State is always re-read from the store, never from memory, so a crash
//! mid-pipeline cannot corrupt the resume: each stage checks its persisted
//! status before acting.

use std::sync::Arc;

use acquira_core::{PipelineRun, PipelineStatus, Stage, StageStatus};
use acquira_data::DataError;
use tracing::{debug, info};

use crate::orchestrator::PipelineOrchestrator;
use crate::repo::RunRepository;

/// The first stage a resumed run will re-execute, if any.
///
/// Mandatory stages re-run unless `completed`. Optional stages re-run only
/// when `failed` or not yet entered; `skipped` and `completed` stay settled.
#[must_use]
pub fn resume_stage(run: &PipelineRun) -> Option<Stage> {
    for stage in Stage::ALL {
        let status = run.stage(stage).status;
        let rerun = if stage.is_mandatory() {
            status != StageStatus::Completed
        } else {
            matches!(
                status,
                StageStatus::Pending | StageStatus::Running | StageStatus::Failed
            )
        };
        if rerun {
            return Some(stage);
        }
    }
    None
}

/// Inspects a run's per-stage statuses and re-invokes the orchestrator from
/// the resume point.
#[derive(Clone)]
pub struct RetryPlanner {
    runs: Arc<dyn RunRepository>,
    orchestrator: PipelineOrchestrator,
}

impl RetryPlanner {
    /// Construct a planner sharing the orchestrator's store handle.
    #[must_use]
    pub const fn new(runs: Arc<dyn RunRepository>, orchestrator: PipelineOrchestrator) -> Self {
        Self { runs, orchestrator }
    }

    /// Resume a run from its first non-settled stage.
    ///
    /// Retrying a `completed` run is a no-op; a `cancelled` run stays
    /// cancelled. Otherwise the error message is cleared and the
    /// orchestrator re-executes, skipping stages that already settled.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn retry(&self, run_id: i64) -> Result<PipelineStatus, DataError> {
        let run = self.runs.fetch_required(run_id).await?;
        match run.status {
            PipelineStatus::Completed => {
                debug!(run_id, "retry requested for completed run; nothing to do");
                return Ok(PipelineStatus::Completed);
            }
            PipelineStatus::Cancelled => {
                debug!(run_id, "retry requested for cancelled run; leaving settled");
                return Ok(PipelineStatus::Cancelled);
            }
            _ => {}
        }

        let Some(stage) = resume_stage(&run) else {
            // Every stage settled but the aggregate never advanced (e.g. a
            // crash between the last stage and the final status write).
            self.runs
                .set_status(run_id, PipelineStatus::Completed)
                .await?;
            return Ok(PipelineStatus::Completed);
        };

        info!(run_id, resume_stage = stage.as_str(), "resuming pipeline run");
        self.runs.set_error(run_id, None).await?;
        self.runs.set_status(run_id, PipelineStatus::Pending).await?;
        self.orchestrator.execute(run_id).await
    }

    /// Identifiers of every run that has not settled, for the boot-time
    /// recovery sweep. The caller spawns a [`Self::retry`] per id.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn unsettled_runs(&self) -> Result<Vec<i64>, DataError> {
        let runs = self.runs.list_unfinished().await?;
        Ok(runs.into_iter().map(|run| run.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::OrchestratorConfig;
    use crate::testing::{InMemoryRuns, StubGateway, blank_run};
    use crate::time::NoopSleeper;
    use acquira_events::EventBus;
    use acquira_telemetry::Metrics;
    use std::time::Duration;

    fn planner(runs: Arc<InMemoryRuns>, gateway: Arc<StubGateway>) -> RetryPlanner {
        let orchestrator = PipelineOrchestrator::new(
            Arc::clone(&runs) as Arc<dyn RunRepository>,
            gateway,
            Arc::new(NoopSleeper),
            EventBus::new(),
            Metrics::new().expect("metrics registry"),
            OrchestratorConfig {
                poll_interval: Duration::from_secs(30),
                download_poll_max_attempts: 720,
                encoding_poll_max_attempts: 2_880,
                encoding_enabled: true,
                publishing_enabled: true,
            },
        );
        RetryPlanner::new(runs, orchestrator)
    }

    #[test]
    fn resume_point_prefers_mandatory_stages() {
        let mut run = blank_run(1);
        run.vpn.status = StageStatus::Failed;
        run.metadata_stage.status = StageStatus::Failed;
        assert_eq!(resume_stage(&run), Some(Stage::Vpn));

        run.vpn.status = StageStatus::Completed;
        run.torrent.status = StageStatus::Running;
        assert_eq!(resume_stage(&run), Some(Stage::Torrent));
    }

    #[test]
    fn resume_point_skips_settled_optional_stages() {
        let mut run = blank_run(1);
        run.vpn.status = StageStatus::Completed;
        run.torrent.status = StageStatus::Completed;
        run.metadata_stage.status = StageStatus::Skipped;
        run.subtitle.status = StageStatus::Failed;
        assert_eq!(resume_stage(&run), Some(Stage::Subtitle));

        run.subtitle.status = StageStatus::Completed;
        run.encoding.status = StageStatus::Skipped;
        run.publishing.status = StageStatus::Completed;
        assert_eq!(resume_stage(&run), None);
    }

    #[tokio::test]
    async fn retry_on_completed_run_is_a_no_op() {
        let mut run = blank_run(1);
        run.status = PipelineStatus::Completed;
        for stage in Stage::ALL {
            run.stage_mut(stage).status = StageStatus::Completed;
        }
        let runs = InMemoryRuns::with_run(run);
        let gateway = StubGateway::new();

        let status = planner(runs, Arc::clone(&gateway))
            .retry(1)
            .await
            .expect("retry should not error");
        assert_eq!(status, PipelineStatus::Completed);
        assert!(gateway.calls().is_empty(), "no sibling calls on a no-op");
    }

    #[tokio::test]
    async fn partial_run_resumes_from_failed_optional_stage() {
        let mut run = blank_run(1);
        run.status = PipelineStatus::Failed;
        run.vpn.status = StageStatus::Completed;
        run.torrent.status = StageStatus::Completed;
        run.torrent_download_id = Some("t1".to_string());
        run.metadata_stage.status = StageStatus::Failed;
        run.error_message = Some("Metadata enrichment failed: 500".to_string());

        let runs = InMemoryRuns::with_run(run);
        let gateway = StubGateway::new();

        let status = planner(Arc::clone(&runs), Arc::clone(&gateway))
            .retry(1)
            .await
            .expect("retry should not error");
        assert_eq!(status, PipelineStatus::Completed);

        let run = runs.get(1);
        assert_eq!(run.metadata_stage.status, StageStatus::Completed);
        assert_eq!(run.subtitle.status, StageStatus::Completed);
        assert_eq!(run.encoding.status, StageStatus::Completed);
        assert_eq!(run.publishing.status, StageStatus::Completed);
        assert!(run.error_message.is_none());

        let calls = gateway.calls();
        assert!(!calls.contains(&"vpn_status".to_string()), "vpn already settled");
        assert!(!calls.contains(&"submit_torrent".to_string()));
        assert!(calls.contains(&"enrich_metadata".to_string()));
    }

    #[tokio::test]
    async fn vpn_waiting_run_rechecks_the_vpn() {
        let mut run = blank_run(1);
        run.status = PipelineStatus::VpnWaiting;
        run.vpn.status = StageStatus::Failed;
        run.error_message = Some("VPN is not active".to_string());

        let runs = InMemoryRuns::with_run(run);
        let gateway = StubGateway::new();

        let status = planner(Arc::clone(&runs), Arc::clone(&gateway))
            .retry(1)
            .await
            .expect("retry should not error");
        assert_eq!(status, PipelineStatus::Completed);
        assert!(gateway.calls().contains(&"vpn_status".to_string()));
    }

    #[tokio::test]
    async fn fully_settled_stages_complete_the_aggregate() {
        let mut run = blank_run(1);
        run.status = PipelineStatus::Publishing;
        for stage in Stage::ALL {
            run.stage_mut(stage).status = StageStatus::Completed;
        }
        let runs = InMemoryRuns::with_run(run);
        let gateway = StubGateway::new();

        let status = planner(Arc::clone(&runs), gateway)
            .retry(1)
            .await
            .expect("retry should not error");
        assert_eq!(status, PipelineStatus::Completed);
        assert_eq!(runs.get(1).status, PipelineStatus::Completed);
    }

    #[tokio::test]
    async fn unsettled_runs_lists_resumable_ids() {
        let mut settled = blank_run(1);
        settled.status = PipelineStatus::Completed;
        let runs = InMemoryRuns::with_run(settled);
        let gateway = StubGateway::new();

        let ids = planner(runs, gateway)
            .unsettled_runs()
            .await
            .expect("listing should not error");
        assert!(ids.is_empty());
    }
}
