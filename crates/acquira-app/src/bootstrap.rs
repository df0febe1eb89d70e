//! Service wiring: configuration, telemetry, store, gateway, and the
//! long-lived tasks (dispatcher, download workers, RSS scheduler, recovery
//! sweep).

use std::sync::Arc;

use std::time::Duration;

use acquira_clients::{HttpSiblings, SiblingEndpoints, SiblingGateway};
use acquira_config::{AppConfig, defaults};
use acquira_data::{DataError, Store};
use acquira_events::EventBus;
use acquira_ingest::{FeedChecker, HttpFeedFetcher, RssScheduler, SchedulerConfig};
use acquira_pipeline::{
    DownloadWorker, OrchestratorConfig, PipelineOrchestrator, RetryPlanner, RunRepository, Sleeper,
    TokioSleeper,
};
use acquira_telemetry::{LoggingConfig, Metrics};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};

/// Buffered run ids awaiting an orchestrator task.
const DISPATCH_BUFFER: usize = 256;

/// Load configuration from the environment and run the service until a
/// shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if configuration, telemetry, the store, or the HTTP
/// clients cannot be assembled.
pub async fn run_app() -> AppResult<()> {
    let config =
        AppConfig::from_env().map_err(|source| AppError::config("config.from_env", source))?;
    run_app_with(config).await
}

/// Boot sequence relying entirely on the injected configuration.
///
/// # Errors
///
/// Returns an error if any dependency cannot be assembled.
pub async fn run_app_with(config: AppConfig) -> AppResult<()> {
    acquira_telemetry::init_logging(&LoggingConfig::default())
        .map_err(|source| AppError::telemetry("telemetry.init", source))?;

    info!("acquira bootstrap starting");

    let store = Store::connect(&config.database_url)
        .await
        .map_err(|source| AppError::store("store.connect", source))?;
    let events = EventBus::new();
    let metrics =
        Metrics::new().map_err(|source| AppError::telemetry("telemetry.metrics", source))?;

    let siblings: Arc<dyn SiblingGateway> = Arc::new(
        HttpSiblings::new(
            SiblingEndpoints {
                vpn_url: config.vpn_url.clone(),
                torrent_url: config.torrent_url.clone(),
                metadata_url: config.metadata_url.clone(),
                subtitle_url: config.subtitle_url.clone(),
                media_url: config.media_url.clone(),
                publish_url: config.publish_url.clone(),
            },
            config.http_timeout(),
        )
        .map_err(|source| AppError::client("clients.siblings", source))?,
    );
    let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
    let orchestrator_config = OrchestratorConfig::from_app(&config);

    let runs: Arc<dyn RunRepository> = Arc::new(store.runs());
    let orchestrator = PipelineOrchestrator::new(
        Arc::clone(&runs),
        Arc::clone(&siblings),
        Arc::clone(&sleeper),
        events.clone(),
        metrics.clone(),
        orchestrator_config.clone(),
    );
    let planner = RetryPlanner::new(runs, orchestrator.clone());

    let (run_sender, run_receiver) = mpsc::channel::<i64>(DISPATCH_BUFFER);
    let dispatcher = spawn_dispatcher(run_receiver, orchestrator);

    recover_unsettled(&planner).await?;

    let worker = DownloadWorker::new(
        Arc::new(store.downloads()),
        Arc::new(store.queue()),
        siblings,
        sleeper,
        events.clone(),
        metrics.clone(),
        orchestrator_config,
    );
    let workers = spawn_download_workers(&worker, &config);

    let sampler = spawn_metrics_sampler(store.clone(), metrics.clone(), config.poll_interval());

    let fetcher = Arc::new(
        HttpFeedFetcher::new(config.http_timeout())
            .map_err(|source| AppError::client("clients.feed_fetcher", source))?,
    );
    let checker = FeedChecker::new(
        store.clone(),
        fetcher,
        run_sender,
        events.clone(),
        metrics.clone(),
        config.fuzzy_match_threshold,
    );
    let scheduler = RssScheduler::new(
        store,
        checker,
        events,
        metrics,
        SchedulerConfig {
            tick_interval: config.rss_check_interval(),
            concurrency: config.feed_check_concurrency,
            failure_escalation: defaults::FEED_FAILURE_ESCALATION,
        },
    );
    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    info!("acquira ready");
    wait_for_shutdown().await;
    info!("shutdown signal received; stopping background tasks");

    scheduler_task.abort();
    sampler.abort();
    for handle in workers {
        handle.abort();
    }
    dispatcher.abort();
    Ok(())
}

fn spawn_dispatcher(
    mut receiver: mpsc::Receiver<i64>,
    orchestrator: PipelineOrchestrator,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(run_id) = receiver.recv().await {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                if let Err(err) = orchestrator.execute(run_id).await {
                    error!(run_id, error = %err, "pipeline run aborted on store failure");
                }
            });
        }
    })
}

fn spawn_download_workers(worker: &DownloadWorker, config: &AppConfig) -> Vec<JoinHandle<()>> {
    let idle = config.poll_interval();
    (0..config.download_worker_count)
        .map(|index| {
            let worker = worker.clone();
            tokio::spawn(async move {
                if let Err(err) = worker.run(idle).await {
                    error!(worker = index, error = %err, "download worker stopped on store failure");
                }
            })
        })
        .collect()
}

/// Periodically sample the store into the queue-depth and active-run
/// gauges; the gauges would otherwise never move after registration.
fn spawn_metrics_sampler(store: Store, metrics: Metrics, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            match sample_queue_depth(&store).await {
                Ok(depth) => metrics.set_queue_depth(depth),
                Err(err) => warn!(error = %err, "failed to sample queue depth"),
            }
            match store.runs().list_unfinished().await {
                Ok(runs) => {
                    metrics.set_active_runs(i64::try_from(runs.len()).unwrap_or(i64::MAX));
                }
                Err(err) => warn!(error = %err, "failed to sample active runs"),
            }
        }
    })
}

/// Queue depth across every account with queued downloads.
async fn sample_queue_depth(store: &Store) -> Result<i64, DataError> {
    let queue = store.queue();
    let mut total = 0;
    for account_id in queue.queued_accounts().await? {
        total += queue.depth(account_id).await?;
    }
    Ok(total)
}

async fn recover_unsettled(planner: &RetryPlanner) -> AppResult<()> {
    let run_ids = planner
        .unsettled_runs()
        .await
        .map_err(|source| AppError::store("recovery.unsettled_runs", source))?;
    if run_ids.is_empty() {
        return Ok(());
    }

    info!(count = run_ids.len(), "resuming unsettled pipeline runs");
    for run_id in run_ids {
        let planner = planner.clone();
        tokio::spawn(async move {
            if let Err(err) = planner.retry(run_id).await {
                error!(run_id, error = %err, "failed to resume pipeline run");
            }
        });
    }
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}
