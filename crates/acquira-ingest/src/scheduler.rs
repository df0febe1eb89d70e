//! Background scheduler driving feed checks on a coarse interval with a
//! bounded worker pool.

use std::sync::Arc;
use std::time::Duration;

use acquira_data::Store;
use acquira_events::{Event, EventBus};
use acquira_telemetry::Metrics;
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::checker::FeedChecker;

/// Scheduler tunables.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between scheduler ticks.
    pub tick_interval: Duration,
    /// Concurrent feed checks allowed per tick.
    pub concurrency: usize,
    /// Consecutive failures after which logging escalates to warn.
    pub failure_escalation: i32,
}

/// Ticks on a coarse interval and checks every due feed.
///
/// Feeds schedule themselves through `next_check_at`, computed from each
/// feed's own `check_interval_minutes`; the tick interval only bounds how
/// promptly a due feed is noticed.
#[derive(Clone)]
pub struct RssScheduler {
    store: Store,
    checker: FeedChecker,
    events: EventBus,
    metrics: Metrics,
    config: SchedulerConfig,
}

impl RssScheduler {
    /// Construct a scheduler with shared dependencies.
    #[must_use]
    pub fn new(
        store: Store,
        checker: FeedChecker,
        events: EventBus,
        metrics: Metrics,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            checker,
            events,
            metrics,
            config,
        }
    }

    /// Scheduler loop; ticks until the owning task is dropped.
    pub async fn run(&self) {
        let mut ticker = interval(self.config.tick_interval);
        loop {
            ticker.tick().await;
            if let Err(err) = self.tick().await {
                error!(error = %err, "feed scheduler tick failed");
            }
        }
    }

    /// Check every due feed once, bounded by the configured concurrency.
    ///
    /// # Errors
    ///
    /// Returns an error if the due-feed query fails; individual feed check
    /// failures are recorded on the feed and do not fail the tick.
    pub async fn tick(&self) -> Result<usize, acquira_data::DataError> {
        let due = self.store.feeds().due_feeds(Utc::now()).await?;
        if due.is_empty() {
            debug!("no feeds due for checking");
            return Ok(0);
        }

        info!(feeds = due.len(), "checking due feeds");
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut handles = Vec::with_capacity(due.len());

        for feed in due {
            let scheduler = self.clone();
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                scheduler.check_one(feed).await;
            }));
        }

        let count = handles.len();
        for handle in handles {
            if let Err(err) = handle.await {
                error!(error = %err, "feed check task panicked");
            }
        }
        Ok(count)
    }

    async fn check_one(&self, feed: acquira_core::Feed) {
        self.events.publish(Event::FeedCheckStarted { feed_id: feed.id });
        let now = Utc::now();

        match self.checker.check_feed(&feed).await {
            Ok(outcome) => {
                if let Err(err) = self.store.feeds().mark_success(&feed, now).await {
                    error!(feed_id = %feed.id, error = %err, "failed to record feed success");
                    return;
                }
                self.metrics.inc_feed_check("success");
                self.events.publish(Event::FeedCheckCompleted {
                    feed_id: feed.id,
                    new_items: outcome.new_items,
                });
                debug!(
                    feed_id = %feed.id,
                    new_items = outcome.new_items,
                    matched = outcome.matched,
                    rejected = outcome.rejected,
                    "feed check completed"
                );
            }
            Err(err) => {
                let message = err.to_string();
                self.metrics.inc_feed_check("failure");
                self.events.publish(Event::FeedCheckFailed {
                    feed_id: feed.id,
                    message: message.clone(),
                });

                match self.store.feeds().mark_failure(&feed, &message, now).await {
                    Ok(failures) if failures >= self.config.failure_escalation => {
                        // Operators decide whether to disable the feed; the
                        // scheduler never does.
                        warn!(
                            feed_id = %feed.id,
                            consecutive_failures = failures,
                            error = %message,
                            "feed keeps failing"
                        );
                    }
                    Ok(failures) => {
                        debug!(
                            feed_id = %feed.id,
                            consecutive_failures = failures,
                            error = %message,
                            "feed check failed"
                        );
                    }
                    Err(store_err) => {
                        error!(feed_id = %feed.id, error = %store_err, "failed to record feed failure");
                    }
                }
            }
        }
    }
}
