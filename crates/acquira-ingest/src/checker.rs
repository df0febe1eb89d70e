//! Per-feed check pipeline: fetch, parse, fingerprint, dedup, match, act.

use std::collections::HashSet;
use std::sync::Arc;

use acquira_core::{
    ContentType, Feed, FeedItem, FeedItemStatus, FeedType, RunMetadata, RunTrigger, Subscription,
};
use acquira_data::{DataError, NewFeedItem, NewPipelineRun, Store};
use acquira_events::{Event, EventBus};
use acquira_match::{Fingerprint, extract_fingerprint};
use acquira_telemetry::Metrics;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::decision::{ItemDecision, decide};
use crate::fetch::{FeedFetcher, FetchError, FetchedItem};

/// Errors raised during a feed check.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The feed could not be fetched or parsed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The store failed.
    #[error(transparent)]
    Data(#[from] DataError),
}

/// Counters summarising one feed check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    /// Items stored for the first time.
    pub new_items: usize,
    /// New items that matched a subscription.
    pub matched: usize,
    /// New items that were rejected or skipped.
    pub rejected: usize,
}

/// Runs the check pipeline for a single feed.
#[derive(Clone)]
pub struct FeedChecker {
    store: Store,
    fetcher: Arc<dyn FeedFetcher>,
    dispatcher: mpsc::Sender<i64>,
    events: EventBus,
    metrics: Metrics,
    fuzzy_threshold: f64,
}

impl FeedChecker {
    /// Construct a checker with shared dependencies.
    ///
    /// Matched items create pipeline runs whose ids are handed to the
    /// dispatcher channel for orchestration.
    #[must_use]
    pub fn new(
        store: Store,
        fetcher: Arc<dyn FeedFetcher>,
        dispatcher: mpsc::Sender<i64>,
        events: EventBus,
        metrics: Metrics,
        fuzzy_threshold: f64,
    ) -> Self {
        Self {
            store,
            fetcher,
            dispatcher,
            events,
            metrics,
            fuzzy_threshold,
        }
    }

    /// Fetch the feed and run every new item through matching.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch, parse, or a store operation fails.
    pub async fn check_feed(&self, feed: &Feed) -> Result<CheckOutcome, CheckError> {
        let items = self.fetcher.fetch(&feed.url).await?;
        debug!(feed_id = %feed.id, items = items.len(), "fetched feed");

        let subscriptions = self.store.subscriptions().list_enabled().await?;
        let accounts: HashSet<Uuid> = subscriptions
            .iter()
            .map(|subscription| subscription.account_id)
            .collect();
        let mut rules = Vec::new();
        for account_id in accounts {
            rules.extend(self.store.rules().list_enabled(account_id).await?);
        }

        let mut outcome = CheckOutcome::default();
        for item in items {
            if item.title.trim().is_empty() {
                continue;
            }

            let Some(stored) = self.store_item(feed, &item).await? else {
                continue;
            };
            outcome.new_items += 1;

            // Match against the persisted fingerprint, not a re-extraction.
            let fingerprint = Fingerprint {
                title: stored.parsed_title.clone(),
                year: stored.year,
                season: stored.season,
                episode: stored.episode,
                qualities: stored.qualities.clone(),
                source: stored.source.clone(),
                release_group: stored.release_group.clone(),
            };
            let sample = json!({
                "title": stored.title,
                "year": stored.year,
                "season": stored.season,
                "episode": stored.episode,
                "seeders": stored.seeders,
                "leechers": stored.leechers,
                "size_bytes": stored.size_bytes,
                "source": stored.source,
                "release_group": stored.release_group,
            });

            let decision = decide(
                &fingerprint,
                &sample,
                &subscriptions,
                &rules,
                self.fuzzy_threshold,
            );
            self.act(feed, &stored, decision, &subscriptions, &mut outcome)
                .await?;
        }

        Ok(outcome)
    }

    async fn store_item(
        &self,
        feed: &Feed,
        item: &FetchedItem,
    ) -> Result<Option<FeedItem>, DataError> {
        let fingerprint = extract_fingerprint(&item.title);
        self.store
            .feeds()
            .upsert_item(NewFeedItem {
                feed_id: feed.id,
                title: item.title.clone(),
                link: item.link.clone(),
                pub_date: item.pub_date,
                parsed_title: fingerprint.title,
                year: fingerprint.year,
                season: fingerprint.season,
                episode: fingerprint.episode,
                qualities: fingerprint.qualities,
                source: fingerprint.source,
                release_group: fingerprint.release_group,
                size_bytes: item.size_bytes,
                seeders: None,
                leechers: None,
            })
            .await
    }

    async fn act(
        &self,
        feed: &Feed,
        item: &FeedItem,
        decision: ItemDecision,
        subscriptions: &[Subscription],
        outcome: &mut CheckOutcome,
    ) -> Result<(), DataError> {
        match decision {
            ItemDecision::Download { subscription_id } => {
                let run_id = self
                    .create_run(feed, item, subscription_id, subscriptions)
                    .await?;
                self.store
                    .feeds()
                    .set_item_status(item.id, FeedItemStatus::Matched, Some(subscription_id), None)
                    .await?;
                self.events.publish(Event::ItemEvaluated {
                    item_id: item.id,
                    status: FeedItemStatus::Matched,
                    subscription_id: Some(subscription_id),
                });
                self.metrics.inc_feed_item("matched");
                outcome.matched += 1;

                if self.dispatcher.send(run_id).await.is_err() {
                    warn!(run_id, "dispatcher channel closed; run awaits recovery sweep");
                }
                info!(
                    feed_id = %feed.id,
                    item_id = %item.id,
                    run_id,
                    "feed item matched; pipeline run created"
                );
            }
            ItemDecision::Notify {
                subscription_id,
                rule_id,
            } => {
                self.store
                    .feeds()
                    .set_item_status(item.id, FeedItemStatus::Matched, Some(subscription_id), None)
                    .await?;
                self.events.publish(Event::RuleNotification {
                    item_id: item.id,
                    rule_id,
                });
                self.metrics.inc_feed_item("notified");
                outcome.matched += 1;
            }
            ItemDecision::Skip {
                subscription_id,
                rule_id,
            } => {
                self.store
                    .feeds()
                    .set_item_status(
                        item.id,
                        FeedItemStatus::Rejected,
                        Some(subscription_id),
                        Some("skipped by rule"),
                    )
                    .await?;
                debug!(item_id = %item.id, rule_id = %rule_id, "feed item skipped by rule");
                self.metrics.inc_feed_item("skipped");
                outcome.rejected += 1;
            }
            ItemDecision::Rejected { reason } => {
                self.store
                    .feeds()
                    .set_item_status(item.id, FeedItemStatus::Rejected, None, Some(&reason))
                    .await?;
                self.events.publish(Event::ItemEvaluated {
                    item_id: item.id,
                    status: FeedItemStatus::Rejected,
                    subscription_id: None,
                });
                self.metrics.inc_feed_item("rejected");
                outcome.rejected += 1;
            }
        }
        Ok(())
    }

    async fn create_run(
        &self,
        feed: &Feed,
        item: &FeedItem,
        subscription_id: Uuid,
        subscriptions: &[Subscription],
    ) -> Result<i64, DataError> {
        let account_id = subscriptions
            .iter()
            .find(|subscription| subscription.id == subscription_id)
            .map(|subscription| subscription.account_id)
            .ok_or(DataError::NotFound {
                entity: "subscription",
            })?;

        let (magnet_url, torrent_url) = match item.link.as_deref() {
            Some(link) if link.starts_with("magnet:") => (Some(link.to_string()), None),
            Some(link) => (None, Some(link.to_string())),
            None => (None, None),
        };

        let run = self
            .store
            .runs()
            .create(NewPipelineRun {
                account_id,
                trigger: RunTrigger::Rss,
                content_title: item.title.clone(),
                content_type: content_type_for(feed.feed_type),
                metadata: RunMetadata {
                    magnet_url,
                    torrent_url,
                    ..RunMetadata::default()
                },
            })
            .await?;

        self.events.publish(Event::RunCreated {
            run_id: run.id,
            content_title: run.content_title.clone(),
        });
        Ok(run.id)
    }
}

const fn content_type_for(feed_type: FeedType) -> ContentType {
    match feed_type {
        FeedType::TvShows => ContentType::TvShow,
        FeedType::Movies => ContentType::Movie,
        FeedType::Anime => ContentType::Anime,
        FeedType::Music => ContentType::Music,
    }
}
