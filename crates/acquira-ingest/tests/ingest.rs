use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use acquira_core::{FeedItemStatus, FeedType, PipelineStatus, RunTrigger, Subscription};
use acquira_data::Store;
use acquira_events::EventBus;
use acquira_ingest::{FeedChecker, FeedFetcher, FetchError, FetchedItem};
use acquira_match::DEFAULT_FUZZY_THRESHOLD;
use acquira_telemetry::Metrics;
use acquira_test_support::{docker, postgres};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::mpsc;
use tokio::time::sleep;
use uuid::Uuid;

struct CannedFetcher {
    items: Vec<FetchedItem>,
}

#[async_trait]
impl FeedFetcher for CannedFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<FetchedItem>, FetchError> {
        Ok(self.items.clone())
    }
}

fn release(title: &str) -> FetchedItem {
    FetchedItem {
        title: title.to_string(),
        link: Some("magnet:?xt=urn:btih:abc".to_string()),
        pub_date: Some(Utc::now()),
        size_bytes: Some(4_000_000_000),
    }
}

async fn with_store<F, Fut>(test: F) -> Result<()>
where
    F: FnOnce(Store) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    if !docker::available() {
        eprintln!("skipping ingest tests: docker socket missing");
        return Ok(());
    }

    let database = postgres::start().await?;
    let pool = {
        let mut attempts = 0;
        loop {
            match PgPoolOptions::new()
                .max_connections(5)
                .connect(&database.url)
                .await
            {
                Ok(pool) => break pool,
                Err(err) => {
                    attempts += 1;
                    if attempts >= 10 {
                        return Err(err).context("failed to connect to ephemeral postgres");
                    }
                    sleep(Duration::from_millis(200)).await;
                }
            }
        }
    };

    let store = Store::new(pool.clone())
        .await
        .context("failed to initialise store")?;
    let result = test(store).await;

    pool.close().await;
    drop(database);
    result
}

fn dune_subscription() -> Subscription {
    Subscription {
        id: Uuid::new_v4(),
        account_id: Uuid::new_v4(),
        subscription_type: acquira_core::SubscriptionType::MovieCollection,
        content_name: "Dune".to_string(),
        quality_profile_id: None,
        year: Some(2021),
        qualities: vec!["1080p".to_string()],
        enabled: true,
        include_future_seasons: true,
        include_existing_seasons: false,
        created_at: Utc::now(),
    }
}

fn checker(
    store: &Store,
    items: Vec<FetchedItem>,
    dispatcher: mpsc::Sender<i64>,
) -> FeedChecker {
    FeedChecker::new(
        store.clone(),
        Arc::new(CannedFetcher { items }),
        dispatcher,
        EventBus::new(),
        Metrics::new().expect("metrics registry"),
        DEFAULT_FUZZY_THRESHOLD,
    )
}

#[tokio::test]
async fn matched_release_creates_a_pipeline_run() -> Result<()> {
    with_store(|store| async move {
        let feed = store
            .feeds()
            .insert("https://feeds.test/movies", FeedType::Movies, 30, None)
            .await?;
        let subscription = dune_subscription();
        store.subscriptions().insert(&subscription).await?;

        let (sender, mut receiver) = mpsc::channel(4);
        let checker = checker(
            &store,
            vec![release("Dune.2021.1080p.BluRay.x264-GROUP")],
            sender,
        );

        let outcome = checker.check_feed(&feed).await?;
        assert_eq!(outcome.new_items, 1);
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.rejected, 0);

        let run_id = receiver.try_recv().expect("run id should be dispatched");
        let run = store.runs().fetch_required(run_id).await?;
        assert_eq!(run.trigger, RunTrigger::Rss);
        assert_eq!(run.status, PipelineStatus::Pending);
        assert_eq!(run.account_id, subscription.account_id);
        assert_eq!(
            run.metadata.magnet_url.as_deref(),
            Some("magnet:?xt=urn:btih:abc")
        );

        let items = store.feeds().items_for_feed(feed.id).await?;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, FeedItemStatus::Matched);
        assert_eq!(items[0].matched_subscription_id, Some(subscription.id));

        // Checking the same feed again must not duplicate the item.
        let repeat = checker.check_feed(&feed).await?;
        assert_eq!(repeat.new_items, 0);
        assert!(receiver.try_recv().is_err(), "no second run dispatched");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn unmatched_release_is_rejected_with_reason() -> Result<()> {
    with_store(|store| async move {
        let feed = store
            .feeds()
            .insert("https://feeds.test/movies", FeedType::Movies, 30, None)
            .await?;
        store.subscriptions().insert(&dune_subscription()).await?;

        let (sender, mut receiver) = mpsc::channel(4);
        let checker = checker(&store, vec![release("Dune.2021.720p.WEBRip")], sender);

        let outcome = checker.check_feed(&feed).await?;
        assert_eq!(outcome.new_items, 1);
        assert_eq!(outcome.matched, 0);
        assert_eq!(outcome.rejected, 1);
        assert!(receiver.try_recv().is_err(), "no run for rejected items");

        let unfinished = store.runs().list_unfinished().await?;
        assert!(unfinished.is_empty());
        Ok(())
    })
    .await
}

#[tokio::test]
async fn rejected_item_records_quality_reason() -> Result<()> {
    with_store(|store| async move {
        let feed = store
            .feeds()
            .insert("https://feeds.test/movies", FeedType::Movies, 30, None)
            .await?;
        store.subscriptions().insert(&dune_subscription()).await?;

        let (sender, _receiver) = mpsc::channel(4);
        let checker = checker(&store, vec![release("Dune.2021.720p.WEBRip")], sender);
        checker.check_feed(&feed).await?;

        let items = store.feeds().items_for_feed(feed.id).await?;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, FeedItemStatus::Rejected);
        assert!(
            items[0]
                .rejection_reason
                .as_deref()
                .is_some_and(|reason| reason.contains("quality")),
            "reason was {:?}",
            items[0].rejection_reason
        );
        assert!(items[0].matched_subscription_id.is_none());
        Ok(())
    })
    .await
}
