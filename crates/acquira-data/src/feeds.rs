//! Repository for RSS feeds and their ingested items.
//!
//! Items are dedup-keyed by `(feed_id, title)`: the upsert never mutates an
//! existing row, it only reports whether the insert took effect.

use acquira_core::{Feed, FeedItem, FeedItemStatus, FeedType};
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row, types::Json};
use tracing::warn;
use uuid::Uuid;

use crate::error::{Result, query_failed};

const INSERT_FEED: &str = r"
    INSERT INTO rss_feeds (
        id, url, feed_type, enabled, check_interval_minutes, quality_profile_id
    )
    VALUES ($1, $2, $3, $4, $5, $6)
    RETURNING *
";

const SELECT_DUE_FEEDS: &str = r"
    SELECT * FROM rss_feeds
    WHERE enabled = TRUE
      AND (next_check_at IS NULL OR next_check_at <= $1)
    ORDER BY next_check_at ASC NULLS FIRST
";

const MARK_CHECK_SUCCESS: &str = r"
    UPDATE rss_feeds
    SET last_check_at = $2,
        last_success_at = $2,
        consecutive_failures = 0,
        last_error = NULL,
        next_check_at = $3
    WHERE id = $1
";

const MARK_CHECK_FAILURE: &str = r"
    UPDATE rss_feeds
    SET last_check_at = $2,
        consecutive_failures = consecutive_failures + 1,
        last_error = $4,
        next_check_at = $3
    WHERE id = $1
    RETURNING consecutive_failures
";

const INSERT_ITEM: &str = r"
    INSERT INTO rss_feed_items (
        id, feed_id, title, link, pub_date, parsed_title, year, season, episode,
        qualities, source, release_group, size_bytes, seeders, leechers
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
    ON CONFLICT (feed_id, title) DO NOTHING
    RETURNING *
";

const SELECT_ITEM: &str = r"SELECT * FROM rss_feed_items WHERE id = $1";

const SELECT_ITEMS_FOR_FEED: &str = r"
    SELECT * FROM rss_feed_items WHERE feed_id = $1 ORDER BY created_at ASC, id ASC
";

const UPDATE_ITEM_STATUS: &str = r"
    UPDATE rss_feed_items
    SET status = $2, matched_subscription_id = $3, rejection_reason = $4
    WHERE id = $1
";

/// Fields required to store a newly ingested feed item.
#[derive(Debug, Clone)]
pub struct NewFeedItem {
    /// Feed the item came from.
    pub feed_id: Uuid,
    /// Raw release title as announced.
    pub title: String,
    /// Download link as announced.
    pub link: Option<String>,
    /// Publication time as announced.
    pub pub_date: Option<DateTime<Utc>>,
    /// Normalised title extracted from the release name.
    pub parsed_title: String,
    /// Release year extracted from the title.
    pub year: Option<i32>,
    /// Season number extracted from the title.
    pub season: Option<i32>,
    /// Episode number extracted from the title.
    pub episode: Option<i32>,
    /// Quality tokens found in the title.
    pub qualities: Vec<String>,
    /// Source tag found in the title.
    pub source: Option<String>,
    /// Release group parsed from the title's tail.
    pub release_group: Option<String>,
    /// Payload size reported by the feed.
    pub size_bytes: Option<i64>,
    /// Seeder count reported by the feed.
    pub seeders: Option<i32>,
    /// Leecher count reported by the feed.
    pub leechers: Option<i32>,
}

/// Database-backed repository for feeds and feed items.
#[derive(Clone)]
pub struct FeedStore {
    pool: PgPool,
}

impl FeedStore {
    pub(crate) const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register a feed.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn insert(
        &self,
        url: &str,
        feed_type: FeedType,
        check_interval_minutes: i32,
        quality_profile_id: Option<Uuid>,
    ) -> Result<Feed> {
        let row = sqlx::query(INSERT_FEED)
            .bind(Uuid::new_v4())
            .bind(url)
            .bind(feed_type.as_str())
            .bind(true)
            .bind(check_interval_minutes)
            .bind(quality_profile_id)
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed("feeds.insert"))?;
        decode_feed(&row).map_err(query_failed("feeds.insert.decode"))
    }

    /// Enabled feeds due for a check at `now`, never-checked feeds first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn due_feeds(&self, now: DateTime<Utc>) -> Result<Vec<Feed>> {
        let rows = sqlx::query(SELECT_DUE_FEEDS)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("feeds.due_feeds"))?;
        rows.iter()
            .map(decode_feed)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(query_failed("feeds.due_feeds.decode"))
    }

    /// Record a successful check: reset the failure counter and schedule the
    /// next check from the feed's own interval.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_success(&self, feed: &Feed, now: DateTime<Utc>) -> Result<()> {
        let next = now + Duration::minutes(i64::from(feed.check_interval_minutes));
        sqlx::query(MARK_CHECK_SUCCESS)
            .bind(feed.id)
            .bind(now)
            .bind(next)
            .execute(&self.pool)
            .await
            .map_err(query_failed("feeds.mark_success"))?;
        Ok(())
    }

    /// Record a failed check; returns the updated consecutive failure count.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_failure(
        &self,
        feed: &Feed,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<i32> {
        let next = now + Duration::minutes(i64::from(feed.check_interval_minutes));
        let row = sqlx::query(MARK_CHECK_FAILURE)
            .bind(feed.id)
            .bind(now)
            .bind(next)
            .bind(error)
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed("feeds.mark_failure"))?;
        row.try_get("consecutive_failures")
            .map_err(query_failed("feeds.mark_failure.decode"))
    }

    /// Store a newly ingested item unless `(feed_id, title)` already exists.
    ///
    /// Returns `None` when the key was already present; the existing row is
    /// never mutated.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn upsert_item(&self, new: NewFeedItem) -> Result<Option<FeedItem>> {
        let row = sqlx::query(INSERT_ITEM)
            .bind(Uuid::new_v4())
            .bind(new.feed_id)
            .bind(&new.title)
            .bind(new.link.as_deref())
            .bind(new.pub_date)
            .bind(&new.parsed_title)
            .bind(new.year)
            .bind(new.season)
            .bind(new.episode)
            .bind(Json(serde_json::json!(new.qualities)))
            .bind(new.source.as_deref())
            .bind(new.release_group.as_deref())
            .bind(new.size_bytes)
            .bind(new.seeders)
            .bind(new.leechers)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("feeds.upsert_item"))?;
        row.map(|row| decode_item(&row))
            .transpose()
            .map_err(query_failed("feeds.upsert_item.decode"))
    }

    /// Fetch an item by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row cannot be decoded.
    pub async fn fetch_item(&self, id: Uuid) -> Result<Option<FeedItem>> {
        let row = sqlx::query(SELECT_ITEM)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("feeds.fetch_item"))?;
        row.map(|row| decode_item(&row))
            .transpose()
            .map_err(query_failed("feeds.fetch_item.decode"))
    }

    /// Every stored item for a feed, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn items_for_feed(&self, feed_id: Uuid) -> Result<Vec<FeedItem>> {
        let rows = sqlx::query(SELECT_ITEMS_FOR_FEED)
            .bind(feed_id)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("feeds.items_for_feed"))?;
        rows.iter()
            .map(decode_item)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(query_failed("feeds.items_for_feed.decode"))
    }

    /// Record the evaluation outcome for an item.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_item_status(
        &self,
        id: Uuid,
        status: FeedItemStatus,
        matched_subscription_id: Option<Uuid>,
        rejection_reason: Option<&str>,
    ) -> Result<()> {
        sqlx::query(UPDATE_ITEM_STATUS)
            .bind(id)
            .bind(status.as_str())
            .bind(matched_subscription_id)
            .bind(rejection_reason)
            .execute(&self.pool)
            .await
            .map_err(query_failed("feeds.set_item_status"))?;
        Ok(())
    }
}

fn decode_qualities(row: &PgRow, column: &str) -> std::result::Result<Vec<String>, sqlx::Error> {
    let Json(value) = row.try_get::<Json<serde_json::Value>, _>(column)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn decode_feed(row: &PgRow) -> std::result::Result<Feed, sqlx::Error> {
    let feed_type_label: String = row.try_get("feed_type")?;
    let feed_type = FeedType::parse(&feed_type_label).unwrap_or_else(|| {
        warn!(label = %feed_type_label, "unknown feed type label in store");
        FeedType::Movies
    });

    Ok(Feed {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        feed_type,
        enabled: row.try_get("enabled")?,
        check_interval_minutes: row.try_get("check_interval_minutes")?,
        last_check_at: row.try_get("last_check_at")?,
        last_success_at: row.try_get("last_success_at")?,
        consecutive_failures: row.try_get("consecutive_failures")?,
        last_error: row.try_get("last_error")?,
        next_check_at: row.try_get("next_check_at")?,
        quality_profile_id: row.try_get("quality_profile_id")?,
    })
}

fn decode_item(row: &PgRow) -> std::result::Result<FeedItem, sqlx::Error> {
    let status_label: String = row.try_get("status")?;
    let status = FeedItemStatus::parse(&status_label).unwrap_or_else(|| {
        warn!(label = %status_label, "unknown feed item status label in store");
        FeedItemStatus::Pending
    });

    Ok(FeedItem {
        id: row.try_get("id")?,
        feed_id: row.try_get("feed_id")?,
        title: row.try_get("title")?,
        link: row.try_get("link")?,
        pub_date: row.try_get("pub_date")?,
        parsed_title: row.try_get("parsed_title")?,
        year: row.try_get("year")?,
        season: row.try_get("season")?,
        episode: row.try_get("episode")?,
        qualities: decode_qualities(row, "qualities")?,
        source: row.try_get("source")?,
        release_group: row.try_get("release_group")?,
        size_bytes: row.try_get("size_bytes")?,
        seeders: row.try_get("seeders")?,
        leechers: row.try_get("leechers")?,
        status,
        matched_subscription_id: row.try_get("matched_subscription_id")?,
        rejection_reason: row.try_get("rejection_reason")?,
        created_at: row.try_get("created_at")?,
    })
}
