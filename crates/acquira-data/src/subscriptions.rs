//! Repository for account-scoped content subscriptions.

use acquira_core::{Subscription, SubscriptionType};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row, types::Json};
use tracing::warn;

use crate::error::{Result, query_failed};

const INSERT_SUBSCRIPTION: &str = r"
    INSERT INTO subscriptions (
        id, account_id, subscription_type, content_name, quality_profile_id,
        year, qualities, enabled, include_future_seasons, include_existing_seasons
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    RETURNING *
";

const SELECT_ENABLED: &str = r"
    SELECT * FROM subscriptions WHERE enabled = TRUE ORDER BY created_at
";

/// Database-backed repository for subscriptions.
#[derive(Clone)]
pub struct SubscriptionStore {
    pool: PgPool,
}

impl SubscriptionStore {
    pub(crate) const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn insert(&self, subscription: &Subscription) -> Result<Subscription> {
        let row = sqlx::query(INSERT_SUBSCRIPTION)
            .bind(subscription.id)
            .bind(subscription.account_id)
            .bind(subscription.subscription_type.as_str())
            .bind(&subscription.content_name)
            .bind(subscription.quality_profile_id)
            .bind(subscription.year)
            .bind(Json(serde_json::json!(subscription.qualities)))
            .bind(subscription.enabled)
            .bind(subscription.include_future_seasons)
            .bind(subscription.include_existing_seasons)
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed("subscriptions.insert"))?;
        decode_subscription(&row).map_err(query_failed("subscriptions.insert.decode"))
    }

    /// Every enabled subscription, across all accounts, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_enabled(&self) -> Result<Vec<Subscription>> {
        let rows = sqlx::query(SELECT_ENABLED)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("subscriptions.list_enabled"))?;
        rows.iter()
            .map(decode_subscription)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(query_failed("subscriptions.list_enabled.decode"))
    }
}

fn decode_subscription(row: &PgRow) -> std::result::Result<Subscription, sqlx::Error> {
    let type_label: String = row.try_get("subscription_type")?;
    let subscription_type = SubscriptionType::parse(&type_label).unwrap_or_else(|| {
        warn!(label = %type_label, "unknown subscription type label in store");
        SubscriptionType::TvShow
    });

    let Json(qualities_value) = row.try_get::<Json<serde_json::Value>, _>("qualities")?;
    let qualities: Vec<String> = serde_json::from_value(qualities_value).unwrap_or_default();

    Ok(Subscription {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        subscription_type,
        content_name: row.try_get("content_name")?,
        quality_profile_id: row.try_get("quality_profile_id")?,
        year: row.try_get("year")?,
        qualities,
        enabled: row.try_get("enabled")?,
        include_future_seasons: row.try_get("include_future_seasons")?,
        include_existing_seasons: row.try_get("include_existing_seasons")?,
        created_at: row.try_get("created_at")?,
    })
}
