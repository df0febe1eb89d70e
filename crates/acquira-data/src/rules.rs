//! Repository for predicate-driven download rules.

use acquira_core::{DownloadRule, RuleAction};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row, types::Json};
use tracing::warn;

use crate::error::{Result, query_failed};
use uuid::Uuid;

const INSERT_RULE: &str = r"
    INSERT INTO download_rules (id, account_id, conditions, action, priority, enabled)
    VALUES ($1, $2, $3, $4, $5, $6)
    RETURNING *
";

const SELECT_ENABLED_FOR_ACCOUNT: &str = r"
    SELECT * FROM download_rules
    WHERE account_id = $1 AND enabled = TRUE
    ORDER BY priority DESC
";

/// Database-backed repository for download rules.
#[derive(Clone)]
pub struct RuleStore {
    pool: PgPool,
}

impl RuleStore {
    pub(crate) const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn insert(&self, rule: &DownloadRule) -> Result<DownloadRule> {
        let row = sqlx::query(INSERT_RULE)
            .bind(rule.id)
            .bind(rule.account_id)
            .bind(Json(rule.conditions.clone()))
            .bind(rule.action.as_str())
            .bind(rule.priority)
            .bind(rule.enabled)
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed("rules.insert"))?;
        decode_rule(&row).map_err(query_failed("rules.insert.decode"))
    }

    /// Enabled rules for one account, highest priority first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_enabled(&self, account_id: Uuid) -> Result<Vec<DownloadRule>> {
        let rows = sqlx::query(SELECT_ENABLED_FOR_ACCOUNT)
            .bind(account_id)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("rules.list_enabled"))?;
        rows.iter()
            .map(decode_rule)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(query_failed("rules.list_enabled.decode"))
    }
}

fn decode_rule(row: &PgRow) -> std::result::Result<DownloadRule, sqlx::Error> {
    let action_label: String = row.try_get("action")?;
    let action = RuleAction::parse(&action_label).unwrap_or_else(|| {
        warn!(label = %action_label, "unknown rule action label in store");
        RuleAction::Skip
    });

    let Json(conditions) = row.try_get::<Json<serde_json::Value>, _>("conditions")?;

    Ok(DownloadRule {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        conditions,
        action,
        priority: row.try_get("priority")?,
        enabled: row.try_get("enabled")?,
    })
}
