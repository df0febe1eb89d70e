//! Priority-ordered acquisition queue over download ids.
//!
//! Entries are weak references to downloads; `add` is an upsert, `remove` is
//! idempotent, and pops order by `priority DESC, created_at ASC` under
//! `FOR UPDATE SKIP LOCKED` so concurrent workers never hand out the same
//! entry twice.

use acquira_core::QueueEntry;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{Result, query_failed};

const UPSERT_ENTRY: &str = r"
    INSERT INTO acquisition_queue (download_id, priority)
    VALUES ($1, $2)
    ON CONFLICT (download_id) DO UPDATE SET priority = EXCLUDED.priority
";

const DELETE_ENTRY: &str = r"DELETE FROM acquisition_queue WHERE download_id = $1";

const POP_ENTRY: &str = r"
    SELECT download_id, priority, created_at
    FROM acquisition_queue
    ORDER BY priority DESC, created_at ASC
    LIMIT 1
    FOR UPDATE SKIP LOCKED
";

const COUNT_PENDING: &str = r"
    SELECT COUNT(*) AS depth
    FROM acquisition_queue q
    JOIN downloads d ON d.id = q.download_id
    WHERE d.account_id = $1
      AND d.state NOT IN ('completed', 'cancelled')
";

const SELECT_QUEUED_ACCOUNTS: &str = r"
    SELECT DISTINCT d.account_id
    FROM acquisition_queue q
    JOIN downloads d ON d.id = q.download_id
";

/// Database-backed acquisition queue.
#[derive(Clone)]
pub struct QueueStore {
    pool: PgPool,
}

impl QueueStore {
    pub(crate) const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue a download, updating its priority if already present.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn add(&self, download_id: Uuid, priority: i32) -> Result<()> {
        sqlx::query(UPSERT_ENTRY)
            .bind(download_id)
            .bind(priority)
            .execute(&self.pool)
            .await
            .map_err(query_failed("queue.add"))?;
        Ok(())
    }

    /// Remove a download from the queue; removing an absent entry is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn remove(&self, download_id: Uuid) -> Result<()> {
        sqlx::query(DELETE_ENTRY)
            .bind(download_id)
            .execute(&self.pool)
            .await
            .map_err(query_failed("queue.remove"))?;
        Ok(())
    }

    /// Pop the highest-priority entry, earliest first on ties.
    ///
    /// The entry is deleted as part of the pop; `None` means the queue is
    /// empty (or every entry is locked by another worker).
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn pop(&self) -> Result<Option<QueueEntry>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(query_failed("queue.pop.begin"))?;

        let Some(row) = sqlx::query(POP_ENTRY)
            .fetch_optional(tx.as_mut())
            .await
            .map_err(query_failed("queue.pop.select"))?
        else {
            tx.rollback()
                .await
                .map_err(query_failed("queue.pop.rollback"))?;
            return Ok(None);
        };

        let entry = QueueEntry {
            download_id: row
                .try_get("download_id")
                .map_err(query_failed("queue.pop.decode"))?,
            priority: row
                .try_get("priority")
                .map_err(query_failed("queue.pop.decode"))?,
            created_at: row
                .try_get("created_at")
                .map_err(query_failed("queue.pop.decode"))?,
        };

        sqlx::query(DELETE_ENTRY)
            .bind(entry.download_id)
            .execute(tx.as_mut())
            .await
            .map_err(query_failed("queue.pop.delete"))?;

        tx.commit()
            .await
            .map_err(query_failed("queue.pop.commit"))?;

        Ok(Some(entry))
    }

    /// Number of queued entries whose download is still non-terminal, for
    /// one account.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn depth(&self, account_id: Uuid) -> Result<i64> {
        let row = sqlx::query(COUNT_PENDING)
            .bind(account_id)
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed("queue.depth"))?;
        row.try_get("depth").map_err(query_failed("queue.depth"))
    }

    /// Accounts that currently have at least one queued download.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn queued_accounts(&self) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(SELECT_QUEUED_ACCOUNTS)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("queue.queued_accounts"))?;
        rows.iter()
            .map(|row| row.try_get("account_id"))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(query_failed("queue.queued_accounts.decode"))
    }
}
