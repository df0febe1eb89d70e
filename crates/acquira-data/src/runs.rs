//! Repository for pipeline run rows and their per-stage status columns.

use acquira_core::{
    ContentType, PipelineRun, PipelineStatus, RunMetadata, RunTrigger, Stage, StageProgress,
    StageStatus,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row, types::Json};
use tracing::warn;
use uuid::Uuid;

use crate::error::{DataError, Result, query_failed};

const INSERT_RUN: &str = r"
    INSERT INTO pipeline_runs (account_id, triggered_by, content_title, content_type, metadata)
    VALUES ($1, $2, $3, $4, $5)
    RETURNING *
";

const SELECT_RUN: &str = r"SELECT * FROM pipeline_runs WHERE id = $1";

const SELECT_UNFINISHED: &str = r"
    SELECT * FROM pipeline_runs
    WHERE status NOT IN ('completed', 'failed', 'cancelled')
    ORDER BY id
";

const UPDATE_STATUS: &str = r"
    UPDATE pipeline_runs
    SET status = $2,
        completed_at = CASE WHEN $2 = 'completed' THEN now() ELSE completed_at END,
        updated_at = now()
    WHERE id = $1
";

const UPDATE_ERROR: &str = r"
    UPDATE pipeline_runs SET error_message = $2, updated_at = now() WHERE id = $1
";

const UPDATE_TORRENT_DOWNLOAD_ID: &str = r"
    UPDATE pipeline_runs SET torrent_download_id = $2, updated_at = now() WHERE id = $1
";

const UPDATE_ENCODING_JOB_ID: &str = r"
    UPDATE pipeline_runs SET encoding_job_id = $2, updated_at = now() WHERE id = $1
";

const UPDATE_METADATA: &str = r"
    UPDATE pipeline_runs SET metadata = $2, updated_at = now() WHERE id = $1
";

/// Fields required to create a pipeline run.
#[derive(Debug, Clone)]
pub struct NewPipelineRun {
    /// Account scope that owns the run.
    pub account_id: Uuid,
    /// How the run was triggered.
    pub trigger: RunTrigger,
    /// Title of the content being acquired.
    pub content_title: String,
    /// Kind of content being acquired.
    pub content_type: ContentType,
    /// Seed metadata (magnet/torrent URL and forwarder fields).
    pub metadata: RunMetadata,
}

/// Database-backed repository for pipeline runs.
#[derive(Clone)]
pub struct RunStore {
    pool: PgPool,
}

impl RunStore {
    pub(crate) const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new run row in `pending` status.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create(&self, new: NewPipelineRun) -> Result<PipelineRun> {
        let metadata =
            serde_json::to_value(&new.metadata).unwrap_or_else(|_| serde_json::json!({}));
        let row = sqlx::query(INSERT_RUN)
            .bind(new.account_id)
            .bind(new.trigger.as_str())
            .bind(&new.content_title)
            .bind(new.content_type.as_str())
            .bind(Json(metadata))
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed("runs.create"))?;
        decode_run(&row).map_err(query_failed("runs.create.decode"))
    }

    /// Fetch a run by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row cannot be decoded.
    pub async fn fetch(&self, id: i64) -> Result<Option<PipelineRun>> {
        let row = sqlx::query(SELECT_RUN)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("runs.fetch"))?;
        row.map(|row| decode_run(&row))
            .transpose()
            .map_err(query_failed("runs.fetch.decode"))
    }

    /// Fetch a run that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::NotFound`] when the row is absent.
    pub async fn fetch_required(&self, id: i64) -> Result<PipelineRun> {
        self.fetch(id)
            .await?
            .ok_or(DataError::NotFound { entity: "run" })
    }

    /// Runs that have not reached a terminal aggregate status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_unfinished(&self) -> Result<Vec<PipelineRun>> {
        let rows = sqlx::query(SELECT_UNFINISHED)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("runs.list_unfinished"))?;
        rows.iter()
            .map(decode_run)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(query_failed("runs.list_unfinished.decode"))
    }

    /// Mark a stage as running, stamping its start time and mirroring the
    /// aggregate status onto the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_stage_running(&self, id: i64, stage: Stage) -> Result<()> {
        let (status_col, started_col, _) = stage_columns(stage);
        let sql = format!(
            "UPDATE pipeline_runs
             SET {status_col} = 'running',
                 {started_col} = COALESCE({started_col}, now()),
                 status = $2,
                 updated_at = now()
             WHERE id = $1"
        );
        sqlx::query(sqlx::AssertSqlSafe(sql))
            .bind(id)
            .bind(PipelineStatus::for_stage(stage).as_str())
            .execute(&self.pool)
            .await
            .map_err(query_failed("runs.mark_stage_running"))?;
        Ok(())
    }

    /// Record a stage's terminal status, stamping its completion time.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_stage_terminal(&self, id: i64, stage: Stage, status: StageStatus) -> Result<()> {
        let (status_col, _, completed_col) = stage_columns(stage);
        let sql = format!(
            "UPDATE pipeline_runs
             SET {status_col} = $2,
                 {completed_col} = now(),
                 updated_at = now()
             WHERE id = $1"
        );
        sqlx::query(sqlx::AssertSqlSafe(sql))
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(query_failed("runs.mark_stage_terminal"))?;
        Ok(())
    }

    /// Set the aggregate status; `completed` also stamps `completed_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_status(&self, id: i64, status: PipelineStatus) -> Result<()> {
        sqlx::query(UPDATE_STATUS)
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(query_failed("runs.set_status"))?;
        Ok(())
    }

    /// Record (or clear) the human-readable failure cause.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_error(&self, id: i64, message: Option<&str>) -> Result<()> {
        sqlx::query(UPDATE_ERROR)
            .bind(id)
            .bind(message)
            .execute(&self.pool)
            .await
            .map_err(query_failed("runs.set_error"))?;
        Ok(())
    }

    /// Persist the torrent manager's download identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_torrent_download_id(&self, id: i64, download_id: &str) -> Result<()> {
        sqlx::query(UPDATE_TORRENT_DOWNLOAD_ID)
            .bind(id)
            .bind(download_id)
            .execute(&self.pool)
            .await
            .map_err(query_failed("runs.set_torrent_download_id"))?;
        Ok(())
    }

    /// Persist the media processor's job identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_encoding_job_id(&self, id: i64, job_id: &str) -> Result<()> {
        sqlx::query(UPDATE_ENCODING_JOB_ID)
            .bind(id)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(query_failed("runs.set_encoding_job_id"))?;
        Ok(())
    }

    /// Replace the run's metadata record.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn update_metadata(&self, id: i64, metadata: &RunMetadata) -> Result<()> {
        let value = serde_json::to_value(metadata).unwrap_or_else(|_| serde_json::json!({}));
        sqlx::query(UPDATE_METADATA)
            .bind(id)
            .bind(Json(value))
            .execute(&self.pool)
            .await
            .map_err(query_failed("runs.update_metadata"))?;
        Ok(())
    }
}

const fn stage_columns(stage: Stage) -> (&'static str, &'static str, &'static str) {
    match stage {
        Stage::Vpn => ("vpn_status", "vpn_started_at", "vpn_completed_at"),
        Stage::Torrent => (
            "torrent_status",
            "torrent_started_at",
            "torrent_completed_at",
        ),
        Stage::Metadata => (
            "metadata_status",
            "metadata_started_at",
            "metadata_completed_at",
        ),
        Stage::Subtitle => (
            "subtitle_status",
            "subtitle_started_at",
            "subtitle_completed_at",
        ),
        Stage::Encoding => (
            "encoding_status",
            "encoding_started_at",
            "encoding_completed_at",
        ),
        Stage::Publishing => (
            "publishing_status",
            "publishing_started_at",
            "publishing_completed_at",
        ),
    }
}

fn decode_stage(row: &PgRow, stage: Stage) -> std::result::Result<StageProgress, sqlx::Error> {
    let (status_col, started_col, completed_col) = stage_columns(stage);
    let label: String = row.try_get(status_col)?;
    let status = StageStatus::parse(&label).unwrap_or_else(|| {
        warn!(stage = stage.as_str(), label = %label, "unknown stage status label in store");
        StageStatus::Pending
    });
    Ok(StageProgress {
        status,
        started_at: row.try_get::<Option<DateTime<Utc>>, _>(started_col)?,
        completed_at: row.try_get::<Option<DateTime<Utc>>, _>(completed_col)?,
    })
}

fn decode_run(row: &PgRow) -> std::result::Result<PipelineRun, sqlx::Error> {
    let trigger_label: String = row.try_get("triggered_by")?;
    let trigger = RunTrigger::parse(&trigger_label).unwrap_or_else(|| {
        warn!(label = %trigger_label, "unknown run trigger label in store");
        RunTrigger::Manual
    });

    let status_label: String = row.try_get("status")?;
    let status = PipelineStatus::parse(&status_label).unwrap_or_else(|| {
        warn!(label = %status_label, "unknown pipeline status label in store");
        PipelineStatus::Pending
    });

    let content_type_label: String = row.try_get("content_type")?;

    let Json(metadata_value) = row.try_get::<Json<serde_json::Value>, _>("metadata")?;
    let metadata: RunMetadata = serde_json::from_value(metadata_value).unwrap_or_default();

    Ok(PipelineRun {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        trigger,
        content_title: row.try_get("content_title")?,
        content_type: ContentType::parse(&content_type_label),
        status,
        vpn: decode_stage(row, Stage::Vpn)?,
        torrent: decode_stage(row, Stage::Torrent)?,
        metadata_stage: decode_stage(row, Stage::Metadata)?,
        subtitle: decode_stage(row, Stage::Subtitle)?,
        encoding: decode_stage(row, Stage::Encoding)?,
        publishing: decode_stage(row, Stage::Publishing)?,
        metadata,
        torrent_download_id: row.try_get("torrent_download_id")?,
        encoding_job_id: row.try_get("encoding_job_id")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}
