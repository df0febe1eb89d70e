//! Repository for downloads, including the transactional state machine.
//!
//! State transitions run in a single transaction under a row lock: validate
//! against the legal transition table, update the row, and append exactly one
//! history event. An illegal transition rolls back with no side effects.

use acquira_core::{ContentType, Download, DownloadState, StateHistoryEvent};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row, types::Json};
use uuid::Uuid;

use crate::error::{DataError, Result, query_failed};

const INSERT_DOWNLOAD: &str = r"
    INSERT INTO downloads (
        id, account_id, user_id, content_type, title, magnet_uri,
        quality_profile, show_id, season, episode, tmdb_id
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    RETURNING *
";

const SELECT_DOWNLOAD: &str = r"SELECT * FROM downloads WHERE id = $1";

const SELECT_STATE_FOR_UPDATE: &str = r"
    SELECT state, retry_count, error_message FROM downloads WHERE id = $1 FOR UPDATE
";

const UPDATE_STATE: &str = r"
    UPDATE downloads
    SET state = $2, retry_count = $3, error_message = $4, updated_at = now()
    WHERE id = $1
";

const INSERT_HISTORY: &str = r"
    INSERT INTO download_state_history (download_id, from_state, to_state, metadata)
    VALUES ($1, $2, $3, $4)
";

const SELECT_HISTORY: &str = r"
    SELECT download_id, from_state, to_state, metadata, created_at
    FROM download_state_history
    WHERE download_id = $1
    ORDER BY created_at ASC, id ASC
";

const UPDATE_PROGRESS: &str = r"
    UPDATE downloads SET progress = $2, updated_at = now() WHERE id = $1
";

const UPDATE_TORRENT_ID: &str = r"
    UPDATE downloads SET torrent_id = $2, updated_at = now() WHERE id = $1
";

const UPDATE_ENCODING_JOB_ID: &str = r"
    UPDATE downloads SET encoding_job_id = $2, updated_at = now() WHERE id = $1
";

/// Fields required to create a download.
#[derive(Debug, Clone)]
pub struct NewDownload {
    /// Account scope that owns the download.
    pub account_id: Uuid,
    /// User who initiated the download.
    pub user_id: Uuid,
    /// Kind of content being acquired.
    pub content_type: ContentType,
    /// Display title.
    pub title: String,
    /// Magnet URI when already known.
    pub magnet_uri: Option<String>,
    /// Quality profile label requested by the user.
    pub quality_profile: Option<String>,
    /// Owning show, for episodic content.
    pub show_id: Option<Uuid>,
    /// Season number, for episodic content.
    pub season: Option<i32>,
    /// Episode number, for episodic content.
    pub episode: Option<i32>,
    /// TMDB identifier when resolved.
    pub tmdb_id: Option<i64>,
}

/// Database-backed repository for downloads and their state history.
#[derive(Clone)]
pub struct DownloadStore {
    pool: PgPool,
}

impl DownloadStore {
    pub(crate) const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a download in the `created` state, appending the creation
    /// history event in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert or history append fails.
    pub async fn create(&self, new: NewDownload) -> Result<Download> {
        let id = Uuid::new_v4();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(query_failed("downloads.create.begin"))?;

        let row = sqlx::query(INSERT_DOWNLOAD)
            .bind(id)
            .bind(new.account_id)
            .bind(new.user_id)
            .bind(new.content_type.as_str())
            .bind(&new.title)
            .bind(new.magnet_uri.as_deref())
            .bind(new.quality_profile.as_deref())
            .bind(new.show_id)
            .bind(new.season)
            .bind(new.episode)
            .bind(new.tmdb_id)
            .fetch_one(tx.as_mut())
            .await
            .map_err(query_failed("downloads.create.insert"))?;

        sqlx::query(INSERT_HISTORY)
            .bind(id)
            .bind(Option::<&str>::None)
            .bind(DownloadState::Created.as_str())
            .bind(Json(serde_json::json!({})))
            .execute(tx.as_mut())
            .await
            .map_err(query_failed("downloads.create.history"))?;

        tx.commit()
            .await
            .map_err(query_failed("downloads.create.commit"))?;

        decode_download(&row).map_err(query_failed("downloads.create.decode"))
    }

    /// Fetch a download by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row cannot be decoded.
    pub async fn fetch(&self, id: Uuid) -> Result<Option<Download>> {
        let row = sqlx::query(SELECT_DOWNLOAD)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("downloads.fetch"))?;
        row.map(|row| decode_download(&row))
            .transpose()
            .map_err(query_failed("downloads.fetch.decode"))
    }

    /// Fetch a download that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::NotFound`] when the row is absent.
    pub async fn fetch_required(&self, id: Uuid) -> Result<Download> {
        self.fetch(id)
            .await?
            .ok_or(DataError::NotFound { entity: "download" })
    }

    /// Apply a state transition under a row lock.
    ///
    /// In one transaction: lock the row, validate the transition against the
    /// legal table, update the state, and append the history event. The
    /// `failed -> created` retry path additionally increments `retry_count`
    /// and clears `error_message`; transitions into `failed` record
    /// `error_message`.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::State`] for an illegal transition (rolled back
    /// with no side effects), [`DataError::NotFound`] for a missing row, or
    /// a query error.
    pub async fn transition(
        &self,
        id: Uuid,
        to: DownloadState,
        metadata: serde_json::Value,
        error_message: Option<&str>,
    ) -> Result<Download> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(query_failed("downloads.transition.begin"))?;

        let row = sqlx::query(SELECT_STATE_FOR_UPDATE)
            .bind(id)
            .fetch_optional(tx.as_mut())
            .await
            .map_err(query_failed("downloads.transition.lock"))?
            .ok_or(DataError::NotFound { entity: "download" })?;

        let state_label: String = row
            .try_get("state")
            .map_err(query_failed("downloads.transition.decode"))?;
        let retry_count: i32 = row
            .try_get("retry_count")
            .map_err(query_failed("downloads.transition.decode"))?;
        let current_error: Option<String> = row
            .try_get("error_message")
            .map_err(query_failed("downloads.transition.decode"))?;

        let from = DownloadState::parse(&state_label)?;
        from.validate_transition(to)?;

        let is_retry = from == DownloadState::Failed && to == DownloadState::Created;
        let next_retry_count = if is_retry { retry_count + 1 } else { retry_count };
        let next_error = if is_retry {
            None
        } else if to == DownloadState::Failed {
            error_message.map(ToOwned::to_owned).or(current_error)
        } else {
            current_error
        };

        sqlx::query(UPDATE_STATE)
            .bind(id)
            .bind(to.as_str())
            .bind(next_retry_count)
            .bind(next_error.as_deref())
            .execute(tx.as_mut())
            .await
            .map_err(query_failed("downloads.transition.update"))?;

        sqlx::query(INSERT_HISTORY)
            .bind(id)
            .bind(Some(from.as_str()))
            .bind(to.as_str())
            .bind(Json(metadata))
            .execute(tx.as_mut())
            .await
            .map_err(query_failed("downloads.transition.history"))?;

        tx.commit()
            .await
            .map_err(query_failed("downloads.transition.commit"))?;

        self.fetch_required(id).await
    }

    /// Full state history for a download, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn history(&self, id: Uuid) -> Result<Vec<StateHistoryEvent>> {
        let rows = sqlx::query(SELECT_HISTORY)
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("downloads.history"))?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            events.push(decode_history(&row)?);
        }
        Ok(events)
    }

    /// Update the completion fraction.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_progress(&self, id: Uuid, progress: f64) -> Result<()> {
        sqlx::query(UPDATE_PROGRESS)
            .bind(id)
            .bind(progress.clamp(0.0, 1.0))
            .execute(&self.pool)
            .await
            .map_err(query_failed("downloads.set_progress"))?;
        Ok(())
    }

    /// Persist the torrent manager's identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_torrent_id(&self, id: Uuid, torrent_id: &str) -> Result<()> {
        sqlx::query(UPDATE_TORRENT_ID)
            .bind(id)
            .bind(torrent_id)
            .execute(&self.pool)
            .await
            .map_err(query_failed("downloads.set_torrent_id"))?;
        Ok(())
    }

    /// Persist the media processor's job identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_encoding_job_id(&self, id: Uuid, job_id: &str) -> Result<()> {
        sqlx::query(UPDATE_ENCODING_JOB_ID)
            .bind(id)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(query_failed("downloads.set_encoding_job_id"))?;
        Ok(())
    }
}

fn decode_history(row: &PgRow) -> Result<StateHistoryEvent> {
    let from_label: Option<String> = row
        .try_get("from_state")
        .map_err(query_failed("downloads.history.decode"))?;
    let to_label: String = row
        .try_get("to_state")
        .map_err(query_failed("downloads.history.decode"))?;
    let Json(metadata) = row
        .try_get::<Json<serde_json::Value>, _>("metadata")
        .map_err(query_failed("downloads.history.decode"))?;

    Ok(StateHistoryEvent {
        download_id: row
            .try_get("download_id")
            .map_err(query_failed("downloads.history.decode"))?,
        from_state: from_label
            .map(|label| DownloadState::parse(&label))
            .transpose()?,
        to_state: DownloadState::parse(&to_label)?,
        metadata,
        created_at: row
            .try_get("created_at")
            .map_err(query_failed("downloads.history.decode"))?,
    })
}

fn decode_download(row: &PgRow) -> std::result::Result<Download, sqlx::Error> {
    let state_label: String = row.try_get("state")?;
    let state = DownloadState::parse(&state_label).map_err(|err| {
        sqlx::Error::Decode(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            err.to_string(),
        )))
    })?;
    let content_type_label: String = row.try_get("content_type")?;

    Ok(Download {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        user_id: row.try_get("user_id")?,
        content_type: ContentType::parse(&content_type_label),
        title: row.try_get("title")?,
        state,
        progress: row.try_get("progress")?,
        magnet_uri: row.try_get("magnet_uri")?,
        torrent_id: row.try_get("torrent_id")?,
        encoding_job_id: row.try_get("encoding_job_id")?,
        quality_profile: row.try_get("quality_profile")?,
        retry_count: row.try_get("retry_count")?,
        error_message: row.try_get("error_message")?,
        show_id: row.try_get("show_id")?,
        season: row.try_get("season")?,
        episode: row.try_get("episode")?,
        tmdb_id: row.try_get("tmdb_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
