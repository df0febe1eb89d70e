#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Postgres persistence for the acquisition pipeline.
//!
//! The store is the single source of truth: runs and downloads are written
//! under row locks, history tables are append-only, and crash recovery
//! reduces to re-reading persisted state.

pub mod downloads;
pub mod error;
pub mod feeds;
pub mod queue;
pub mod rules;
pub mod runs;
pub mod subscriptions;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use downloads::{DownloadStore, NewDownload};
pub use error::{DataError, Result};
pub use feeds::{FeedStore, NewFeedItem};
pub use queue::QueueStore;
pub use rules::RuleStore;
pub use runs::{NewPipelineRun, RunStore};
pub use subscriptions::SubscriptionStore;

/// Database-backed store vending per-entity repositories.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connect to the database and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or migrations cannot run.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await
            .map_err(|source| DataError::QueryFailed {
                operation: "store.connect",
                source,
            })?;
        Self::new(pool).await
    }

    /// Wrap an existing pool, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub async fn new(pool: PgPool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|source| DataError::MigrationFailed { source })?;
        Ok(Self { pool })
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Pipeline run repository.
    #[must_use]
    pub fn runs(&self) -> RunStore {
        RunStore::new(self.pool.clone())
    }

    /// Download repository, including the transactional state machine.
    #[must_use]
    pub fn downloads(&self) -> DownloadStore {
        DownloadStore::new(self.pool.clone())
    }

    /// Acquisition queue repository.
    #[must_use]
    pub fn queue(&self) -> QueueStore {
        QueueStore::new(self.pool.clone())
    }

    /// Subscription repository.
    #[must_use]
    pub fn subscriptions(&self) -> SubscriptionStore {
        SubscriptionStore::new(self.pool.clone())
    }

    /// RSS feed and feed item repository.
    #[must_use]
    pub fn feeds(&self) -> FeedStore {
        FeedStore::new(self.pool.clone())
    }

    /// Download rule repository.
    #[must_use]
    pub fn rules(&self) -> RuleStore {
        RuleStore::new(self.pool.clone())
    }
}
