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

//! Domain model for the Acquira acquisition pipeline: pipeline runs and
//! per-stage statuses, the download state machine and its legal transition
//! table, queue entries, subscriptions, feeds, feed items, and rules.

pub mod acquisition;
pub mod download;
pub mod error;
pub mod run;

pub use acquisition::{
    DownloadRule, Feed, FeedItem, FeedItemStatus, FeedType, QueueEntry, RuleAction, Subscription,
    SubscriptionType,
};
pub use download::{Download, DownloadState, StateHistoryEvent};
pub use error::{StateError, StateResult};
pub use run::{
    ContentType, PipelineRun, PipelineStatus, RunMetadata, RunTrigger, Stage, StageProgress,
    StageStatus,
};
