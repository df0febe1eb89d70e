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

//! RSS ingestion: scheduled feed polling, release fingerprinting with dedup,
//! subscription matching, and rule-driven acquisition triggering.

pub mod checker;
pub mod decision;
pub mod fetch;
pub mod scheduler;

pub use checker::{CheckOutcome, FeedChecker};
pub use decision::{ItemDecision, decide};
pub use fetch::{FeedFetcher, FetchError, FetchedItem, HttpFeedFetcher};
pub use scheduler::{RssScheduler, SchedulerConfig};
