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

//! The acquisition pipeline itself: the seven-stage orchestrator, the retry
//! planner that computes resume points, and the download worker that drives
//! the state machine from the acquisition queue.
//!
//! All three talk to the store through narrow repository traits so stage
//! policy can be exercised against in-memory doubles.

pub mod orchestrator;
pub mod repo;
pub mod retry;
#[cfg(test)]
mod testing;
pub mod time;
pub mod worker;

pub use orchestrator::{OrchestratorConfig, PipelineOrchestrator};
pub use repo::{AcquisitionQueue, DownloadRepository, RunRepository};
pub use retry::{RetryPlanner, resume_stage};
pub use time::{NoopSleeper, Sleeper, TokioSleeper};
pub use worker::DownloadWorker;
