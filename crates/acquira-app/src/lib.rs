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

//! Acquira application wiring.
//!
//! Layout: `bootstrap.rs` (service wiring and task supervision),
//! `trigger.rs` (manual acquisition requests), `error.rs` (boot errors).

pub mod bootstrap;
pub mod error;
pub mod trigger;

pub use bootstrap::run_app;
pub use error::{AppError, AppResult};
pub use trigger::{RunRequest, submit_run};
