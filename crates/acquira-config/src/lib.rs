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

//! Configuration for the Acquira acquisition plugin.
//!
//! Configuration is injected by the host platform through the environment;
//! this crate owns the typed model, the documented defaults, and the
//! validation applied before bootstrap proceeds.

pub mod defaults;
pub mod error;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use model::AppConfig;
