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

//! Typed HTTP clients for the sibling services the acquisition pipeline
//! drives: VPN manager, torrent manager, metadata enrichment, subtitle
//! manager, media processor, and the publishing backend.
//!
//! Every failure is classified as unreachable, HTTP-status, or malformed
//! before it reaches policy code; the classification is the sole input to
//! the orchestrator's skip-vs-fail decisions.

pub mod error;
pub mod gateway;
pub mod http;

pub use error::{ClientError, ClientResult};
pub use gateway::{
    EncodeRequest, JobOutputs, JobStatus, PublishRequest, SiblingGateway, SubtitleTrack,
    TransferStatus, VpnStatus,
};
pub use http::{HttpSiblings, SiblingEndpoints};
