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

//! Binary entrypoint wiring the Acquira services together.

use acquira_app::AppResult;

/// Boots the Acquira service and blocks until shutdown.
#[tokio::main]
async fn main() -> AppResult<()> {
    acquira_app::run_app().await
}
