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

//! Release-title fingerprinting and subscription matching.
//!
//! Raw release names (`Dune.2021.1080p.BluRay.x264-GROUP`) are reduced to a
//! structured fingerprint, then compared against subscriptions with a
//! Levenshtein-based fuzzy title match plus exact year and quality criteria.

pub mod criteria;
pub mod fingerprint;
pub mod rules;
pub mod similarity;

pub use criteria::{MatchCriteria, MatchDecision};
pub use fingerprint::{Fingerprint, extract_fingerprint, normalize_title};
pub use rules::{conditions_pass, first_matching_rule};
pub use similarity::{DEFAULT_FUZZY_THRESHOLD, levenshtein, similarity};
