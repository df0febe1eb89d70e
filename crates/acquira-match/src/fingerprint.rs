//! Title normalization and structured fingerprint extraction.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("year pattern"));

static SEASON_EPISODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bS(\d{1,2})E(\d{1,3})\b").expect("season/episode pattern"));

static RELEASE_GROUP: Lazy<Regex> = Lazy::new(|| {
    // Trailing `-GROUP` or `[GROUP]` convention, ignoring a container suffix.
    Regex::new(r"(?:-([A-Za-z0-9]+)|\[([A-Za-z0-9]+)\])(?:\.\w{2,4})?$").expect("group pattern")
});

/// Quality tokens recognised in release titles, with their aliases.
const QUALITY_TOKENS: [(&str, &[&str]); 5] = [
    ("2160p", &["2160p", "4k"]),
    ("1080p", &["1080p"]),
    ("720p", &["720p"]),
    ("hdr", &["hdr", "hdr10"]),
    ("dolby vision", &["dolby vision", "dolby.vision", "dovi"]),
];

/// Source tags recognised in release titles.
const SOURCE_TOKENS: [(&str, &[&str]); 5] = [
    ("bluray", &["bluray", "blu-ray", "bdrip", "brrip"]),
    ("webdl", &["webdl", "web-dl", "web.dl"]),
    ("webrip", &["webrip", "web-rip"]),
    ("hdtv", &["hdtv"]),
    ("dvd", &["dvdrip", "dvd"]),
];

/// Structured extraction from a raw release title.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Fingerprint {
    /// Normalised content title with release tokens stripped.
    pub title: String,
    /// Release year, when present.
    pub year: Option<i32>,
    /// Season number, when present.
    pub season: Option<i32>,
    /// Episode number, when present.
    pub episode: Option<i32>,
    /// Quality tokens found, in canonical form.
    pub qualities: Vec<String>,
    /// Source tag, when present.
    pub source: Option<String>,
    /// Release group parsed from the title's tail.
    pub release_group: Option<String>,
}

impl Fingerprint {
    /// Whether the fingerprint carries the given canonical quality token.
    #[must_use]
    pub fn has_quality(&self, quality: &str) -> bool {
        let wanted = quality.to_lowercase();
        self.qualities.iter().any(|found| *found == wanted)
    }
}

/// Normalise a title: lowercase, strip non-alphanumerics except whitespace,
/// collapse runs of whitespace.
///
/// Normalisation is idempotent: applying it twice is the same as once.
#[must_use]
pub fn normalize_title(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let mut cleaned = String::with_capacity(lowered.len());
    for ch in lowered.chars() {
        if ch.is_alphanumeric() {
            cleaned.push(ch);
        } else {
            cleaned.push(' ');
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract a structured fingerprint from a raw release title.
#[must_use]
pub fn extract_fingerprint(raw: &str) -> Fingerprint {
    let year = YEAR
        .find(raw)
        .and_then(|found| found.as_str().parse::<i32>().ok());

    let (season, episode) = SEASON_EPISODE.captures(raw).map_or((None, None), |caps| {
        let season = caps.get(1).and_then(|m| m.as_str().parse::<i32>().ok());
        let episode = caps.get(2).and_then(|m| m.as_str().parse::<i32>().ok());
        (season, episode)
    });

    let haystack = raw.to_lowercase().replace(['.', '_'], " ");
    let mut qualities = Vec::new();
    for (canonical, aliases) in QUALITY_TOKENS {
        if aliases.iter().any(|alias| haystack.contains(alias)) {
            qualities.push(canonical.to_string());
        }
    }

    let source = SOURCE_TOKENS.iter().find_map(|(canonical, aliases)| {
        aliases
            .iter()
            .any(|alias| haystack.contains(alias))
            .then(|| (*canonical).to_string())
    });

    let release_group = RELEASE_GROUP.captures(raw.trim()).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
    });

    Fingerprint {
        title: content_title(raw, year, season),
        year,
        season,
        episode,
        qualities,
        source,
        release_group,
    }
}

/// The portion of the raw title naming the content itself: everything before
/// the first year or `SxxEyy` token, normalised.
fn content_title(raw: &str, year: Option<i32>, season: Option<i32>) -> String {
    let mut cut = raw.len();
    if year.is_some()
        && let Some(found) = YEAR.find(raw)
    {
        cut = cut.min(found.start());
    }
    if season.is_some()
        && let Some(found) = SEASON_EPISODE.find(raw)
    {
        cut = cut.min(found.start());
    }
    let head = &raw[..cut];
    let normalized = normalize_title(head);
    if normalized.is_empty() {
        normalize_title(raw)
    } else {
        normalized
    }
}
