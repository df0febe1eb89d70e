//! Acquisition-side records: queue entries, subscriptions, RSS feeds and
//! their items, and download rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Default priority assigned to queued downloads.
pub const DEFAULT_QUEUE_PRIORITY: i32 = 10;

/// A pending entry in the acquisition queue.
///
/// Entries are weak references: the download row is authoritative and the
/// queue entry is disposable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueEntry {
    /// Download the entry refers to.
    pub download_id: Uuid,
    /// Priority; higher pops earlier.
    pub priority: i32,
    /// Insertion time; earlier breaks priority ties.
    pub created_at: DateTime<Utc>,
}

/// Kind of content a subscription watches for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionType {
    /// Episodic television content.
    TvShow,
    /// A film collection.
    MovieCollection,
    /// A music artist's releases.
    Artist,
    /// A podcast's episodes.
    Podcast,
}

impl SubscriptionType {
    /// Render the type as its lowercase storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TvShow => "tv_show",
            Self::MovieCollection => "movie_collection",
            Self::Artist => "artist",
            Self::Podcast => "podcast",
        }
    }

    /// Parse a storage label back into a type.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "tv_show" => Some(Self::TvShow),
            "movie_collection" => Some(Self::MovieCollection),
            "artist" => Some(Self::Artist),
            "podcast" => Some(Self::Podcast),
            _ => None,
        }
    }
}

/// Account-scoped description of wanted content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscription {
    /// Unique identifier.
    pub id: Uuid,
    /// Account scope that owns the subscription.
    pub account_id: Uuid,
    /// Kind of content watched for.
    pub subscription_type: SubscriptionType,
    /// Name matched (case-insensitively, fuzzily) against release titles.
    pub content_name: String,
    /// Quality profile applied to matched acquisitions.
    pub quality_profile_id: Option<Uuid>,
    /// Release year the matcher must see, when set.
    pub year: Option<i32>,
    /// Qualities of which at least one must appear, when non-empty.
    pub qualities: Vec<String>,
    /// Whether the subscription participates in matching.
    pub enabled: bool,
    /// Acquire seasons released after the subscription was created.
    pub include_future_seasons: bool,
    /// Acquire seasons that already exist.
    pub include_existing_seasons: bool,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
}

/// Category of releases a feed carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedType {
    /// Television releases.
    TvShows,
    /// Film releases.
    Movies,
    /// Anime releases.
    Anime,
    /// Music releases.
    Music,
}

impl FeedType {
    /// Render the type as its lowercase storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TvShows => "tv_shows",
            Self::Movies => "movies",
            Self::Anime => "anime",
            Self::Music => "music",
        }
    }

    /// Parse a storage label back into a type.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "tv_shows" => Some(Self::TvShows),
            "movies" => Some(Self::Movies),
            "anime" => Some(Self::Anime),
            "music" => Some(Self::Music),
            _ => None,
        }
    }
}

/// A configured RSS feed with its polling health bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feed {
    /// Unique identifier.
    pub id: Uuid,
    /// Feed URL.
    pub url: String,
    /// Category of releases the feed carries.
    pub feed_type: FeedType,
    /// Whether the scheduler checks this feed.
    pub enabled: bool,
    /// Minutes between checks for this feed.
    pub check_interval_minutes: i32,
    /// When the feed was last checked, successful or not.
    pub last_check_at: Option<DateTime<Utc>>,
    /// When the feed last checked successfully.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Consecutive failed checks since the last success.
    pub consecutive_failures: i32,
    /// Most recent check error.
    pub last_error: Option<String>,
    /// When the feed is next due.
    pub next_check_at: Option<DateTime<Utc>>,
    /// Quality profile applied to acquisitions from this feed.
    pub quality_profile_id: Option<Uuid>,
}

/// Lifecycle of an ingested feed item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeedItemStatus {
    /// Stored but not yet matched.
    #[default]
    Pending,
    /// Matched a subscription and triggered an acquisition.
    Matched,
    /// Considered and rejected, with a recorded reason.
    Rejected,
    /// Acquisition in progress.
    Downloading,
    /// Acquisition completed.
    Completed,
}

impl FeedItemStatus {
    /// Render the status as its lowercase storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Matched => "matched",
            Self::Rejected => "rejected",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
        }
    }

    /// Parse a storage label back into a status.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(Self::Pending),
            "matched" => Some(Self::Matched),
            "rejected" => Some(Self::Rejected),
            "downloading" => Some(Self::Downloading),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// A release announced by a feed, with its parsed fingerprint.
///
/// Items are dedup-keyed by `(feed_id, title)`; ingestion never mutates an
/// existing row for that key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedItem {
    /// Unique identifier.
    pub id: Uuid,
    /// Feed the item came from.
    pub feed_id: Uuid,
    /// Raw release title as announced.
    pub title: String,
    /// Download link as announced.
    pub link: Option<String>,
    /// Publication time as announced.
    pub pub_date: Option<DateTime<Utc>>,
    /// Normalised title extracted from the release name.
    pub parsed_title: String,
    /// Release year extracted from the title.
    pub year: Option<i32>,
    /// Season number extracted from the title.
    pub season: Option<i32>,
    /// Episode number extracted from the title.
    pub episode: Option<i32>,
    /// Quality tokens found in the title.
    pub qualities: Vec<String>,
    /// Source tag (e.g. `bluray`, `webdl`) found in the title.
    pub source: Option<String>,
    /// Release group parsed from the title's tail.
    pub release_group: Option<String>,
    /// Payload size reported by the feed.
    pub size_bytes: Option<i64>,
    /// Seeder count reported by the feed.
    pub seeders: Option<i32>,
    /// Leecher count reported by the feed.
    pub leechers: Option<i32>,
    /// Current ingestion status.
    pub status: FeedItemStatus,
    /// Subscription the item matched, when matched.
    pub matched_subscription_id: Option<Uuid>,
    /// Why the item was rejected, when rejected.
    pub rejection_reason: Option<String>,
    /// When the item was first stored.
    pub created_at: DateTime<Utc>,
}

/// Action a rule takes when its conditions pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RuleAction {
    /// Create a pipeline run and enqueue the acquisition.
    AutoDownload,
    /// Emit an event only.
    Notify,
    /// Drop the item.
    Skip,
}

impl RuleAction {
    /// Render the action as its kebab-case storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AutoDownload => "auto-download",
            Self::Notify => "notify",
            Self::Skip => "skip",
        }
    }

    /// Parse a storage label back into an action.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "auto-download" => Some(Self::AutoDownload),
            "notify" => Some(Self::Notify),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

/// A predicate-driven rule evaluated against matched feed items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadRule {
    /// Unique identifier.
    pub id: Uuid,
    /// Account scope that owns the rule.
    pub account_id: Uuid,
    /// JSON object mapping sample fields to expected values or predicates.
    pub conditions: Value,
    /// Action taken when every condition passes.
    pub action: RuleAction,
    /// Evaluation order; higher runs first.
    pub priority: i32,
    /// Whether the rule participates in evaluation.
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_type_labels_round_trip() {
        for kind in [
            SubscriptionType::TvShow,
            SubscriptionType::MovieCollection,
            SubscriptionType::Artist,
            SubscriptionType::Podcast,
        ] {
            assert_eq!(SubscriptionType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SubscriptionType::parse("magazine"), None);
    }

    #[test]
    fn feed_type_labels_round_trip() {
        for kind in [
            FeedType::TvShows,
            FeedType::Movies,
            FeedType::Anime,
            FeedType::Music,
        ] {
            assert_eq!(FeedType::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn feed_item_status_labels_round_trip() {
        for status in [
            FeedItemStatus::Pending,
            FeedItemStatus::Matched,
            FeedItemStatus::Rejected,
            FeedItemStatus::Downloading,
            FeedItemStatus::Completed,
        ] {
            assert_eq!(FeedItemStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn rule_action_uses_kebab_case_labels() {
        assert_eq!(RuleAction::AutoDownload.as_str(), "auto-download");
        assert_eq!(
            RuleAction::parse("auto-download"),
            Some(RuleAction::AutoDownload)
        );
        assert_eq!(RuleAction::parse("auto_download"), None);
    }
}
