//! Feed fetching and parsing behind a narrow trait so checks can run
//! against canned items in tests.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised while fetching or parsing a feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The feed could not be fetched.
    #[error("failed to fetch feed: {0}")]
    Http(#[from] reqwest::Error),
    /// The response body was not a parsable RSS channel.
    #[error("failed to parse feed: {0}")]
    Parse(#[from] rss::Error),
}

/// A single item announced by a feed, before fingerprinting.
#[derive(Debug, Clone)]
pub struct FetchedItem {
    /// Raw release title.
    pub title: String,
    /// Download link, when announced.
    pub link: Option<String>,
    /// Publication time, when announced and parsable.
    pub pub_date: Option<DateTime<Utc>>,
    /// Payload size, when the feed reports one.
    pub size_bytes: Option<i64>,
}

/// Fetches and parses a feed URL into items.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch the feed and return its items in document order.
    async fn fetch(&self, url: &str) -> Result<Vec<FetchedItem>, FetchError>;
}

/// `reqwest`-backed fetcher parsing RSS 2.0 channels.
#[derive(Clone)]
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    /// Build a fetcher with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<FetchedItem>, FetchError> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let channel = rss::Channel::read_from(&bytes[..])?;
        Ok(channel.items().iter().map(map_item).collect())
    }
}

fn map_item(item: &rss::Item) -> FetchedItem {
    let pub_date = item
        .pub_date()
        .and_then(|raw| DateTime::parse_from_rfc2822(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc));

    let size_bytes = item
        .enclosure()
        .and_then(|enclosure| enclosure.length().parse::<i64>().ok())
        .filter(|length| *length > 0);

    FetchedItem {
        title: item.title().unwrap_or_default().to_string(),
        link: item.link().map(ToString::to_string),
        pub_date,
        size_bytes,
    }
}
