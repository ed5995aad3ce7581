//! Feed types for feedfun.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::feed::key::StorageKey;

/// A subscribed feed with an optional display-title override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    /// Feed URL.
    pub url: String,
    /// Title shown instead of the one the feed reports.
    pub title_override: Option<String>,
}

impl FeedSource {
    /// Create a source without a title override.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title_override: None,
        }
    }

    /// Set the title override.
    pub fn with_title_override(mut self, title: impl Into<String>) -> Self {
        self.title_override = Some(title.into());
        self
    }

    /// Resolve the feed title to display for this source.
    ///
    /// A non-empty override wins over the title reported by the feed.
    pub fn effective_title(&self, reported: &str) -> String {
        match self.title_override.as_deref() {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => reported.to_string(),
        }
    }
}

/// One entry as produced by the feed parser, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    /// Entry title.
    pub title: String,
    /// Entry link, possibly relative to the feed URL.
    pub link: Option<String>,
    /// Entry content.
    pub content: String,
    /// When the entry was published.
    pub published: Option<DateTime<Utc>>,
    /// When the entry was last updated.
    pub updated: Option<DateTime<Utc>>,
}

impl RawEntry {
    /// Create an entry with a title and link.
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: Some(link.into()),
            ..Self::default()
        }
    }

    /// Set the content.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Set the published date.
    pub fn with_published(mut self, published: DateTime<Utc>) -> Self {
        self.published = Some(published);
        self
    }

    /// Set the updated date.
    pub fn with_updated(mut self, updated: DateTime<Utc>) -> Self {
        self.updated = Some(updated);
        self
    }
}

/// Parsed feed data from an external source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    /// Title reported by the feed.
    pub title: String,
    /// Entries in document order.
    pub entries: Vec<RawEntry>,
}

/// A normalized feed item, as stored.
///
/// Field aliases accept records written with the older capitalized field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// URL of the feed the item came from.
    #[serde(alias = "FeedURL")]
    pub source_url: String,
    /// Item title.
    #[serde(alias = "Title", default)]
    pub title: String,
    /// Effective feed title (override or reported).
    #[serde(alias = "FeedTitle", default)]
    pub feed_title: String,
    /// Absolute link to the article.
    #[serde(alias = "Link", default)]
    pub link: String,
    /// Item content.
    #[serde(alias = "Content", default)]
    pub content: String,
    /// Generated summary.
    #[serde(
        alias = "Summary",
        default,
        deserialize_with = "deserialize_summary",
        skip_serializing_if = "Option::is_none"
    )]
    pub summary: Option<String>,
    /// Publication time used for ordering and retention.
    #[serde(alias = "Published")]
    pub published: DateTime<Utc>,
}

fn deserialize_summary<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let summary = Option::<String>::deserialize(deserializer)?;
    Ok(summary.filter(|s| !s.is_empty()))
}

impl Item {
    /// Build an item from a raw entry of `source`.
    ///
    /// `published` falls back to `updated` and then to the Unix epoch, so an
    /// undated entry keeps the same key on every run.
    pub fn from_entry(source: &FeedSource, reported_title: &str, entry: RawEntry) -> Self {
        let link = entry
            .link
            .map(|link| resolve_link(&source.url, &link))
            .unwrap_or_default();
        let published = entry
            .published
            .or(entry.updated)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        Self {
            source_url: source.url.clone(),
            title: entry.title,
            feed_title: source.effective_title(reported_title),
            link,
            content: entry.content,
            summary: None,
            published,
        }
    }

    /// Compute the storage key for this item.
    pub fn storage_key(&self) -> StorageKey {
        StorageKey::for_item(self)
    }
}

/// Resolve `link` against the feed URL.
///
/// Absolute links are returned untouched. A link that cannot be resolved
/// is kept as given.
pub fn resolve_link(feed_url: &str, link: &str) -> String {
    if Url::parse(link).is_ok() {
        return link.to_string();
    }
    Url::parse(feed_url)
        .and_then(|base| base.join(link))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| link.to_string())
}
