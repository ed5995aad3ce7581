//! Feed fetching and parsing.
//!
//! [`FeedParser`] is the seam between the ingestion pipeline and the
//! network. [`HttpFeedParser`] downloads a feed with reqwest, enforcing
//! timeouts and a size limit, and parses RSS/Atom/JSON Feed with feed-rs.

use std::time::Duration;

use async_trait::async_trait;
use feed_rs::parser;
use reqwest::Client;
use url::Url;

use crate::config::FeedsConfig;
use crate::feed::types::{ParsedFeed, RawEntry};
use crate::{FeedError, Result};

/// User agent string for feed fetching.
const USER_AGENT: &str = concat!("feedfun/", env!("CARGO_PKG_VERSION"));

/// Turns a feed URL into its title and raw entries.
#[async_trait]
pub trait FeedParser: Send + Sync {
    /// Fetch and parse the feed at `url`.
    async fn parse_url(&self, url: &str) -> Result<ParsedFeed>;
}

/// Feed parser backed by an HTTP client.
pub struct HttpFeedParser {
    client: Client,
    max_feed_size: u64,
}

impl HttpFeedParser {
    /// Create a parser from the feeds configuration.
    pub fn new(config: &FeedsConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.total_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FeedError::Fetch(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_feed_size: config.max_feed_size_bytes,
        })
    }
}

#[async_trait]
impl FeedParser for HttpFeedParser {
    async fn parse_url(&self, url: &str) -> Result<ParsedFeed> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::Fetch(format!("failed to fetch feed: {}", e)))?;

        if !response.status().is_success() {
            return Err(FeedError::Fetch(format!("HTTP error: {}", response.status())));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > self.max_feed_size {
                return Err(FeedError::Fetch(format!(
                    "feed too large: {} bytes (max {} bytes)",
                    content_length, self.max_feed_size
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FeedError::Fetch(format!("failed to read response: {}", e)))?;

        // Content-Length may be absent or wrong
        if bytes.len() as u64 > self.max_feed_size {
            return Err(FeedError::Fetch(format!(
                "feed too large: {} bytes (max {} bytes)",
                bytes.len(),
                self.max_feed_size
            )));
        }

        parse_feed(&bytes, url)
    }
}

/// Check that a feed URL has both a scheme and a host.
pub fn validate_source_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| FeedError::Source(format!("invalid URL {url}: {e}")))?;

    if parsed.scheme().is_empty() {
        return Err(FeedError::Source(format!("URL has no scheme: {url}")));
    }
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(parsed),
        _ => Err(FeedError::Source(format!("URL has no host: {url}"))),
    }
}

/// Parse feed bytes into a [`ParsedFeed`].
///
/// `url` is handed to feed-rs as the base for relative links.
pub fn parse_feed(bytes: &[u8], url: &str) -> Result<ParsedFeed> {
    let feed = parser::Builder::new()
        .base_uri(Some(url))
        .build()
        .parse(bytes)
        .map_err(|e| FeedError::Fetch(format!("failed to parse feed: {}", e)))?;

    let title = feed.title.map(|t| t.content).unwrap_or_default();

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let content = entry
                .content
                .and_then(|c| c.body)
                .or(entry.summary.map(|s| s.content))
                .unwrap_or_default();

            RawEntry {
                title: entry.title.map(|t| t.content).unwrap_or_default(),
                link: entry.links.first().map(|l| l.href.clone()),
                content,
                published: entry.published,
                updated: entry.updated,
            }
        })
        .collect();

    Ok(ParsedFeed { title, entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_validate_source_url_valid() {
        assert!(validate_source_url("https://example.com/feed.xml").is_ok());
        assert!(validate_source_url("http://localhost:8080/rss").is_ok());
    }

    #[test]
    fn test_validate_source_url_missing_scheme() {
        let err = validate_source_url("example.com/feed.xml").unwrap_err();
        assert!(matches!(err, FeedError::Source(_)));
    }

    #[test]
    fn test_validate_source_url_missing_host() {
        let err = validate_source_url("file:///etc/feed.xml").unwrap_err();
        assert!(err.to_string().contains("no host"));

        assert!(validate_source_url("mailto:someone@example.com").is_err());
    }

    #[test]
    fn test_validate_source_url_empty() {
        assert!(validate_source_url("").is_err());
    }

    #[test]
    fn test_parse_feed_rss() {
        let rss = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Feed</title>
    <link>https://example.com</link>
    <description>A test feed</description>
    <item>
      <title>First Article</title>
      <link>https://example.com/1</link>
      <guid>guid-1</guid>
      <description>First body</description>
      <pubDate>Sat, 01 Jun 2024 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Second Article</title>
      <link>https://example.com/2</link>
      <guid>guid-2</guid>
    </item>
  </channel>
</rss>"#;

        let feed = parse_feed(rss.as_bytes(), "https://example.com/rss").unwrap();
        assert_eq!(feed.title, "Test Feed");
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(feed.entries[0].title, "First Article");
        assert_eq!(feed.entries[0].link.as_deref(), Some("https://example.com/1"));
        assert_eq!(feed.entries[0].content, "First body");
        assert_eq!(
            feed.entries[0].published,
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(feed.entries[1].published, None);
    }

    #[test]
    fn test_parse_feed_atom_updated_only() {
        let atom = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Feed</title>
  <id>urn:feed</id>
  <updated>2025-01-01T00:00:00Z</updated>
  <entry>
    <id>urn:uuid:1</id>
    <title>Atom Entry</title>
    <link href="https://example.com/entry"/>
    <content type="html">&lt;p&gt;Body&lt;/p&gt;</content>
    <updated>2025-01-01T00:00:00Z</updated>
  </entry>
</feed>"#;

        let feed = parse_feed(atom.as_bytes(), "https://example.com/atom").unwrap();
        assert_eq!(feed.title, "Atom Feed");
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.entries[0].content, "<p>Body</p>");
        assert_eq!(feed.entries[0].published, None);
        assert!(feed.entries[0].updated.is_some());
    }

    #[test]
    fn test_parse_feed_minimal() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <item>
      <guid>1</guid>
    </item>
  </channel>
</rss>"#;

        let feed = parse_feed(rss.as_bytes(), "https://example.com/rss").unwrap();
        assert_eq!(feed.title, "");
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.entries[0].title, "");
        assert_eq!(feed.entries[0].link, None);
    }

    #[test]
    fn test_parse_feed_invalid() {
        let result = parse_feed(b"This is not XML", "https://example.com/rss");
        assert!(matches!(result, Err(FeedError::Fetch(_))));
    }

    #[test]
    fn test_http_parser_builds_from_config() {
        assert!(HttpFeedParser::new(&FeedsConfig::default()).is_ok());
    }
}
