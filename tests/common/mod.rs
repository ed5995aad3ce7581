//! Test helpers for pipeline tests.
//!
//! Provides a scripted feed parser and a scripted summarizer so ingestion
//! can run without any network access.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use feedfun::{
    FeedError, FeedParser, FeedSource, Ingestor, ParsedFeed, RawEntry, Result, Store,
    Summarizer, SummaryError,
};

/// Timestamp on the fixed test day (2024-05-01, UTC).
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
}

/// Raw entry with an absolute link and a published time.
pub fn entry(title: &str, link: &str, published: DateTime<Utc>) -> RawEntry {
    RawEntry::new(title, link).with_published(published)
}

/// Open a fresh in-memory store.
pub async fn setup_store() -> Store {
    Store::open_in_memory().await.unwrap()
}

/// Make every later commit that inserted into `kv` fail.
///
/// Inserts are mirrored into a table whose deferred foreign key can never be
/// satisfied, so the violation surfaces only at commit time.
pub async fn fail_commits(store: &Store) {
    for statement in [
        "PRAGMA foreign_keys = ON",
        "CREATE TABLE commit_guard (id INTEGER PRIMARY KEY)",
        "CREATE TABLE commit_shadow (\
             key BLOB REFERENCES commit_guard(id) DEFERRABLE INITIALLY DEFERRED)",
        "CREATE TRIGGER kv_insert_mirror AFTER INSERT ON kv BEGIN \
             INSERT INTO commit_shadow (key) VALUES (NEW.key); END",
    ] {
        sqlx::query(statement).execute(store.pool()).await.unwrap();
    }
}

enum Script {
    Feed { feed: ParsedFeed, delay: Duration },
    Fail(String),
}

/// Feed parser that answers from a fixed script.
///
/// Unknown URLs fail like an unreachable host.
#[derive(Default)]
pub struct ScriptedParser {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `entries` under `title` for `url`.
    pub fn with_feed(self, url: &str, title: &str, entries: Vec<RawEntry>) -> Self {
        self.with_delayed_feed(url, title, entries, Duration::ZERO)
    }

    /// Serve `entries` for `url` after sleeping for `delay`.
    pub fn with_delayed_feed(
        mut self,
        url: &str,
        title: &str,
        entries: Vec<RawEntry>,
        delay: Duration,
    ) -> Self {
        self.scripts.insert(
            url.to_string(),
            Script::Feed {
                feed: ParsedFeed {
                    title: title.to_string(),
                    entries,
                },
                delay,
            },
        );
        self
    }

    /// Fail every fetch of `url` with `message`.
    pub fn with_failure(mut self, url: &str, message: &str) -> Self {
        self.scripts
            .insert(url.to_string(), Script::Fail(message.to_string()));
        self
    }

    /// URLs requested so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl FeedParser for ScriptedParser {
    async fn parse_url(&self, url: &str) -> Result<ParsedFeed> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.scripts.get(url) {
            Some(Script::Feed { feed, delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                Ok(feed.clone())
            }
            Some(Script::Fail(message)) => Err(FeedError::Fetch(message.clone())),
            None => Err(FeedError::Fetch(format!("no route to {url}"))),
        }
    }
}

/// How a [`ScriptedSummarizer`] answers.
#[derive(Debug, Clone, Copy)]
pub enum SummaryBehavior {
    /// Return `summary of <link>`.
    Echo,
    /// Fail with an API error.
    Fail,
    /// Sleep this long before answering.
    Hang(Duration),
}

/// Summarizer that records every call.
pub struct ScriptedSummarizer {
    behavior: SummaryBehavior,
    calls: AtomicUsize,
    links: Mutex<Vec<String>>,
}

impl ScriptedSummarizer {
    pub fn new(behavior: SummaryBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
            links: Mutex::new(Vec::new()),
        })
    }

    /// Number of summarize calls made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Links summarized so far.
    pub fn links(&self) -> Vec<String> {
        self.links.lock().unwrap().clone()
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    async fn summarize(&self, link: &str, _model: &str) -> std::result::Result<String, SummaryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.links.lock().unwrap().push(link.to_string());
        match self.behavior {
            SummaryBehavior::Echo => Ok(format!("summary of {link}")),
            SummaryBehavior::Fail => Err(SummaryError::Api {
                status: 500,
                body: "model not loaded".to_string(),
            }),
            SummaryBehavior::Hang(delay) => {
                tokio::time::sleep(delay).await;
                Ok("too late".to_string())
            }
        }
    }
}

/// Ingestor over a scripted parser, summaries disabled.
pub fn ingestor(parser: Arc<ScriptedParser>) -> Ingestor {
    Ingestor::new(parser)
}

/// Sources for the given URLs, without title overrides.
pub fn sources(urls: &[&str]) -> Vec<FeedSource> {
    urls.iter().map(|url| FeedSource::new(*url)).collect()
}
