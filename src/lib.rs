//! feedfun - feed digest generator
//!
//! Fetches the feeds listed in an OPML file concurrently, stores new items
//! in an embedded key-value store, prunes old ones and renders a digest.

pub mod config;
pub mod digest;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod logging;
pub mod prune;
pub mod store;
pub mod subscription;
pub mod summary;
pub mod updater;
pub mod web;

pub use config::Config;
pub use digest::{build_digest, collect_items, sort_items, write_digest, OutputMode};
pub use error::{FeedError, Result};
pub use feed::{
    decode_key, DecodedKey, FeedParser, FeedSource, HttpFeedParser, Item, KeyLayout, ParsedFeed,
    RawEntry, StorageKey,
};
pub use ingest::{IngestOptions, IngestReport, Ingestor, SourceFailure};
pub use prune::{cutoff, prune, PruneReport};
pub use store::{migrate_legacy_keys, Batch, Cursor, MigrationReport, Store};
pub use subscription::{load_sources, parse_opml};
pub use summary::{DisabledSummarizer, OllamaSummarizer, Summarizer, SummaryError};
pub use updater::{RefreshReport, Refresher};
pub use web::{DigestState, SharedDigest, WebServer};
