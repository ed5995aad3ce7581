//! Feed model for feedfun.
//!
//! Sources, raw entries, normalized items, their storage keys, and the
//! parser that turns a feed URL into entries.

pub mod fetcher;
pub mod key;
pub mod types;

pub use fetcher::{parse_feed, validate_source_url, FeedParser, HttpFeedParser};
pub use key::{decode_key, DecodedKey, KeyLayout, StorageKey, KEY_VERSION, LEGACY_KEY_VERSION};
pub use types::{resolve_link, FeedSource, Item, ParsedFeed, RawEntry};
