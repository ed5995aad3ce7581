//! Storage key layout for feed items.
//!
//! Keys identify an item by `(source_url, feed_title, link, published)`:
//!
//! ```text
//! v3|<source_url>|<feed_title>|<link>|<published>
//! ```
//!
//! `|` separates fields. Inside a field `\` is written as `\\` and `|` as
//! `\|`, so a separator always means a field boundary and two items that
//! differ in any identity field never share a key. `published` is RFC 3339
//! in UTC with a `Z` suffix.
//!
//! Stores written before escaping was introduced use the `v2` layout: the
//! same fields joined with a bare `|`. Such keys are still decodable (when
//! they split into exactly five parts) and can be rewritten with
//! [`crate::store::migrate_legacy_keys`].

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::feed::types::Item;
use crate::{FeedError, Result};

/// Field separator.
pub const KEY_SEPARATOR: u8 = b'|';

/// Escape byte used inside fields.
pub const KEY_ESCAPE: u8 = b'\\';

/// Version tag of the current layout.
pub const KEY_VERSION: &str = "v3";

/// Version tag of the unescaped legacy layout.
pub const LEGACY_KEY_VERSION: &str = "v2";

/// Key layout, selected by the version tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLayout {
    /// Unescaped fields.
    V2,
    /// Escaped fields.
    V3,
}

/// An encoded storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey(Vec<u8>);

impl StorageKey {
    /// Encode the identity fields in the current layout.
    pub fn new(source_url: &str, feed_title: &str, link: &str, published: DateTime<Utc>) -> Self {
        let timestamp = format_timestamp(published);
        let mut buf = Vec::with_capacity(
            KEY_VERSION.len() + source_url.len() + feed_title.len() + link.len() + timestamp.len() + 4,
        );
        buf.extend_from_slice(KEY_VERSION.as_bytes());
        for field in [source_url, feed_title, link] {
            buf.push(KEY_SEPARATOR);
            escape_into(&mut buf, field);
        }
        buf.push(KEY_SEPARATOR);
        buf.extend_from_slice(timestamp.as_bytes());
        Self(buf)
    }

    /// Encode the key of an item.
    pub fn for_item(item: &Item) -> Self {
        Self::new(&item.source_url, &item.feed_title, &item.link, item.published)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the key, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for StorageKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Identity fields recovered from a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedKey {
    /// Layout the key was written in.
    pub layout: KeyLayout,
    /// Feed URL.
    pub source_url: String,
    /// Effective feed title.
    pub feed_title: String,
    /// Item link.
    pub link: String,
    /// Publication time.
    pub published: DateTime<Utc>,
}

impl DecodedKey {
    /// Re-encode the fields in the current layout.
    pub fn to_current(&self) -> StorageKey {
        StorageKey::new(&self.source_url, &self.feed_title, &self.link, self.published)
    }
}

/// Decode a key of any known layout.
pub fn decode_key(key: &[u8]) -> Result<DecodedKey> {
    let text = std::str::from_utf8(key)
        .map_err(|_| FeedError::Key("key is not valid UTF-8".to_string()))?;

    let (tag, rest) = text
        .split_once(KEY_SEPARATOR as char)
        .ok_or_else(|| FeedError::Key(format!("missing version tag: {text}")))?;

    let (layout, fields) = match tag {
        KEY_VERSION => (KeyLayout::V3, split_escaped(rest)?),
        LEGACY_KEY_VERSION => (
            KeyLayout::V2,
            rest.split(KEY_SEPARATOR as char).map(str::to_string).collect(),
        ),
        other => return Err(FeedError::Key(format!("unknown key version: {other}"))),
    };

    let [source_url, feed_title, link, published]: [String; 4] = fields
        .try_into()
        .map_err(|parts: Vec<String>| {
            FeedError::Key(format!("expected 4 fields after tag, found {}", parts.len()))
        })?;

    let published = DateTime::parse_from_rfc3339(&published)
        .map_err(|e| FeedError::Key(format!("invalid timestamp {published}: {e}")))?
        .with_timezone(&Utc);

    Ok(DecodedKey {
        layout,
        source_url,
        feed_title,
        link,
        published,
    })
}

/// Canonical timestamp text used in keys.
fn format_timestamp(published: DateTime<Utc>) -> String {
    published.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn escape_into(buf: &mut Vec<u8>, field: &str) {
    for &byte in field.as_bytes() {
        if byte == KEY_SEPARATOR || byte == KEY_ESCAPE {
            buf.push(KEY_ESCAPE);
        }
        buf.push(byte);
    }
}

/// Split on unescaped separators, unescaping each field.
fn split_escaped(s: &str) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(escaped @ ('\\' | '|')) => current.push(escaped),
                Some(other) => {
                    return Err(FeedError::Key(format!("unknown escape sequence \\{other}")))
                }
                None => return Err(FeedError::Key("dangling escape at end of key".to_string())),
            },
            '|' => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    Ok(fields)
}
