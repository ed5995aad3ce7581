//! OPML subscription list loading.

use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, info};

use crate::feed::FeedSource;
use crate::{FeedError, Result};

/// Read the subscription list at `path`.
pub fn load_sources(path: impl AsRef<Path>) -> Result<Vec<FeedSource>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        FeedError::Subscription(format!("failed to read {}: {e}", path.display()))
    })?;

    let sources = parse_opml(&content)?;
    info!("Loaded {} feed source(s) from {:?}", sources.len(), path);
    Ok(sources)
}

/// Parse an OPML document into feed sources.
///
/// Every `outline` with a non-empty `xmlUrl` becomes a source, at any
/// nesting depth and in document order. The `text` attribute (else `title`)
/// is used as the title override.
pub fn parse_opml(xml: &str) -> Result<Vec<FeedSource>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut sources = Vec::new();
    let mut seen_root = false;
    let mut depth = 0usize;

    loop {
        let event = reader.read_event();
        match &event {
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            _ => {}
        }
        match event {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if !seen_root {
                    if e.local_name().as_ref() != b"opml" {
                        return Err(FeedError::Subscription(format!(
                            "expected <opml> root, found <{}>",
                            String::from_utf8_lossy(e.local_name().as_ref())
                        )));
                    }
                    seen_root = true;
                    continue;
                }
                if e.local_name().as_ref() == b"outline" {
                    if let Some(source) = outline_source(&e)? {
                        debug!(url = %source.url, "Found feed outline");
                        sources.push(source);
                    }
                }
            }
            Ok(Event::Eof) if depth > 0 => {
                return Err(FeedError::Subscription(format!(
                    "malformed OPML: document ends with {depth} unclosed element(s)"
                )))
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FeedError::Subscription(format!(
                    "malformed OPML at position {}: {e}",
                    reader.error_position()
                )))
            }
            _ => {}
        }
    }

    if !seen_root {
        return Err(FeedError::Subscription("document has no <opml> root".to_string()));
    }
    if sources.is_empty() {
        return Err(FeedError::Subscription(
            "no feeds found in subscription list".to_string(),
        ));
    }
    Ok(sources)
}

// Outlines without `text` fall back to `title` rather than being skipped.
fn outline_source(e: &BytesStart<'_>) -> Result<Option<FeedSource>> {
    let url = match attribute(e, b"xmlUrl")? {
        Some(url) if !url.trim().is_empty() => url.trim().to_string(),
        _ => return Ok(None),
    };

    let title = match attribute(e, b"text")? {
        Some(text) if !text.is_empty() => Some(text),
        _ => attribute(e, b"title")?.filter(|t| !t.is_empty()),
    };

    let source = FeedSource::new(url);
    Ok(Some(match title {
        Some(title) => source.with_title_override(title),
        None => source,
    }))
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    let attr = e
        .try_get_attribute(name)
        .map_err(|err| FeedError::Subscription(format!("bad outline attribute: {err}")))?;
    match attr {
        Some(attr) => {
            let value = attr
                .unescape_value()
                .map_err(|err| FeedError::Subscription(format!("bad outline attribute: {err}")))?;
            Ok(Some(value.into_owned()))
        }
        None => Ok(None),
    }
}
