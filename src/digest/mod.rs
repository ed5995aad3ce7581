//! Digest output.
//!
//! Reads stored items, keeps the recent ones, orders them newest first and
//! renders them as Markdown or HTML.

mod render;

pub use render::{escape_html, render_html, render_markdown, HEADER_DATE_FORMAT};

use std::path::Path;

use chrono::{DateTime, Local, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::DigestConfig;
use crate::feed::Item;
use crate::prune::cutoff;
use crate::store::Store;
use crate::Result;

/// Digest output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Html,
    Markdown,
}

impl OutputMode {
    /// File name the digest is written to.
    pub fn filename(&self) -> &'static str {
        match self {
            OutputMode::Html => "index.html",
            OutputMode::Markdown => "index.md",
        }
    }

    /// Content type served for this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputMode::Html => "text/html; charset=utf-8",
            OutputMode::Markdown => "text/markdown; charset=utf-8",
        }
    }
}

/// Read every stored item published after `cutoff`.
///
/// Records that do not decode as items are logged and skipped.
pub async fn collect_items(store: &Store, cutoff: Option<DateTime<Utc>>) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    let mut cursor = store.cursor();

    while let Some((key, value)) = cursor.next().await? {
        let item: Item = match serde_json::from_slice(&value) {
            Ok(item) => item,
            Err(e) => {
                warn!(key = %String::from_utf8_lossy(&key), error = %e, "Skipping undecodable record");
                continue;
            }
        };
        if cutoff.map_or(true, |cutoff| item.published > cutoff) {
            items.push(item);
        }
    }

    Ok(items)
}

/// Order items newest first; ties on `published` go by title, descending.
pub fn sort_items(items: &mut [Item]) {
    items.sort_by(|a, b| {
        b.published
            .cmp(&a.published)
            .then_with(|| b.title.cmp(&a.title))
    });
}

/// Collect, sort and render the digest as of `now`.
///
/// A zero `max_age_secs` lists every stored item.
pub async fn build_digest(store: &Store, config: &DigestConfig, now: DateTime<Utc>) -> Result<String> {
    let since = (config.max_age_secs > 0).then(|| cutoff(now, config.max_age()));
    let mut items = collect_items(store, since).await?;
    sort_items(&mut items);

    let rendered = match config.mode {
        OutputMode::Html => render_html(&items, &Local, now.with_timezone(&Local)),
        OutputMode::Markdown => render_markdown(&items, &Local),
    };

    info!("Rendered digest with {} item(s)", items.len());
    Ok(rendered)
}

/// Render the digest and write it into `config.output_dir`.
///
/// Returns the rendered text.
pub async fn write_digest(store: &Store, config: &DigestConfig) -> Result<String> {
    let rendered = build_digest(store, config, Utc::now()).await?;

    let dir = Path::new(&config.output_dir);
    if !dir.as_os_str().is_empty() && !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    let path = dir.join(config.mode.filename());
    tokio::fs::write(&path, rendered.as_bytes()).await?;

    info!("Wrote digest to {:?}", path);
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn item(title: &str, published: DateTime<Utc>) -> Item {
        Item {
            source_url: "https://example.com/feed".to_string(),
            title: title.to_string(),
            feed_title: "Example".to_string(),
            link: format!("https://example.com/{title}"),
            content: String::new(),
            summary: None,
            published,
        }
    }

    async fn store_with(items: &[Item]) -> Store {
        let store = Store::open_in_memory().await.unwrap();
        let mut batch = store.batch().await.unwrap();
        for item in items {
            batch
                .set(
                    item.storage_key().as_bytes(),
                    &serde_json::to_vec(item).unwrap(),
                )
                .await
                .unwrap();
        }
        batch.commit().await.unwrap();
        store
    }

    #[test]
    fn test_output_mode_filename() {
        assert_eq!(OutputMode::Html.filename(), "index.html");
        assert_eq!(OutputMode::Markdown.filename(), "index.md");
        assert_eq!(OutputMode::default(), OutputMode::Html);
    }

    #[test]
    fn test_sort_items_newest_first_with_title_tiebreak() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let mut items = vec![
            item("alpha", t),
            item("older", t - Duration::hours(1)),
            item("beta", t),
        ];

        sort_items(&mut items);
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["beta", "alpha", "older"]);
    }

    #[tokio::test]
    async fn test_collect_items_applies_cutoff() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let store = store_with(&[
            item("recent", now - Duration::hours(1)),
            item("stale", now - Duration::days(5)),
        ])
        .await;

        let all = collect_items(&store, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let recent = collect_items(&store, Some(now - Duration::days(2)))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].title, "recent");
    }

    #[tokio::test]
    async fn test_collect_items_skips_undecodable() {
        let store = store_with(&[item("ok", Utc::now())]).await;
        let mut batch = store.batch().await.unwrap();
        batch.set(b"v3|junk", b"{").await.unwrap();
        batch.commit().await.unwrap();

        let items = collect_items(&store, None).await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn test_build_digest_zero_max_age_lists_everything() {
        let now = Utc::now();
        let store = store_with(&[
            item("new", now - Duration::hours(1)),
            item("ancient", now - Duration::days(400)),
        ])
        .await;
        let config = DigestConfig {
            mode: OutputMode::Markdown,
            max_age_secs: 0,
            ..DigestConfig::default()
        };

        let md = build_digest(&store, &config, now).await.unwrap();
        assert!(md.contains("[new]"));
        assert!(md.contains("[ancient]"));
        assert!(md.find("[new]").unwrap() < md.find("[ancient]").unwrap());
    }

    #[tokio::test]
    async fn test_build_digest_huge_max_age_lists_everything() {
        let now = Utc::now();
        let store = store_with(&[item("ancient", now - Duration::days(4000))]).await;
        let config = DigestConfig {
            mode: OutputMode::Markdown,
            max_age_secs: u64::MAX,
            ..DigestConfig::default()
        };

        let md = build_digest(&store, &config, now).await.unwrap();
        assert!(md.contains("[ancient]"));
    }

    #[tokio::test]
    async fn test_write_digest_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&[item("fresh", Utc::now() - Duration::minutes(5))]).await;
        let config = DigestConfig {
            mode: OutputMode::Html,
            output_dir: dir.path().join("out").to_string_lossy().into_owned(),
            ..DigestConfig::default()
        };

        let rendered = write_digest(&store, &config).await.unwrap();
        let written = std::fs::read_to_string(dir.path().join("out").join("index.html")).unwrap();
        assert_eq!(rendered, written);
        assert!(written.contains("fresh"));
    }
}
