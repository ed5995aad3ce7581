//! Fetch workers: one task per feed source.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::feed::{validate_source_url, FeedParser, FeedSource, Item, ParsedFeed};
use crate::{FeedError, Result};

/// Completion signal sent by every worker exactly once.
#[derive(Debug)]
pub struct WorkerOutcome {
    /// URL of the source the worker handled.
    pub source_url: String,
    /// Number of items emitted, or why the source contributed nothing.
    pub result: Result<usize>,
}

/// Fetch one source and emit its normalized items on `items`.
///
/// An invalid URL fails with [`FeedError::Source`] before any network call.
/// Parser failures are reported as [`FeedError::Fetch`] and emit nothing.
pub async fn fetch_source(
    source: FeedSource,
    parser: Arc<dyn FeedParser>,
    items: mpsc::Sender<Item>,
) -> Result<usize> {
    validate_source_url(&source.url)?;

    let ParsedFeed { title, entries } =
        parser.parse_url(&source.url).await.map_err(|e| match e {
            FeedError::Fetch(_) => e,
            other => FeedError::Fetch(other.to_string()),
        })?;

    let mut emitted = 0;
    for entry in entries {
        let item = Item::from_entry(&source, &title, entry);
        items
            .send(item)
            .await
            .map_err(|_| FeedError::Fetch("item channel closed".to_string()))?;
        emitted += 1;
    }

    Ok(emitted)
}

/// Spawn a worker for `source`.
///
/// The outcome is always delivered on `done`, even if fetching panics, so
/// the coordinator's outstanding count reaches zero. When `permits` is set
/// the worker waits for a permit before fetching.
pub fn spawn_worker(
    source: FeedSource,
    parser: Arc<dyn FeedParser>,
    items: mpsc::Sender<Item>,
    done: mpsc::Sender<WorkerOutcome>,
    permits: Option<Arc<Semaphore>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let source_url = source.url.clone();

        let _permit = match permits {
            Some(semaphore) => semaphore.acquire_owned().await.ok(),
            None => None,
        };

        // `items` moves into the fetch future and is dropped with it, before
        // the outcome is sent.
        let result = AssertUnwindSafe(fetch_source(source, parser, items))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(FeedError::Fetch("worker panicked".to_string())));

        match &result {
            Ok(count) => debug!(source = %source_url, items = count, "Feed fetched"),
            Err(FeedError::Source(e)) => warn!(source = %source_url, error = %e, "Skipping invalid feed source"),
            Err(e) => warn!(source = %source_url, error = %e, "Failed to fetch feed"),
        }

        if done
            .send(WorkerOutcome { source_url, result })
            .await
            .is_err()
        {
            warn!("Completion channel closed before worker finished");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::feed::RawEntry;

    struct OneFeed;

    #[async_trait]
    impl FeedParser for OneFeed {
        async fn parse_url(&self, url: &str) -> Result<ParsedFeed> {
            if url.contains("broken") {
                return Err(FeedError::Fetch("connection refused".to_string()));
            }
            if url.contains("panic") {
                panic!("parser bug");
            }
            Ok(ParsedFeed {
                title: "Reported".to_string(),
                entries: vec![
                    RawEntry::new("a", "/a"),
                    RawEntry::new("b", "https://example.com/b"),
                ],
            })
        }
    }

    #[tokio::test]
    async fn test_fetch_source_emits_items() {
        let (tx, mut rx) = mpsc::channel(8);
        let source = FeedSource::new("https://example.com/feed").with_title_override("Mine");

        let count = fetch_source(source, Arc::new(OneFeed), tx).await.unwrap();
        assert_eq!(count, 2);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.feed_title, "Mine");
        assert_eq!(first.link, "https://example.com/a");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.title, "b");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_source_invalid_url() {
        let (tx, mut rx) = mpsc::channel(8);
        let result = fetch_source(FeedSource::new("not a url"), Arc::new(OneFeed), tx).await;

        assert!(matches!(result, Err(FeedError::Source(_))));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_source_parser_failure() {
        let (tx, mut rx) = mpsc::channel(8);
        let result = fetch_source(
            FeedSource::new("https://broken.example.com/feed"),
            Arc::new(OneFeed),
            tx,
        )
        .await;

        assert!(matches!(result, Err(FeedError::Fetch(_))));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_spawn_worker_reports_panic() {
        let (item_tx, _item_rx) = mpsc::channel(8);
        let (done_tx, mut done_rx) = mpsc::channel(8);

        spawn_worker(
            FeedSource::new("https://panic.example.com/feed"),
            Arc::new(OneFeed),
            item_tx,
            done_tx,
            None,
        )
        .await
        .unwrap();

        let outcome = done_rx.recv().await.unwrap();
        assert_eq!(outcome.source_url, "https://panic.example.com/feed");
        assert!(outcome.result.unwrap_err().to_string().contains("panicked"));
    }

    #[tokio::test]
    async fn test_spawn_worker_with_permits() {
        let (item_tx, mut item_rx) = mpsc::channel(8);
        let (done_tx, mut done_rx) = mpsc::channel(8);
        let permits = Arc::new(Semaphore::new(1));

        spawn_worker(
            FeedSource::new("https://example.com/feed"),
            Arc::new(OneFeed),
            item_tx,
            done_tx,
            Some(Arc::clone(&permits)),
        )
        .await
        .unwrap();

        assert_eq!(done_rx.recv().await.unwrap().result.unwrap(), 2);
        assert!(item_rx.recv().await.is_some());
        assert_eq!(permits.available_permits(), 1);
    }
}
