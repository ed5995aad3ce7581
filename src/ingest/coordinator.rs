//! Ingestion coordinator.
//!
//! One run fans out a worker per feed source and funnels every item into a
//! single consumer, which owns the run's write batch. Items are handled one
//! at a time, so the check-then-insert against the batch cannot race.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use super::worker::{spawn_worker, WorkerOutcome};
use crate::config::Config;
use crate::feed::{FeedParser, FeedSource, Item};
use crate::prune::cutoff;
use crate::store::{Batch, Store};
use crate::summary::{DisabledSummarizer, Summarizer, SummaryError};
use crate::{FeedError, Result};

/// Capacity of the item channel between workers and the coordinator.
pub const ITEM_CHANNEL_CAPACITY: usize = 256;

/// Tunables for an ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Model name passed to the summarizer.
    pub summary_model: String,
    /// Upper bound on a single summary call.
    pub summary_timeout: Duration,
    /// Only items published this recently are summarized.
    pub recency_window: chrono::Duration,
    /// Maximum number of sources fetched at once (0 = unbounded).
    pub max_concurrent_fetches: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            summary_model: "phi3:medium".to_string(),
            summary_timeout: Duration::from_secs(60),
            recency_window: chrono::Duration::hours(48),
            max_concurrent_fetches: 0,
        }
    }
}

impl IngestOptions {
    /// Options taken from the `[summary]` and `[feeds]` sections.
    pub fn from_config(config: &Config) -> Self {
        Self {
            summary_model: config.summary.model.clone(),
            summary_timeout: config.summary.timeout(),
            recency_window: config.summary.recency_window(),
            max_concurrent_fetches: config.feeds.max_concurrent_fetches,
        }
    }
}

/// A source that contributed no items, and why.
#[derive(Debug)]
pub struct SourceFailure {
    pub source_url: String,
    pub error: FeedError,
}

/// What happened during one ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Workers launched (one per source).
    pub sources: usize,
    /// Sources that failed validation, fetching or parsing.
    pub failed_sources: Vec<SourceFailure>,
    /// Items received from workers.
    pub received: usize,
    /// New items staged into the batch.
    pub staged: usize,
    /// Items whose key was already present.
    pub duplicates: usize,
    /// Items dropped because of a lookup, serialization or staging error.
    pub skipped: usize,
    /// Staged items that got a summary.
    pub enriched: usize,
    /// Summary calls that failed or timed out.
    pub enrichment_failures: usize,
    /// Whether the batch was committed.
    pub committed: bool,
    /// Commit error, if the commit failed.
    pub commit_error: Option<String>,
}

impl IngestReport {
    /// Number of records actually persisted by this run.
    pub fn persisted(&self) -> usize {
        if self.committed {
            self.staged
        } else {
            0
        }
    }
}

/// Runs ingestion against a store.
pub struct Ingestor {
    parser: Arc<dyn FeedParser>,
    summarizer: Arc<dyn Summarizer>,
    options: IngestOptions,
}

impl Ingestor {
    /// Create an ingestor with summaries disabled and default options.
    pub fn new(parser: Arc<dyn FeedParser>) -> Self {
        Self {
            parser,
            summarizer: Arc::new(DisabledSummarizer),
            options: IngestOptions::default(),
        }
    }

    /// Use the given summarizer for new items.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    /// Replace the run options.
    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    /// Get the run options.
    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Ingest every source into `store` in one atomic batch.
    ///
    /// Fails only if the batch cannot be opened, in which case nothing is
    /// fetched. Source failures and commit failures are recorded in the
    /// report.
    pub async fn run(&self, store: &Store, sources: &[FeedSource]) -> Result<IngestReport> {
        let run_start = Utc::now();
        let mut batch = store.batch().await?;
        let mut report = IngestReport {
            sources: sources.len(),
            ..IngestReport::default()
        };

        info!("Ingesting {} feed source(s)", sources.len());

        let (item_tx, mut item_rx) = mpsc::channel::<Item>(ITEM_CHANNEL_CAPACITY);
        let (done_tx, mut done_rx) = mpsc::channel::<WorkerOutcome>(sources.len().max(1));
        let permits = match self.options.max_concurrent_fetches {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };

        for source in sources {
            spawn_worker(
                source.clone(),
                Arc::clone(&self.parser),
                item_tx.clone(),
                done_tx.clone(),
                permits.clone(),
            );
        }
        // Only workers hold senders from here on.
        drop(item_tx);
        drop(done_tx);

        let mut outstanding = sources.len();
        while outstanding > 0 {
            tokio::select! {
                biased;
                Some(item) = item_rx.recv() => {
                    self.stage(&mut batch, item, run_start, &mut report).await;
                }
                outcome = done_rx.recv() => match outcome {
                    Some(outcome) => {
                        outstanding -= 1;
                        if let Err(error) = outcome.result {
                            report.failed_sources.push(SourceFailure {
                                source_url: outcome.source_url,
                                error,
                            });
                        }
                    }
                    None => {
                        error!(outstanding, "Completion channel closed with workers outstanding");
                        break;
                    }
                },
            }
        }

        // Every worker has finished, so only buffered items remain.
        while let Some(item) = item_rx.recv().await {
            self.stage(&mut batch, item, run_start, &mut report).await;
        }

        match batch.commit().await {
            Ok(()) => report.committed = true,
            Err(e) => {
                error!(error = %e, staged = report.staged, "Failed to commit ingestion batch");
                report.commit_error = Some(e.to_string());
            }
        }

        info!(
            sources = report.sources,
            failed = report.failed_sources.len(),
            received = report.received,
            staged = report.staged,
            duplicates = report.duplicates,
            enriched = report.enriched,
            committed = report.committed,
            "Ingestion run finished"
        );
        Ok(report)
    }

    async fn stage(
        &self,
        batch: &mut Batch,
        mut item: Item,
        run_start: DateTime<Utc>,
        report: &mut IngestReport,
    ) {
        report.received += 1;
        let key = item.storage_key();

        match batch.get(key.as_bytes()).await {
            Ok(Some(_)) => {
                debug!(key = %key, "Duplicate item");
                report.duplicates += 1;
                return;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to look up item");
                report.skipped += 1;
                return;
            }
        }

        if self.should_enrich(&item, run_start) {
            match self.enrich(&item).await {
                Ok(summary) if !summary.is_empty() => {
                    item.summary = Some(summary);
                    report.enriched += 1;
                }
                Ok(_) => debug!(link = %item.link, "Summary service returned nothing"),
                Err(e) => {
                    warn!(link = %item.link, error = %e, "Failed to summarize item");
                    report.enrichment_failures += 1;
                }
            }
        }

        let data = match serde_json::to_vec(&item) {
            Ok(data) => data,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize item");
                report.skipped += 1;
                return;
            }
        };

        match batch.set(key.as_bytes(), &data).await {
            Ok(()) => report.staged += 1,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to stage item");
                report.skipped += 1;
            }
        }
    }

    fn should_enrich(&self, item: &Item, run_start: DateTime<Utc>) -> bool {
        self.summarizer.is_enabled()
            && item.published >= cutoff(run_start, self.options.recency_window)
    }

    async fn enrich(&self, item: &Item) -> std::result::Result<String, SummaryError> {
        let call = self
            .summarizer
            .summarize(&item.link, &self.options.summary_model);
        match tokio::time::timeout(self.options.summary_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SummaryError::Timeout(self.options.summary_timeout.as_secs())),
        }
    }
}
