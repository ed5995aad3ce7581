//! Background refresher for daemon mode.
//!
//! Each tick runs ingest, prune and render in sequence and publishes the
//! rendered digest for the web server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::digest::{build_digest, write_digest};
use crate::ingest::{IngestReport, Ingestor};
use crate::prune::{prune, PruneReport};
use crate::store::Store;
use crate::subscription::load_sources;
use crate::web::SharedDigest;
use crate::Result;

/// Outcome of one refresh.
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Ingestion report, if ingestion ran.
    pub ingest: Option<IngestReport>,
    /// Prune report, if pruning ran.
    pub prune: Option<PruneReport>,
    /// Whether a new digest was published.
    pub published: bool,
}

/// Periodic ingest, prune and render loop.
pub struct Refresher {
    store: Arc<Store>,
    ingestor: Ingestor,
    config: Config,
    digest: SharedDigest,
    refresh_interval: Duration,
}

impl Refresher {
    /// Create a refresher using the configured refresh interval.
    pub fn new(store: Arc<Store>, ingestor: Ingestor, config: Config, digest: SharedDigest) -> Self {
        let refresh_interval = Duration::from_secs(config.daemon.refresh_interval_secs);
        Self {
            store,
            ingestor,
            config,
            digest,
            refresh_interval,
        }
    }

    /// Override the refresh interval.
    pub fn with_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    /// Run the refresh loop.
    ///
    /// The first refresh starts immediately. A refresh that overruns the
    /// interval delays the next one instead of overlapping it.
    pub async fn run(&self) {
        info!(
            "Refresher started (interval: {} seconds)",
            self.refresh_interval.as_secs()
        );

        let mut timer = interval(self.refresh_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;
            let started = Instant::now();
            let report = self.refresh_once().await;
            info!(
                published = report.published,
                took_ms = started.elapsed().as_millis() as u64,
                "Refreshed feeds"
            );
        }
    }

    /// Run one ingest, prune and render cycle.
    ///
    /// Failures are logged; a failed step does not stop the later ones.
    pub async fn refresh_once(&self) -> RefreshReport {
        let mut report = RefreshReport::default();

        match self.ingest().await {
            Ok(ingest) => report.ingest = Some(ingest),
            Err(e) => error!("Failed to ingest feeds: {}", e),
        }

        match prune(&self.store, self.config.database.retention(), Utc::now()).await {
            Ok(pruned) => report.prune = Some(pruned),
            Err(e) => error!("Failed to prune store: {}", e),
        }

        match self.render().await {
            Ok(digest) => {
                self.digest.publish(digest).await;
                report.published = true;
            }
            Err(e) => error!("Failed to render digest: {}", e),
        }

        report
    }

    async fn ingest(&self) -> Result<IngestReport> {
        let opml = PathBuf::from(&self.config.feeds.opml);
        let sources = load_sources(&opml)?;
        self.ingestor.run(&self.store, &sources).await
    }

    async fn render(&self) -> Result<String> {
        if self.config.digest.output_dir.is_empty() {
            debug!("No digest output directory, rendering in memory only");
            return build_digest(&self.store, &self.config.digest, Utc::now()).await;
        }
        write_digest(&self.store, &self.config.digest).await
    }
}

/// Start the refresher as a background task.
pub fn start_refresher(refresher: Refresher) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        refresher.run().await;
    })
}
