use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tracing::{error, info, warn};

use feedfun::{
    digest, migrate_legacy_keys, prune, subscription, summary, Config, DigestState, HttpFeedParser,
    IngestOptions, Ingestor, Refresher, Store, WebServer,
};

/// Fetch feeds from an OPML subscription list and render a digest.
#[derive(Parser)]
#[command(name = "feedfun", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Skip fetching feeds; only render the digest from stored items.
    #[arg(long)]
    no_refresh: bool,

    /// Serve the digest over HTTP and refresh it periodically.
    #[arg(long, conflicts_with_all = ["prune_only", "migrate_keys"])]
    daemon: bool,

    /// Only prune expired items, then exit.
    #[arg(long, conflicts_with = "migrate_keys")]
    prune_only: bool,

    /// Rewrite legacy storage keys into the current layout, then exit.
    #[arg(long)]
    migrate_keys: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load_with_env(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", cli.config.display());
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = feedfun::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        feedfun::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    info!("feedfun {}", env!("CARGO_PKG_VERSION"));

    let store = match Store::open(&config.database.path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = if cli.migrate_keys {
        migrate(&store).await
    } else if cli.prune_only {
        prune_only(&store, &config).await
    } else if cli.daemon {
        daemon(Arc::clone(&store), config).await
    } else {
        one_shot(&store, &config, cli.no_refresh).await
    };

    store.close().await;
    code
}

fn build_ingestor(config: &Config) -> feedfun::Result<Ingestor> {
    let parser = HttpFeedParser::new(&config.feeds)?;
    let summarizer = summary::from_config(&config.summary)?;
    Ok(Ingestor::new(Arc::new(parser))
        .with_summarizer(summarizer)
        .with_options(IngestOptions::from_config(config)))
}

async fn one_shot(store: &Store, config: &Config, no_refresh: bool) -> ExitCode {
    info!("Running in one-shot mode");

    if !no_refresh {
        let ingestor = match build_ingestor(config) {
            Ok(ingestor) => ingestor,
            Err(e) => {
                error!("Failed to set up ingestion: {}", e);
                return ExitCode::FAILURE;
            }
        };

        let sources = match subscription::load_sources(&config.feeds.opml) {
            Ok(sources) => sources,
            Err(e) => {
                error!("Failed to load subscriptions: {}", e);
                return ExitCode::FAILURE;
            }
        };

        match ingestor.run(store, &sources).await {
            Ok(report) if report.committed => {
                for failure in &report.failed_sources {
                    warn!(source = %failure.source_url, error = %failure.error, "Feed contributed no items");
                }
            }
            Ok(_) => {
                error!("Ingestion batch was not committed");
                return ExitCode::FAILURE;
            }
            Err(e) => {
                error!("Failed to ingest feeds: {}", e);
                return ExitCode::FAILURE;
            }
        }

        if let Err(e) = prune(store, config.database.retention(), Utc::now()).await {
            error!("Failed to prune store: {}", e);
        }
    }

    match digest::write_digest(store, &config.digest).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to write digest: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn daemon(store: Arc<Store>, config: Config) -> ExitCode {
    info!("Running in daemon mode");

    let ingestor = match build_ingestor(&config) {
        Ok(ingestor) => ingestor,
        Err(e) => {
            error!("Failed to set up ingestion: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let state = DigestState::shared(config.digest.mode);
    let server = match WebServer::new(&config.daemon, Arc::clone(&state)) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to configure web server: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let refresher = Refresher::new(store, ingestor, config, state);
    let refresh_task = feedfun::updater::start_refresher(refresher);

    let result = server.run().await;
    refresh_task.abort();
    // Wait for the aborted task so it releases its store handle.
    let _ = refresh_task.await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Web server failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn prune_only(store: &Store, config: &Config) -> ExitCode {
    match prune(store, config.database.retention(), Utc::now()).await {
        Ok(report) if report.failed == 0 => ExitCode::SUCCESS,
        Ok(report) => {
            warn!("{} expired record(s) could not be deleted", report.failed);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Failed to prune store: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn migrate(store: &Store) -> ExitCode {
    match migrate_legacy_keys(store).await {
        Ok(report) => {
            info!(
                "Migrated {} legacy record(s), merged {}, skipped {}",
                report.migrated, report.merged, report.skipped
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to migrate keys: {}", e);
            ExitCode::FAILURE
        }
    }
}
