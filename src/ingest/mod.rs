//! Concurrent feed ingestion.
//!
//! [`Ingestor::run`] launches one [`worker`] per source and collects their
//! items into a single write batch that is committed once per run.

pub mod coordinator;
pub mod worker;

pub use coordinator::{IngestOptions, IngestReport, Ingestor, SourceFailure, ITEM_CHANNEL_CAPACITY};
pub use worker::{fetch_source, spawn_worker, WorkerOutcome};
