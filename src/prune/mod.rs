//! Retention pruning.
//!
//! A prune pass walks the whole store and deletes records published before
//! the retention cutoff. It holds the store's write gate for the whole pass.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::store::Store;
use crate::Result;

/// Outcome of a prune pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    /// Records examined.
    pub scanned: usize,
    /// Records deleted.
    pub deleted: usize,
    /// Expired records whose deletion failed.
    pub failed: usize,
    /// Records whose value could not be decoded; these are kept.
    pub undecodable: usize,
}

#[derive(Deserialize)]
struct PublishedOnly {
    #[serde(alias = "Published")]
    published: DateTime<Utc>,
}

/// The instant `window` before `now`.
///
/// Clamps to the earliest representable time when the window reaches past
/// it, so nothing falls before the cutoff.
pub fn cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Delete every record with `published < now - retention`.
///
/// Per-record failures are logged and counted; the scan always continues.
/// Errors are returned only when the store cannot be read at all.
pub async fn prune(store: &Store, retention: Duration, now: DateTime<Utc>) -> Result<PruneReport> {
    let cutoff = cutoff(now, retention);
    let mut report = PruneReport::default();

    let guard = store.lock_writes().await;
    debug!(cutoff = %cutoff, "Pruning records");

    let mut cursor = store.cursor();
    while let Some((key, value)) = cursor.next().await? {
        report.scanned += 1;

        let published = match serde_json::from_slice::<PublishedOnly>(&value) {
            Ok(record) => record.published,
            Err(e) => {
                warn!(key = %String::from_utf8_lossy(&key), error = %e, "Failed to decode record");
                report.undecodable += 1;
                continue;
            }
        };

        if published >= cutoff {
            continue;
        }

        match store.delete(&guard, &key).await {
            Ok(_) => report.deleted += 1,
            Err(e) => {
                warn!(key = %String::from_utf8_lossy(&key), error = %e, "Failed to delete expired record");
                report.failed += 1;
            }
        }
    }
    drop(guard);

    info!(
        scanned = report.scanned,
        deleted = report.deleted,
        failed = report.failed,
        undecodable = report.undecodable,
        "Prune pass finished"
    );
    Ok(report)
}
