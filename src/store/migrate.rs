//! Rewriting legacy `v2` keys into the current layout.

use tracing::{info, warn};

use super::Store;
use crate::feed::{decode_key, Item, KeyLayout, LEGACY_KEY_VERSION};
use crate::Result;

/// Outcome of a key migration.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Legacy records found.
    pub scanned: usize,
    /// Records rewritten under a current key.
    pub migrated: usize,
    /// Legacy records whose current key already existed; the legacy copy was dropped.
    pub merged: usize,
    /// Records left untouched because key or value could not be decoded.
    pub skipped: usize,
}

/// Move every `v2` record to its `v3` key in one atomic batch.
///
/// Values are re-serialized in the current record format. A record whose
/// current key already exists keeps the existing record. Records that cannot
/// be decoded are left in place.
pub async fn migrate_legacy_keys(store: &Store) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();
    let mut batch = store.batch().await?;

    let prefix = format!("{LEGACY_KEY_VERSION}|");
    let legacy = batch.scan_prefix(prefix.as_bytes()).await?;

    for (old_key, value) in legacy {
        report.scanned += 1;

        let decoded = match decode_key(&old_key) {
            Ok(decoded) if decoded.layout == KeyLayout::V2 => decoded,
            Ok(_) => continue,
            Err(e) => {
                warn!(key = %String::from_utf8_lossy(&old_key), error = %e, "Skipping undecodable legacy key");
                report.skipped += 1;
                continue;
            }
        };

        let item: Item = match serde_json::from_slice(&value) {
            Ok(item) => item,
            Err(e) => {
                warn!(key = %String::from_utf8_lossy(&old_key), error = %e, "Skipping undecodable legacy record");
                report.skipped += 1;
                continue;
            }
        };

        let new_key = decoded.to_current();
        if batch.get(new_key.as_bytes()).await?.is_some() {
            report.merged += 1;
        } else {
            let data = serde_json::to_vec(&item)?;
            batch.set(new_key.as_bytes(), &data).await?;
            report.migrated += 1;
        }
        batch.delete(&old_key).await?;
    }

    batch.commit().await?;

    info!(
        scanned = report.scanned,
        migrated = report.migrated,
        merged = report.merged,
        skipped = report.skipped,
        "Legacy key migration finished"
    );
    Ok(report)
}
