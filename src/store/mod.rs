//! Embedded key-value store for feedfun.
//!
//! Records live in a single SQLite table keyed by [`StorageKey`] bytes.
//! Writes go through a [`Batch`], which wraps one SQLite transaction and
//! holds the store's write gate until it is committed or dropped, so an
//! ingestion run and a prune pass can never interleave.
//!
//! [`StorageKey`]: crate::feed::StorageKey

mod migrate;

pub use migrate::{migrate_legacy_keys, MigrationReport};

use std::collections::VecDeque;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::Result;

/// Rows fetched per cursor page.
pub const DEFAULT_PAGE_SIZE: i64 = 256;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key   BLOB PRIMARY KEY NOT NULL,
    value BLOB NOT NULL
) WITHOUT ROWID
"#;

/// Handle to the key-value store.
///
/// Open it once with [`Store::open`] and pass it explicitly to the ingestion
/// and pruning entry points. Call [`Store::close`] before exiting.
pub struct Store {
    pool: SqlitePool,
    write_gate: Arc<Mutex<()>>,
}

/// Exclusive write access to a [`Store`].
pub struct WriteGuard {
    _guard: OwnedMutexGuard<()>,
}

impl Store {
    /// Open (creating if needed) the store at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening store at {:?}", path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Open a private in-memory store.
    ///
    /// The pool holds exactly one connection that is never recycled, since
    /// each SQLite in-memory connection is its own database.
    pub async fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory store");
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self {
            pool,
            write_gate: Arc::new(Mutex::new(())),
        })
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Look up a committed record.
    pub async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = sqlx::query_scalar::<_, Vec<u8>>("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    /// Number of committed records.
    pub async fn len(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kv")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Wait for exclusive write access.
    pub async fn lock_writes(&self) -> WriteGuard {
        WriteGuard {
            _guard: Arc::clone(&self.write_gate).lock_owned().await,
        }
    }

    /// Delete a record directly, outside any batch.
    ///
    /// Requires the write guard so the deletion cannot land inside an open
    /// batch. Returns whether a record was removed.
    pub async fn delete(&self, _guard: &WriteGuard, key: &[u8]) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Start a write batch, waiting for any other writer to finish first.
    pub async fn batch(&self) -> Result<Batch> {
        let guard = self.lock_writes().await;
        let tx = self.pool.begin().await?;
        Ok(Batch {
            tx,
            staged: 0,
            _guard: guard,
        })
    }

    /// Iterate over every committed record in key order.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(self, DEFAULT_PAGE_SIZE)
    }

    /// Close the store, waiting for open connections to be released.
    pub async fn close(&self) {
        debug!("Closing store");
        self.pool.close().await;
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish()
    }
}

/// A set of staged writes, committed atomically.
///
/// Reads through the batch see committed records as well as writes staged
/// earlier in the same batch. Dropping the batch without committing
/// discards every staged write.
pub struct Batch {
    tx: Transaction<'static, Sqlite>,
    staged: usize,
    // Declared after `tx` so the transaction is released first.
    _guard: WriteGuard,
}

impl Batch {
    /// Look up a key, including writes staged in this batch.
    pub async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = sqlx::query_scalar::<_, Vec<u8>>("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(value)
    }

    /// Stage a write.
    pub async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&mut *self.tx)
        .await?;
        self.staged += 1;
        Ok(())
    }

    /// Stage a deletion.
    pub async fn delete(&mut self, key: &[u8]) -> Result<()> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&mut *self.tx)
            .await?;
        self.staged += 1;
        Ok(())
    }

    /// Records whose key starts with `prefix`, in key order.
    pub async fn scan_prefix(&mut self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let rows = match prefix_upper_bound(prefix) {
            Some(upper) => {
                sqlx::query_as::<_, (Vec<u8>, Vec<u8>)>(
                    "SELECT key, value FROM kv WHERE key >= ? AND key < ? ORDER BY key",
                )
                .bind(prefix)
                .bind(upper)
                .fetch_all(&mut *self.tx)
                .await?
            }
            None => {
                sqlx::query_as::<_, (Vec<u8>, Vec<u8>)>(
                    "SELECT key, value FROM kv WHERE key >= ? ORDER BY key",
                )
                .bind(prefix)
                .fetch_all(&mut *self.tx)
                .await?
            }
        };
        Ok(rows)
    }

    /// Number of writes staged so far.
    pub fn staged(&self) -> usize {
        self.staged
    }

    /// Commit every staged write as one atomic operation.
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    /// Discard every staged write.
    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Smallest byte string greater than every string starting with `prefix`.
fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < u8::MAX {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}

/// Forward iterator over committed records in key order.
///
/// Rows are fetched a page at a time, resuming after the last key seen, so
/// records may be deleted while the cursor is open.
pub struct Cursor<'a> {
    store: &'a Store,
    page_size: i64,
    last_key: Option<Vec<u8>>,
    buffer: VecDeque<(Vec<u8>, Vec<u8>)>,
    exhausted: bool,
}

impl<'a> Cursor<'a> {
    fn new(store: &'a Store, page_size: i64) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
            last_key: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Use a different page size.
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Next `(key, value)` pair, or `None` at the end of the store.
    pub async fn next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill().await?;
        }
        Ok(self.buffer.pop_front())
    }

    async fn fill(&mut self) -> Result<()> {
        let rows = match &self.last_key {
            Some(after) => {
                sqlx::query_as::<_, (Vec<u8>, Vec<u8>)>(
                    "SELECT key, value FROM kv WHERE key > ? ORDER BY key LIMIT ?",
                )
                .bind(after.as_slice())
                .bind(self.page_size)
                .fetch_all(&self.store.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, (Vec<u8>, Vec<u8>)>(
                    "SELECT key, value FROM kv ORDER BY key LIMIT ?",
                )
                .bind(self.page_size)
                .fetch_all(&self.store.pool)
                .await?
            }
        };

        if (rows.len() as i64) < self.page_size {
            self.exhausted = true;
        }
        if let Some((key, _)) = rows.last() {
            self.last_key = Some(key.clone());
        }
        self.buffer.extend(rows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_store() -> Store {
        Store::open_in_memory().await.unwrap()
    }

    async fn put(store: &Store, key: &[u8], value: &[u8]) {
        let mut batch = store.batch().await.unwrap();
        batch.set(key, value).await.unwrap();
        batch.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_in_memory_is_empty() {
        let store = setup_store().await;
        assert!(store.is_empty().await.unwrap());
        assert_eq!(store.get(b"missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_batch_commit_persists() {
        let store = setup_store().await;
        let mut batch = store.batch().await.unwrap();
        batch.set(b"a", b"1").await.unwrap();
        batch.set(b"b", b"2").await.unwrap();
        assert_eq!(batch.staged(), 2);
        batch.commit().await.unwrap();

        assert_eq!(store.len().await.unwrap(), 2);
        assert_eq!(store.get(b"a").await.unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn test_batch_sees_its_own_writes() {
        let store = setup_store().await;
        put(&store, b"committed", b"x").await;

        let mut batch = store.batch().await.unwrap();
        batch.set(b"staged", b"y").await.unwrap();
        assert_eq!(batch.get(b"staged").await.unwrap(), Some(b"y".to_vec()));
        assert_eq!(batch.get(b"committed").await.unwrap(), Some(b"x".to_vec()));
        assert_eq!(batch.get(b"other").await.unwrap(), None);
        batch.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_batch_discards_writes() {
        let store = setup_store().await;
        {
            let mut batch = store.batch().await.unwrap();
            batch.set(b"a", b"1").await.unwrap();
        }
        assert!(store.is_empty().await.unwrap());

        let mut batch = store.batch().await.unwrap();
        batch.set(b"b", b"2").await.unwrap();
        batch.rollback().await.unwrap();
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_requires_guard() {
        let store = setup_store().await;
        put(&store, b"a", b"1").await;

        let guard = store.lock_writes().await;
        assert!(store.delete(&guard, b"a").await.unwrap());
        assert!(!store.delete(&guard, b"a").await.unwrap());
        drop(guard);

        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_batch_waits_for_write_guard() {
        let store = Arc::new(setup_store().await);
        let guard = store.lock_writes().await;

        let store2 = Arc::clone(&store);
        let pending = tokio::spawn(async move {
            let batch = store2.batch().await.unwrap();
            batch.commit().await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());

        drop(guard);
        pending.await.unwrap();
    }

    #[tokio::test]
    async fn test_cursor_walks_in_key_order_across_pages() {
        let store = setup_store().await;
        let mut batch = store.batch().await.unwrap();
        for i in (0..10u8).rev() {
            batch.set(&[b'k', i], &[i]).await.unwrap();
        }
        batch.commit().await.unwrap();

        let mut cursor = store.cursor().with_page_size(3);
        let mut seen = Vec::new();
        while let Some((key, value)) = cursor.next().await.unwrap() {
            assert_eq!(key[1], value[0]);
            seen.push(value[0]);
        }
        assert_eq!(seen, (0..10u8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_cursor_tolerates_deletes() {
        let store = setup_store().await;
        for key in [b"a", b"b", b"c", b"d"] {
            put(&store, key, b"v").await;
        }

        let guard = store.lock_writes().await;
        let mut cursor = store.cursor().with_page_size(1);
        let mut count = 0;
        while let Some((key, _)) = cursor.next().await.unwrap() {
            store.delete(&guard, &key).await.unwrap();
            count += 1;
        }
        drop(guard);

        assert_eq!(count, 4);
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_prefix() {
        let store = setup_store().await;
        let keys: [&[u8]; 4] = [b"v2|a", b"v2|b", b"v3|a", b"v2"];
        for key in keys {
            put(&store, key, b"v").await;
        }

        let mut batch = store.batch().await.unwrap();
        let keys: Vec<Vec<u8>> = batch
            .scan_prefix(b"v2|")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"v2|a".to_vec(), b"v2|b".to_vec()]);
    }

    #[test]
    fn test_prefix_upper_bound() {
        assert_eq!(prefix_upper_bound(b"v2|"), Some(b"v2}".to_vec()));
        assert_eq!(prefix_upper_bound(&[b'a', 0xff]), Some(vec![b'b']));
        assert_eq!(prefix_upper_bound(&[0xff, 0xff]), None);
    }

    #[tokio::test]
    async fn test_open_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("feeds.db");

        let store = Store::open(&path).await.unwrap();
        put(&store, b"a", b"1").await;
        store.close().await;

        let store = Store::open(&path).await.unwrap();
        assert_eq!(store.get(b"a").await.unwrap(), Some(b"1".to_vec()));
        store.close().await;
    }
}
