// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local durable store: mutation queue, per-table cache, dead letters.
//!
//! Everything the engine must remember across restarts lives in one SQLite
//! database opened once per process:
//!
//! - `sync_queue`: mutations not yet confirmed by the backend, replayed in
//!   `id` order (FIFO). Indexed by `(status, id)` and `created_at`.
//! - `cached_data`: one last-known-good row set per remote table.
//! - `dead_letters`: entries abandoned after exhausting their retry budget.
//!
//! # Durability
//!
//! Unlike a debounced cursor, a queued mutation is user data: `enqueue()`
//! only returns after the row is committed. Every public method is a single
//! statement or a single short transaction, so a crash between `enqueue()`
//! and `remove()` leaves the entry in the queue (it will be replayed, which
//! is why remote delivery is at-least-once, not exactly-once).
//!
//! ```text
//! enqueue(op) → commit → replay → backend confirms → remove(id)
//!                                 (crash here = replay again)
//! ```
//!
//! # Schema Version
//!
//! The schema version lives in `PRAGMA user_version`. Opening a database
//! written by a newer version of this crate fails with a config error
//! instead of guessing at its layout.
//!
//! # SQLite Busy Handling
//!
//! SQLITE_BUSY/SQLITE_LOCKED are retried with capped exponential backoff.

use crate::config::StoreConfig;
use crate::error::{Result, SyncError};
use crate::metrics;
use crate::model::{
    CacheEntry, DeadLetter, EntryStatus, Operation, OperationKind, QueueEntry,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Current on-disk schema version.
pub const SCHEMA_VERSION: i64 = 1;

/// Configuration for SQLite busy retry behavior
const SQLITE_RETRY_MAX_ATTEMPTS: u32 = 5;
const SQLITE_RETRY_BASE_DELAY_MS: u64 = 10;
const SQLITE_RETRY_MAX_DELAY_MS: u64 = 500;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS sync_queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL CHECK (kind IN ('insert', 'update', 'delete')),
        table_name TEXT NOT NULL,
        payload TEXT,
        target_id TEXT,
        status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'error')),
        retries INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        last_attempt INTEGER,
        last_error TEXT,
        CHECK (kind = 'insert' OR target_id IS NOT NULL)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_sync_queue_status ON sync_queue (status, id)",
    "CREATE INDEX IF NOT EXISTS idx_sync_queue_created ON sync_queue (created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS cached_data (
        table_name TEXT PRIMARY KEY,
        rows TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS dead_letters (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        queue_id INTEGER NOT NULL,
        kind TEXT NOT NULL,
        table_name TEXT NOT NULL,
        payload TEXT,
        target_id TEXT,
        retries INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        abandoned_at INTEGER NOT NULL,
        reason TEXT NOT NULL
    )
    "#,
];

const QUEUE_COLUMNS: &str =
    "id, kind, table_name, payload, target_id, status, retries, created_at, last_attempt, last_error";

/// Check if an error is a retryable SQLite busy/locked error
fn is_sqlite_busy_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            // SQLite error codes: SQLITE_BUSY = 5, SQLITE_LOCKED = 6
            if let Some(code) = db_err.code() {
                return code == "5" || code == "6";
            }
            let msg = db_err.message().to_lowercase();
            msg.contains("database is locked") || msg.contains("database is busy")
        }
        _ => false,
    }
}

/// Execute a database operation with retry on SQLITE_BUSY/SQLITE_LOCKED
async fn execute_with_retry<F, Fut, T>(
    operation_name: &str,
    mut f: F,
) -> std::result::Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempts = 0;
    let mut delay_ms = SQLITE_RETRY_BASE_DELAY_MS;

    loop {
        attempts += 1;
        match f().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(
                        operation = operation_name,
                        attempts, "SQLite operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if is_sqlite_busy_error(&e) && attempts < SQLITE_RETRY_MAX_ATTEMPTS => {
                warn!(
                    operation = operation_name,
                    attempts,
                    max_attempts = SQLITE_RETRY_MAX_ATTEMPTS,
                    delay_ms,
                    "SQLite busy, retrying"
                );
                metrics::store_retries_total(operation_name);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(SQLITE_RETRY_MAX_DELAY_MS);
            }
            Err(e) => {
                if is_sqlite_busy_error(&e) {
                    warn!(
                        operation = operation_name,
                        attempts, "SQLite busy, max retries exceeded"
                    );
                }
                return Err(e);
            }
        }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| SyncError::Corrupt(format!("timestamp out of range: {}", ms)))
}

fn encode_payload(operation: &Operation) -> Result<Option<String>> {
    operation
        .data()
        .map(serde_json::to_string)
        .transpose()
        .map_err(SyncError::from)
}

fn decode_operation(
    kind: &str,
    table: String,
    payload: Option<String>,
    target_id: Option<String>,
) -> Result<Operation> {
    let kind = OperationKind::from_str(kind).map_err(SyncError::Corrupt)?;
    let data = payload
        .as_deref()
        .map(serde_json::from_str::<Value>)
        .transpose()?;
    Operation::from_parts(kind, table, data, target_id).map_err(SyncError::Corrupt)
}

#[derive(sqlx::FromRow)]
struct QueueRow {
    id: i64,
    kind: String,
    table_name: String,
    payload: Option<String>,
    target_id: Option<String>,
    status: String,
    retries: i64,
    created_at: i64,
    last_attempt: Option<i64>,
    last_error: Option<String>,
}

impl TryFrom<QueueRow> for QueueEntry {
    type Error = SyncError;

    fn try_from(row: QueueRow) -> Result<Self> {
        Ok(QueueEntry {
            id: row.id,
            operation: decode_operation(&row.kind, row.table_name, row.payload, row.target_id)?,
            status: EntryStatus::from_str(&row.status).map_err(SyncError::Corrupt)?,
            retries: row.retries.max(0) as u32,
            created_at: from_millis(row.created_at)?,
            last_attempt: row.last_attempt.map(from_millis).transpose()?,
            last_error: row.last_error,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DeadLetterRow {
    queue_id: i64,
    kind: String,
    table_name: String,
    payload: Option<String>,
    target_id: Option<String>,
    retries: i64,
    created_at: i64,
    abandoned_at: i64,
    reason: String,
}

impl TryFrom<DeadLetterRow> for DeadLetter {
    type Error = SyncError;

    fn try_from(row: DeadLetterRow) -> Result<Self> {
        Ok(DeadLetter {
            queue_id: row.queue_id,
            operation: decode_operation(&row.kind, row.table_name, row.payload, row.target_id)?,
            retries: row.retries.max(0) as u32,
            created_at: from_millis(row.created_at)?,
            abandoned_at: from_millis(row.abandoned_at)?,
            reason: row.reason,
        })
    }
}

/// Persistent queue and cache backed by SQLite.
pub struct LocalStore {
    /// SQLite connection pool
    pool: SqlitePool,
    /// Path to database file
    path: String,
}

impl LocalStore {
    /// Open (or create) the store described by `config`.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        info!(path = %config.sqlite_path, "Opening local store");

        let pool = if config.is_in_memory() {
            // A second connection would see a different empty database.
            let options = SqliteConnectOptions::new().in_memory(true);
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            let journal = if config.wal_mode {
                SqliteJournalMode::Wal
            } else {
                SqliteJournalMode::Delete
            };
            let options = SqliteConnectOptions::new()
                .filename(&config.sqlite_path)
                .journal_mode(journal)
                .synchronous(SqliteSynchronous::Normal)
                .create_if_missing(true);
            SqlitePoolOptions::new()
                .max_connections(2) // Low concurrency needed
                .connect_with(options)
                .await?
        };

        let store = Self {
            pool,
            path: config.sqlite_path.clone(),
        };
        store.migrate().await?;

        let pending = store.count_pending().await?;
        if pending > 0 {
            info!(pending, "Restored queued operations from previous run");
        }
        metrics::set_pending_count(pending);

        Ok(store)
    }

    /// Open a file-backed store at `path` with default settings.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_string_lossy().to_string();
        Self::open(&StoreConfig::at(path)).await
    }

    async fn migrate(&self) -> Result<()> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;

        if version > SCHEMA_VERSION {
            return Err(SyncError::Config(format!(
                "Local store schema version {} is newer than supported version {}",
                version, SCHEMA_VERSION
            )));
        }

        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        // PRAGMA does not take bind parameters.
        sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if version < SCHEMA_VERSION {
            info!(from = version, to = SCHEMA_VERSION, "Local store schema initialized");
        }
        Ok(())
    }

    // =========================================================================
    // Mutation queue
    // =========================================================================

    /// Append an operation as a `pending` entry with zero retries.
    ///
    /// Returns once the entry is committed.
    pub async fn enqueue(&self, operation: &Operation) -> Result<QueueEntry> {
        let payload = encode_payload(operation)?;
        let kind = operation.kind().as_str();
        let created_at = now_millis();
        let pool = &self.pool;

        let result = execute_with_retry("queue_enqueue", || async {
            sqlx::query(
                r#"
                INSERT INTO sync_queue (kind, table_name, payload, target_id, status, retries, created_at)
                VALUES (?, ?, ?, ?, 'pending', 0, ?)
                "#,
            )
            .bind(kind)
            .bind(&operation.table)
            .bind(&payload)
            .bind(operation.target_id())
            .bind(created_at)
            .execute(pool)
            .await
        })
        .await?;

        let id = result.last_insert_rowid();
        debug!(id, op = %operation.describe(), "Operation queued");
        metrics::record_enqueue(&operation.table, kind);

        Ok(QueueEntry {
            id,
            operation: operation.clone(),
            status: EntryStatus::Pending,
            retries: 0,
            created_at: from_millis(created_at)?,
            last_attempt: None,
            last_error: None,
        })
    }

    /// Entries awaiting replay (`pending` or `error`), oldest first.
    pub async fn list_pending(&self) -> Result<Vec<QueueEntry>> {
        let sql = format!(
            "SELECT {} FROM sync_queue WHERE status IN ('pending', 'error') ORDER BY id ASC",
            QUEUE_COLUMNS
        );
        let rows: Vec<QueueRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let (id, table) = (row.id, row.table_name.clone());
            match QueueEntry::try_from(row) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    // One bad row must not wedge every later drain pass.
                    warn!(id, table = %table, error = %e, "Quarantining undecodable queue entry");
                    if self.abandon(id, &format!("corrupt: {}", e)).await? {
                        metrics::record_abandoned(&table, "corrupt");
                    }
                }
            }
        }
        Ok(entries)
    }

    /// Fetch a single entry.
    pub async fn get(&self, id: i64) -> Result<Option<QueueEntry>> {
        let sql = format!("SELECT {} FROM sync_queue WHERE id = ?", QUEUE_COLUMNS);
        let row: Option<QueueRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(QueueEntry::try_from).transpose()
    }

    /// Delete an entry. Returns `false` if it was already gone.
    pub async fn remove(&self, id: i64) -> Result<bool> {
        let pool = &self.pool;
        let result = execute_with_retry("queue_remove", || async {
            sqlx::query("DELETE FROM sync_queue WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
        })
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a replay attempt: set status, bump `retries`, stamp
    /// `last_attempt` and (if given) `last_error`.
    ///
    /// Returns the new retry count, or `None` if the entry no longer exists.
    pub async fn mark_status(
        &self,
        id: i64,
        status: EntryStatus,
        error: Option<&str>,
    ) -> Result<Option<u32>> {
        let pool = &self.pool;
        let now = now_millis();
        let retries: Option<i64> = execute_with_retry("queue_mark_status", || async {
            sqlx::query_scalar(
                r#"
                UPDATE sync_queue
                SET status = ?,
                    retries = retries + 1,
                    last_attempt = ?,
                    last_error = COALESCE(?, last_error)
                WHERE id = ?
                RETURNING retries
                "#,
            )
            .bind(status.as_str())
            .bind(now)
            .bind(error)
            .bind(id)
            .fetch_optional(pool)
            .await
        })
        .await?;
        Ok(retries.map(|r| r.max(0) as u32))
    }

    /// Number of entries awaiting replay.
    pub async fn count_pending(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sync_queue WHERE status IN ('pending', 'error')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    // =========================================================================
    // Dead letters
    // =========================================================================

    /// Move an entry from the queue to `dead_letters` in one transaction.
    ///
    /// Returns `false` if the entry no longer exists.
    pub async fn abandon(&self, id: i64, reason: &str) -> Result<bool> {
        let pool = &self.pool;
        let now = now_millis();
        let moved = execute_with_retry("queue_abandon", || async {
            let mut tx = pool.begin().await?;
            sqlx::query(
                r#"
                INSERT INTO dead_letters
                    (queue_id, kind, table_name, payload, target_id, retries, created_at, abandoned_at, reason)
                SELECT id, kind, table_name, payload, target_id, retries, created_at, ?, ?
                FROM sync_queue WHERE id = ?
                "#,
            )
            .bind(now)
            .bind(reason)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            let deleted = sqlx::query("DELETE FROM sync_queue WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(deleted.rows_affected() > 0)
        })
        .await?;
        Ok(moved)
    }

    /// Abandoned entries, oldest first.
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let rows: Vec<DeadLetterRow> = sqlx::query_as(
            r#"
            SELECT queue_id, kind, table_name, payload, target_id, retries, created_at, abandoned_at, reason
            FROM dead_letters ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let queue_id = row.queue_id;
                DeadLetter::try_from(row)
                    .map_err(|e| warn!(queue_id, error = %e, "Skipping undecodable dead letter"))
                    .ok()
            })
            .collect())
    }

    /// Forget all abandoned entries. Returns how many were removed.
    pub async fn clear_dead_letters(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM dead_letters")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Table cache
    // =========================================================================

    /// Overwrite the snapshot for `table`.
    pub async fn cache_put(&self, table: &str, rows: &[Value]) -> Result<()> {
        let encoded = serde_json::to_string(rows)?;
        let now = now_millis();
        let pool = &self.pool;

        execute_with_retry("cache_put", || async {
            sqlx::query(
                r#"
                INSERT INTO cached_data (table_name, rows, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(table_name) DO UPDATE SET
                    rows = excluded.rows,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(table)
            .bind(&encoded)
            .bind(now)
            .execute(pool)
            .await
        })
        .await?;

        debug!(table, rows = rows.len(), "Cached table data");
        metrics::record_cache_write(table, rows.len());
        Ok(())
    }

    /// Read the snapshot for `table`.
    ///
    /// A snapshot that no longer decodes is evicted and reported as a miss.
    pub async fn cache_get(&self, table: &str) -> Result<Option<CacheEntry>> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT rows, updated_at FROM cached_data WHERE table_name = ?")
                .bind(table)
                .fetch_optional(&self.pool)
                .await?;

        let Some((encoded, updated_at)) = row else {
            metrics::record_cache_read(table, false);
            return Ok(None);
        };

        match serde_json::from_str::<Vec<Value>>(&encoded) {
            Ok(rows) => {
                metrics::record_cache_read(table, true);
                Ok(Some(CacheEntry {
                    table: table.to_string(),
                    rows,
                    updated_at: from_millis(updated_at)?,
                }))
            }
            Err(e) => {
                warn!(table, error = %e, "Discarding undecodable cache entry");
                self.cache_evict(table).await?;
                metrics::record_cache_read(table, false);
                Ok(None)
            }
        }
    }

    /// Drop the snapshot for `table`. Returns `false` if there was none.
    pub async fn cache_evict(&self, table: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cached_data WHERE table_name = ?")
            .bind(table)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Get database path (for diagnostics).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Force flush WAL to main database (for clean shutdown).
    pub async fn checkpoint(&self) -> Result<()> {
        let pool = &self.pool;

        execute_with_retry("store_checkpoint", || async {
            sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
                .execute(pool)
                .await
        })
        .await?;

        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Checkpoint WAL and close the connection pool.
    pub async fn close(&self) {
        if let Err(e) = self.checkpoint().await {
            warn!(error = %e, "Failed to checkpoint WAL on close");
        }
        self.pool.close().await;
        info!("Local store closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    async fn temp_store(name: &str) -> (tempfile::TempDir, LocalStore) {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path().join(name)).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_enqueue_assigns_increasing_ids() {
        let (_dir, store) = temp_store("ids.db").await;

        let a = store
            .enqueue(&Operation::insert("expenses", json!({ "amount": 100 })))
            .await
            .unwrap();
        let b = store.enqueue(&Operation::delete("expenses", "9")).await.unwrap();

        assert!(b.id > a.id);
        assert_eq!(a.status, EntryStatus::Pending);
        assert_eq!(a.retries, 0);
        assert_eq!(store.count_pending().await.unwrap(), 2);

        store.close().await;
    }

    #[tokio::test]
    async fn test_list_pending_is_fifo() {
        let (_dir, store) = temp_store("fifo.db").await;

        for i in 0..5 {
            store
                .enqueue(&Operation::update("debts", "1", json!({ "step": i })))
                .await
                .unwrap();
        }

        let pending = store.list_pending().await.unwrap();
        let steps: Vec<i64> = pending
            .iter()
            .map(|e| e.operation.data().unwrap()["step"].as_i64().unwrap())
            .collect();
        assert_eq!(steps, vec![0, 1, 2, 3, 4]);

        store.close().await;
    }

    #[tokio::test]
    async fn test_queue_survives_restart() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("restart.db");

        let id = {
            let store = LocalStore::new(&db_path).await.unwrap();
            let entry = store
                .enqueue(&Operation::insert("incomes", json!({ "amount": 2500 })))
                .await
                .unwrap();
            store.close().await;
            entry.id
        };

        {
            let store = LocalStore::new(&db_path).await.unwrap();
            let pending = store.list_pending().await.unwrap();
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].id, id);
            assert_eq!(pending[0].status, EntryStatus::Pending);
            assert_eq!(pending[0].operation.table, "incomes");
            store.close().await;
        }
    }

    #[tokio::test]
    async fn test_mark_status_increments_retries() {
        let (_dir, store) = temp_store("mark.db").await;
        let entry = store.enqueue(&Operation::delete("debts", "3")).await.unwrap();

        let retries = store
            .mark_status(entry.id, EntryStatus::Error, Some("violates foreign key"))
            .await
            .unwrap();
        assert_eq!(retries, Some(1));

        let retries = store
            .mark_status(entry.id, EntryStatus::Error, None)
            .await
            .unwrap();
        assert_eq!(retries, Some(2));

        let stored = store.get(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EntryStatus::Error);
        assert_eq!(stored.retries, 2);
        assert!(stored.last_attempt.is_some());
        // Error message kept when the next attempt has none
        assert_eq!(stored.last_error.as_deref(), Some("violates foreign key"));

        // Errored entries are still replayable
        assert_eq!(store.list_pending().await.unwrap().len(), 1);
        assert_eq!(store.count_pending().await.unwrap(), 1);

        store.close().await;
    }

    #[tokio::test]
    async fn test_mark_status_missing_entry() {
        let (_dir, store) = temp_store("missing.db").await;
        let retries = store
            .mark_status(999, EntryStatus::Error, Some("x"))
            .await
            .unwrap();
        assert!(retries.is_none());
        store.close().await;
    }

    #[tokio::test]
    async fn test_remove() {
        let (_dir, store) = temp_store("remove.db").await;
        let entry = store
            .enqueue(&Operation::insert("expenses", json!({})))
            .await
            .unwrap();

        assert!(store.remove(entry.id).await.unwrap());
        assert!(!store.remove(entry.id).await.unwrap());
        assert_eq!(store.count_pending().await.unwrap(), 0);

        store.close().await;
    }

    #[tokio::test]
    async fn test_abandon_moves_to_dead_letters() {
        let (_dir, store) = temp_store("abandon.db").await;
        let entry = store
            .enqueue(&Operation::update("debts", "8", json!({ "amount": -1 })))
            .await
            .unwrap();
        store
            .mark_status(entry.id, EntryStatus::Error, Some("check constraint"))
            .await
            .unwrap();

        assert!(store.abandon(entry.id, "retry budget exhausted").await.unwrap());
        assert!(store.get(entry.id).await.unwrap().is_none());
        assert_eq!(store.count_pending().await.unwrap(), 0);

        let dead = store.dead_letters().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].queue_id, entry.id);
        assert_eq!(dead[0].retries, 1);
        assert_eq!(dead[0].operation, entry.operation);
        assert_eq!(dead[0].reason, "retry budget exhausted");

        // Already gone
        assert!(!store.abandon(entry.id, "again").await.unwrap());
        assert_eq!(store.dead_letters().await.unwrap().len(), 1);

        assert_eq!(store.clear_dead_letters().await.unwrap(), 1);
        assert!(store.dead_letters().await.unwrap().is_empty());

        store.close().await;
    }

    #[tokio::test]
    async fn test_cache_put_get_overwrite() {
        let (_dir, store) = temp_store("cache.db").await;

        assert!(store.cache_get("expenses").await.unwrap().is_none());

        let rows = vec![json!({ "id": 1, "amount": 10 }), json!({ "id": 2, "amount": 20 })];
        store.cache_put("expenses", &rows).await.unwrap();
        let cached = store.cache_get("expenses").await.unwrap().unwrap();
        assert_eq!(cached.rows, rows);
        assert_eq!(cached.table, "expenses");

        let newer = vec![json!({ "id": 3 })];
        store.cache_put("expenses", &newer).await.unwrap();
        assert_eq!(store.cache_get("expenses").await.unwrap().unwrap().rows, newer);

        // Other tables unaffected
        assert!(store.cache_get("incomes").await.unwrap().is_none());

        assert!(store.cache_evict("expenses").await.unwrap());
        assert!(store.cache_get("expenses").await.unwrap().is_none());

        store.close().await;
    }

    #[tokio::test]
    async fn test_undecodable_cache_is_a_miss() {
        let (_dir, store) = temp_store("corrupt_cache.db").await;
        sqlx::query("INSERT INTO cached_data (table_name, rows, updated_at) VALUES ('debts', '{oops', 0)")
            .execute(&store.pool)
            .await
            .unwrap();

        assert!(store.cache_get("debts").await.unwrap().is_none());
        // And it was evicted
        assert!(!store.cache_evict("debts").await.unwrap());

        store.close().await;
    }

    #[tokio::test]
    async fn test_undecodable_queue_entry_is_quarantined() {
        let (_dir, store) = temp_store("corrupt_queue.db").await;
        let good = store
            .enqueue(&Operation::insert("expenses", json!({ "amount": 7 })))
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO sync_queue (kind, table_name, payload, status, retries, created_at) VALUES ('insert', 'expenses', '{oops', 'pending', 0, 0)",
        )
        .execute(&store.pool)
        .await
        .unwrap();
        assert_eq!(store.count_pending().await.unwrap(), 2);

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, good.id);
        assert_eq!(store.count_pending().await.unwrap(), 1);

        let reason: String = sqlx::query_scalar("SELECT reason FROM dead_letters")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert!(reason.starts_with("corrupt"));
        // Listing dead letters skips what cannot be decoded
        assert!(store.dead_letters().await.unwrap().is_empty());

        // Later passes are unaffected
        assert_eq!(store.list_pending().await.unwrap().len(), 1);

        store.close().await;
    }

    #[tokio::test]
    async fn test_check_constraint_rejects_update_without_target() {
        let (_dir, store) = temp_store("constraint.db").await;
        let result = sqlx::query(
            "INSERT INTO sync_queue (kind, table_name, status, retries, created_at) VALUES ('update', 'debts', 'pending', 0, 0)",
        )
        .execute(&store.pool)
        .await;
        assert!(result.is_err());

        let result = sqlx::query(
            "INSERT INTO sync_queue (kind, table_name, status, retries, created_at) VALUES ('upsert', 'debts', 'pending', 0, 0)",
        )
        .execute(&store.pool)
        .await;
        assert!(result.is_err());

        store.close().await;
    }

    #[tokio::test]
    async fn test_newer_schema_rejected() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("newer.db");
        {
            let store = LocalStore::new(&db_path).await.unwrap();
            sqlx::query("PRAGMA user_version = 99")
                .execute(&store.pool)
                .await
                .unwrap();
            store.close().await;
        }

        let result = LocalStore::new(&db_path).await;
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = LocalStore::open(&StoreConfig::in_memory()).await.unwrap();
        store
            .enqueue(&Operation::insert("expenses", json!({ "amount": 1 })))
            .await
            .unwrap();
        assert_eq!(store.list_pending().await.unwrap().len(), 1);
        assert_eq!(store.path(), ":memory:");
        store.close().await;
    }

    #[tokio::test]
    async fn test_execute_with_retry_succeeds_immediately() {
        let mut attempt_count = 0;

        let result: std::result::Result<i32, sqlx::Error> = execute_with_retry("test_op", || {
            attempt_count += 1;
            async { Ok(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempt_count, 1);
    }

    #[tokio::test]
    async fn test_execute_with_retry_fails_on_non_busy_error() {
        let mut attempt_count = 0;

        let result: std::result::Result<i32, sqlx::Error> = execute_with_retry("test_op", || {
            attempt_count += 1;
            async { Err(sqlx::Error::RowNotFound) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempt_count, 1);
    }

    #[test]
    fn test_is_sqlite_busy_error_pool_timed_out() {
        assert!(!is_sqlite_busy_error(&sqlx::Error::PoolTimedOut));
        assert!(!is_sqlite_busy_error(&sqlx::Error::RowNotFound));
    }
}
