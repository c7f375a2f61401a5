// SQLite-backed durable store

use super::entry::CacheEntry;
use super::CacheStore;
use crate::core::{PreviewError, PreviewResult};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and its schema
    pub fn open<P: AsRef<Path>>(path: P) -> PreviewResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PreviewError::Cache(format!("Failed to create cache directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| PreviewError::Database(format!("Failed to open database: {}", e)))?;
        Self::configure(&conn)?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.create_tables()?;
        Ok(store)
    }

    /// Non-persistent database, used by tests and diagnostics
    pub fn open_in_memory() -> PreviewResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PreviewError::Database(format!("Failed to open database: {}", e)))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.create_tables()?;
        Ok(store)
    }

    fn configure(conn: &Connection) -> PreviewResult<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_millis(10_000))?;
        Ok(())
    }

    fn lock(&self) -> PreviewResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PreviewError::Cache(format!("Lock error: {}", e)))
    }

    fn create_tables(&self) -> PreviewResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                stored_at INTEGER NOT NULL,
                fresh_until INTEGER NOT NULL,
                stale_until INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cache_stale_until ON cache_entries(stale_until);
            "#,
        )
        .map_err(|e| PreviewError::Database(format!("Failed to create tables: {}", e)))?;
        Ok(())
    }
}

fn from_millis(millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(0, millis)
    })
}

impl CacheStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn load(&self, key: &str) -> PreviewResult<Option<CacheEntry>> {
        let conn = self.lock()?;
        let entry = conn
            .query_row(
                "SELECT key, value, stored_at, fresh_until, stale_until
                 FROM cache_entries WHERE key = ?1",
                params![key],
                |row| {
                    Ok(CacheEntry {
                        key: row.get(0)?,
                        value: row.get(1)?,
                        stored_at: from_millis(row.get(2)?)?,
                        fresh_until: from_millis(row.get(3)?)?,
                        stale_until: from_millis(row.get(4)?)?,
                    })
                },
            )
            .optional()
            .map_err(|e| PreviewError::Database(format!("Query failed: {}", e)))?;
        Ok(entry)
    }

    fn save(&self, entry: &CacheEntry) -> PreviewResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO cache_entries (key, value, stored_at, fresh_until, stale_until)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                stored_at = excluded.stored_at,
                fresh_until = excluded.fresh_until,
                stale_until = excluded.stale_until",
            params![
                entry.key,
                entry.value,
                entry.stored_at.timestamp_millis(),
                entry.fresh_until.timestamp_millis(),
                entry.stale_until.timestamp_millis(),
            ],
        )
        .map_err(|e| PreviewError::Database(format!("Insert failed: {}", e)))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> PreviewResult<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
            .map_err(|e| PreviewError::Database(format!("Delete failed: {}", e)))?;
        Ok(deleted > 0)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> PreviewResult<usize> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE stale_until <= ?1",
                params![now.timestamp_millis()],
            )
            .map_err(|e| PreviewError::Database(format!("Cleanup failed: {}", e)))?;
        Ok(deleted)
    }

    fn len(&self) -> PreviewResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM cache_entries", params![], |row| row.get(0))
            .map_err(|e| PreviewError::Database(format!("Query failed: {}", e)))?;
        Ok(count as usize)
    }
}
