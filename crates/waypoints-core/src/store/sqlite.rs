//! SQLite-backed key/value medium.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so a reader in another process never sees a torn write
//! - `busy_timeout = 5s` to absorb short lock waits from a second writer
//!
//! Concurrent writers are last-write-wins per bucket document; there is no
//! merge and no version token.

use super::{Bucket, Store, StoreError};
use rusqlite::{Connection, OptionalExtension, params, types::Type};
use std::path::Path;
use std::time::Duration;

/// Busy timeout applied to every connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATION_V1_SQL: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at_ms INTEGER NOT NULL
);
";

const MIGRATIONS: &[(u32, &str)] = &[(1, MIGRATION_V1_SQL)];

/// Key/value store over a single SQLite table.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    capacity_bytes: Option<u64>,
}

impl SqliteStore {
    /// Open (or create) the database file, apply pragmas and migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the file cannot be opened or migrated.
    pub fn open(path: &Path, capacity_bytes: Option<u64>) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("create store directory {}: {e}", parent.display()))
            })?;
        }

        let mut conn = Connection::open(path).map_err(|e| {
            StoreError::Backend(format!("open store database {}: {e}", path.display()))
        })?;
        configure_connection(&conn).map_err(backend)?;
        migrate(&mut conn).map_err(backend)?;

        tracing::debug!(path = %path.display(), "opened sqlite store");
        Ok(Self {
            conn,
            capacity_bytes,
        })
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if SQLite cannot allocate the database.
    pub fn open_in_memory(capacity_bytes: Option<u64>) -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory().map_err(backend)?;
        migrate(&mut conn).map_err(backend)?;
        Ok(Self {
            conn,
            capacity_bytes,
        })
    }

    fn usage_excluding(&self, key: &str) -> Result<u64, StoreError> {
        let total: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(SUM(length(CAST(key AS BLOB)) + length(CAST(value AS BLOB))), 0)
                 FROM kv WHERE key != ?1",
                params![key],
                |row| row.get(0),
            )
            .map_err(backend)?;
        Ok(u64::try_from(total).unwrap_or(0))
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

/// Read `PRAGMA user_version` as a `u32`.
///
/// # Errors
///
/// Returns an error if the pragma cannot be read or is out of range.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

/// Apply all pending migrations in ascending order.
///
/// # Errors
///
/// Returns an error if any migration fails.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let mut current = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", i64::from(*version))?;
        tx.commit()?;
        current = *version;
    }

    Ok(current)
}

fn backend(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn is_disk_full(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _) if inner.code == rusqlite::ErrorCode::DiskFull
    )
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Store for SqliteStore {
    fn get(&self, bucket: Bucket) -> Result<Option<String>, StoreError> {
        self.conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![bucket.key()],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)
    }

    fn set(&self, bucket: Bucket, value: &str) -> Result<(), StoreError> {
        let key = bucket.key();
        let attempted = (key.len() + value.len()) as u64;

        if let Some(capacity) = self.capacity_bytes
            && self.usage_excluding(key)? + attempted > capacity
        {
            return Err(StoreError::CapacityExceeded {
                key,
                attempted_bytes: attempted,
                capacity_bytes: capacity,
            });
        }

        self.conn
            .execute(
                "INSERT INTO kv (key, value, updated_at_ms) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at_ms = excluded.updated_at_ms",
                params![key, value, now_ms()],
            )
            .map_err(|err| {
                if is_disk_full(&err) {
                    StoreError::CapacityExceeded {
                        key,
                        attempted_bytes: attempted,
                        capacity_bytes: self.capacity_bytes.unwrap_or(0),
                    }
                } else {
                    backend(err)
                }
            })?;
        Ok(())
    }

    fn remove(&self, bucket: Bucket) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![bucket.key()])
            .map_err(backend)?;
        Ok(())
    }

    fn usage_bytes(&self) -> Result<u64, StoreError> {
        self.usage_excluding("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_db_path() -> (TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("waypoints.db");
        (dir, path)
    }

    #[test]
    fn open_sets_wal_and_busy_timeout() {
        let (_dir, path) = temp_db_path();
        let store = SqliteStore::open(&path, None).expect("open store");

        let journal_mode: String = store
            .conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("query journal_mode");
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: u64 = store
            .conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("query busy_timeout");
        assert_eq!(
            u128::from(busy_timeout_ms),
            DEFAULT_BUSY_TIMEOUT.as_millis()
        );
    }

    #[test]
    fn migrate_is_idempotent() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        assert_eq!(current_schema_version(&conn)?, LATEST_SCHEMA_VERSION);
        Ok(())
    }

    #[test]
    fn values_survive_reopen() {
        let (_dir, path) = temp_db_path();
        {
            let store = SqliteStore::open(&path, None).expect("open");
            store.set(Bucket::Items, "[1,2]").expect("write");
        }
        let store = SqliteStore::open(&path, None).expect("reopen");
        assert_eq!(store.get(Bucket::Items).expect("read").as_deref(), Some("[1,2]"));
        assert!(store.get(Bucket::Achievements).expect("read").is_none());
    }

    #[test]
    fn capacity_is_enforced_across_buckets() {
        let store = SqliteStore::open_in_memory(Some(64)).expect("open");
        store.set(Bucket::Items, "[]").expect("small write");
        let big = "x".repeat(80);
        let err = store.set(Bucket::Achievements, &big).expect_err("too big");
        assert!(err.is_capacity());
        assert!(store.get(Bucket::Achievements).expect("read").is_none());
    }

    #[test]
    fn remove_and_usage() {
        let store = SqliteStore::open_in_memory(None).expect("open");
        store.set(Bucket::UserProfile, "{}").expect("write");
        let expected = (Bucket::UserProfile.key().len() + 2) as u64;
        assert_eq!(store.usage_bytes().expect("usage"), expected);
        store.remove(Bucket::UserProfile).expect("remove");
        assert_eq!(store.usage_bytes().expect("usage"), 0);
    }
}
