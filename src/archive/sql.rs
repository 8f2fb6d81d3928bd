//! SQL table archive (SQLite).
//!
//! One table of `(k BLOB PRIMARY KEY, v BLOB)` per archive. Several caches
//! share a database by opening the same path with distinct table names, so
//! one file on disk can back a whole family of memoized callables.
//!
//! Operations map to single parameterized statements with per-operation
//! transactions; bulk dumps batch inside one transaction. Multi-process
//! writer semantics are SQLite's (WAL mode is enabled on open).

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection};

use super::Archive;
use crate::error::{Error, Result};
use crate::key::CacheKey;

const BACKEND: &str = "sql";

/// Archive storing entries in one SQLite table.
pub struct SqlArchive {
    conn: Mutex<Connection>,
    table: String,
}

impl SqlArchive {
    /// Opens (creating on demand) the table `table` in the database at
    /// `database`.
    ///
    /// `database` may be a filesystem path, `":memory:"`, or a
    /// `sqlite://path` URI. The table name must be a plain identifier; it
    /// is interpolated into DDL, so anything else is rejected.
    pub fn open(database: &str, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        let location = database.strip_prefix("sqlite://").unwrap_or(database);

        let conn = if location == ":memory:" {
            Connection::open_in_memory().map_err(|e| Error::archive(BACKEND, e))?
        } else {
            let path = Path::new(location);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| Error::archive(BACKEND, e))?;
                }
            }
            Connection::open(path).map_err(|e| Error::archive(BACKEND, e))?
        };

        conn.execute(
            &format!("CREATE TABLE IF NOT EXISTS {table} (k BLOB PRIMARY KEY, v BLOB NOT NULL)"),
            [],
        )
        .map_err(|e| Error::archive(BACKEND, e))?;

        // WAL keeps readers unblocked while another process writes.
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;",
        )
        .map_err(|e| Error::archive(BACKEND, e))?;

        tracing::debug!(database = location, table, "sql archive opened");
        Ok(SqlArchive {
            conn: Mutex::new(conn),
            table: table.to_owned(),
        })
    }

    /// Opens an in-memory database, for tests and scratch use.
    pub fn in_memory(table: &str) -> Result<Self> {
        Self::open(":memory:", table)
    }

    /// The table backing this archive.
    pub fn table(&self) -> &str {
        &self.table
    }
}

fn validate_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty()
        && !table.starts_with(|c: char| c.is_ascii_digit())
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "table name '{table}' must be a plain identifier"
        )))
    }
}

impl Archive for SqlArchive {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn name(&self) -> &str {
        &self.table
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let result: std::result::Result<Vec<u8>, _> = conn.query_row(
            &format!("SELECT v FROM {} WHERE k = ?1", self.table),
            params![key.to_bytes()?],
            |row| row.get(0),
        );
        match result {
            Ok(bytes) => Ok(Some(bytes)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(Error::archive(BACKEND, err)),
        }
    }

    fn put(&self, key: &CacheKey, value: &[u8]) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!("INSERT OR REPLACE INTO {} (k, v) VALUES (?1, ?2)", self.table),
            params![key.to_bytes()?, value],
        )
        .map_err(|e| Error::archive(BACKEND, e))?;
        Ok(())
    }

    fn put_many(&self, entries: &[(CacheKey, Vec<u8>)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::archive(BACKEND, e))?;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT OR REPLACE INTO {} (k, v) VALUES (?1, ?2)",
                    self.table
                ))
                .map_err(|e| Error::archive(BACKEND, e))?;
            for (key, value) in entries {
                stmt.execute(params![key.to_bytes()?, value])
                    .map_err(|e| Error::archive(BACKEND, e))?;
            }
        }
        tx.commit().map_err(|e| Error::archive(BACKEND, e))?;
        Ok(())
    }

    fn delete(&self, key: &CacheKey) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                &format!("DELETE FROM {} WHERE k = ?1", self.table),
                params![key.to_bytes()?],
            )
            .map_err(|e| Error::archive(BACKEND, e))?;
        Ok(changed > 0)
    }

    fn contains(&self, key: &CacheKey) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE k = ?1", self.table),
                params![key.to_bytes()?],
                |row| row.get(0),
            )
            .map_err(|e| Error::archive(BACKEND, e))?;
        Ok(count > 0)
    }

    fn keys(&self) -> Result<Vec<CacheKey>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("SELECT k FROM {}", self.table))
            .map_err(|e| Error::archive(BACKEND, e))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, Vec<u8>>(0))
            .map_err(|e| Error::archive(BACKEND, e))?;
        let mut keys = Vec::new();
        for row in rows {
            let bytes = row.map_err(|e| Error::archive(BACKEND, e))?;
            keys.push(CacheKey::from_bytes(&bytes)?);
        }
        Ok(keys)
    }

    fn len(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", self.table),
                [],
                |row| row.get(0),
            )
            .map_err(|e| Error::archive(BACKEND, e))?;
        Ok(count as usize)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(&format!("DELETE FROM {}", self.table), [])
            .map_err(|e| Error::archive(BACKEND, e))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
