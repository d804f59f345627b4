//! Persistent tile index backed by SQLite.
//!
//! One `cache.db` per file-cache root, holding a single `tiles` table that
//! maps the derived tile filename to its validation etag, popularity counter
//! and byte size. The index is the source of truth for purge ordering and
//! the etag needed for conditional revalidation; actual image bytes live
//! next to it in the directory tree.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// One row of the `tiles` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Full derived tile path, the primary key.
    pub filename: String,
    /// Byte size of the stored image.
    pub size: u64,
    /// Access-frequency counter; lower is evicted first.
    pub popularity: i64,
}

/// SQLite-backed persistent index for a file cache root.
///
/// Thread-safe via `Mutex<Connection>`. Callers treat query failures as
/// cache misses; only maintenance entry points propagate errors.
pub struct TileIndex {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for TileIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileIndex")
            .field("conn", &"<sqlite>")
            .finish()
    }
}

impl TileIndex {
    /// Open (or create) the index database at the given path.
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "synchronous", "OFF")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tiles (
                filename   TEXT PRIMARY KEY,
                etag       TEXT,
                popularity INTEGER DEFAULT 1,
                size       INTEGER DEFAULT 0
            )",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Look up the stored etag for a filename.
    ///
    /// Returns `Ok(None)` both for an absent row and for a row without an
    /// etag; either way there is nothing to revalidate against.
    pub fn etag(&self, filename: &str) -> Result<Option<String>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let etag: Option<Option<String>> = conn
            .query_row(
                "SELECT etag FROM tiles WHERE filename = ?1",
                params![filename],
                |row| row.get(0),
            )
            .optional()?;
        Ok(etag.flatten())
    }

    /// Insert or update the row for a filename.
    ///
    /// Updating an existing row keeps its popularity; a fresh row starts at
    /// the schema default of 1.
    pub fn record(
        &self,
        filename: &str,
        etag: Option<&str>,
        size: u64,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tiles (filename, etag, size) VALUES (?1, ?2, ?3)
             ON CONFLICT(filename) DO UPDATE SET etag = excluded.etag, size = excluded.size",
            params![filename, etag, size],
        )?;
        Ok(())
    }

    /// Increment the popularity counter for a filename.
    ///
    /// A filename without a row is a no-op; the tile may simply not be
    /// present in this cache.
    pub fn bump_popularity(&self, filename: &str) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE tiles SET popularity = popularity + 1 WHERE filename = ?1",
            params![filename],
        )?;
        Ok(())
    }

    /// Subtract `amount` from every row's popularity, keeping the counter
    /// range bounded over the cache's lifetime.
    pub fn rebase_popularity(&self, amount: i64) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE tiles SET popularity = popularity - ?1",
            params![amount],
        )?;
        Ok(())
    }

    /// Total byte size of all indexed tiles.
    pub fn total_size(&self) -> Result<u64, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COALESCE(SUM(size), 0) FROM tiles", [], |row| {
            row.get(0)
        })
    }

    /// All rows ordered by ascending popularity (purge order).
    pub fn entries_by_popularity(&self) -> Result<Vec<IndexEntry>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT filename, size, popularity FROM tiles ORDER BY popularity")?;
        let rows = stmt.query_map([], |row| {
            Ok(IndexEntry {
                filename: row.get(0)?,
                size: row.get(1)?,
                popularity: row.get(2)?,
            })
        })?;
        rows.collect()
    }

    /// Delete the row for a filename.
    pub fn remove(&self, filename: &str) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM tiles WHERE filename = ?1", params![filename])?;
        Ok(())
    }

    /// Current popularity of a filename, if indexed.
    pub fn popularity(&self, filename: &str) -> Result<Option<i64>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT popularity FROM tiles WHERE filename = ?1",
            params![filename],
            |row| row.get(0),
        )
        .optional()
    }

    /// Number of indexed tiles.
    pub fn entry_count(&self) -> Result<u64, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM tiles", [], |row| row.get(0))
    }
}
