//! Persistent memory store backed by SQLite.
//!
//! One SQLite file in WAL mode holds the memory rows; a sqlite-vec virtual
//! table holds their embeddings. The store is single-writer/multi-reader
//! within a process; inter-process sharing is not supported.
//!
//! Writes that must be atomic (a whole PreCompact ingestion, a prune sweep)
//! go through [`MemoryStore::with_transaction`] so that crash recovery sees
//! either all of a batch or none of it.

mod memory_ops;
pub mod query;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info};

use crate::error::{MemoryError, Result};
use crate::vector;

pub use query::{MemoryFilter, QueryMatch, StoreStats};

// ─────────────────────────────────────────────────────────────────────────────
// Schema Version
// ─────────────────────────────────────────────────────────────────────────────

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

/// Database filename inside the store directory.
const DB_FILE: &str = "memories.db";

// ─────────────────────────────────────────────────────────────────────────────
// Memory Store
// ─────────────────────────────────────────────────────────────────────────────

/// Memory store backed by SQLite + sqlite-vec.
pub struct MemoryStore {
    /// The SQLite connection, serialized by a mutex.
    pub(crate) conn: Mutex<Connection>,
    /// Embedding dimensionality this store accepts.
    dims: usize,
    /// Directory the store lives in (`memory_db/`), when on disk.
    dir: Option<PathBuf>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("dims", &self.dims)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Open or create a store in the given directory (the `memory_db/`
    /// layout root). Creates the directory and schema as needed.
    pub fn open(dir: impl AsRef<Path>, dims: usize) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        vector::init_vector_extension();
        let conn = Connection::open_with_flags(
            dir.join(DB_FILE),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;

        let store = Self {
            conn: Mutex::new(conn),
            dims,
            dir: Some(dir.to_path_buf()),
        };
        store.initialize()?;

        info!("Memory store opened at {:?} ({} dims)", dir, dims);
        Ok(store)
    }

    /// Create an in-memory store (tests and dry runs).
    pub fn open_in_memory(dims: usize) -> Result<Self> {
        vector::init_vector_extension();
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            dims,
            dir: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Embedding dimensionality this store accepts.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// The on-disk directory, if any.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        self.create_schema(&conn)?;

        // Refuse to reuse a store written with a different dimensionality.
        // Migration between embedders requires re-embedding, which is out of
        // scope here.
        let recorded: Option<usize> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'embedding.dimensions'",
                [],
                |row| row.get::<_, String>(0),
            )
            .ok()
            .and_then(|s| s.parse().ok());
        match recorded {
            Some(d) if d != self.dims => {
                return Err(MemoryError::Dimension {
                    expected: d,
                    actual: self.dims,
                });
            }
            Some(_) => {}
            None => {
                conn.execute(
                    "INSERT OR REPLACE INTO meta (key, value) VALUES ('embedding.dimensions', ?1)",
                    params![self.dims.to_string()],
                )?;
            }
        }

        Ok(())
    }

    fn create_schema(&self, conn: &Connection) -> Result<()> {
        let current_version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if current_version >= SCHEMA_VERSION {
            debug!("Schema up to date (version {})", current_version);
            // The vec0 table is virtual and must exist per connection lifetime.
            vector::create_vector_table(conn, self.dims)?;
            return Ok(());
        }

        conn.execute_batch(
            r#"
            -- Memory rows; embeddings live in the sqlite-vec table
            CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                intent TEXT NOT NULL,
                action TEXT NOT NULL,
                outcome TEXT NOT NULL DEFAULT '',
                importance REAL NOT NULL DEFAULT 0,
                artifacts TEXT NOT NULL DEFAULT '{}',
                has_code INTEGER NOT NULL DEFAULT 0,
                has_files INTEGER NOT NULL DEFAULT 0,
                has_architecture INTEGER NOT NULL DEFAULT 0,
                success INTEGER NOT NULL DEFAULT 0,
                embedded_text TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_memories_session_id
                ON memories(session_id);
            CREATE INDEX IF NOT EXISTS idx_memories_timestamp
                ON memories(timestamp);
            CREATE INDEX IF NOT EXISTS idx_memories_importance
                ON memories(importance);

            -- Store metadata (embedding provider, dimensions, ...)
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        vector::create_vector_table(conn, self.dims)?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        info!("Schema created (version {})", SCHEMA_VERSION);
        Ok(())
    }

    /// Execute a function within a transaction.
    ///
    /// All operations inside the closure commit atomically; an error rolls
    /// everything back.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        match f(&tx) {
            Ok(result) => {
                tx.commit()?;
                Ok(result)
            }
            // Transaction rolls back when dropped.
            Err(e) => Err(e),
        }
    }

    /// Get a metadata value.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT value FROM meta WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    /// Set a metadata value.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_open_in_memory() {
        let store = MemoryStore::open_in_memory(4).unwrap();
        assert_eq!(store.dims(), 4);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    #[serial]
    fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = MemoryStore::open(dir.path().join("memory_db"), 4).unwrap();
            store.set_meta("marker", "v").unwrap();
        }
        let store = MemoryStore::open(dir.path().join("memory_db"), 4).unwrap();
        assert_eq!(store.get_meta("marker").unwrap(), Some("v".to_string()));
    }

    #[test]
    #[serial]
    fn test_dimension_mismatch_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory_db");
        {
            MemoryStore::open(&path, 4).unwrap();
        }
        let result = MemoryStore::open(&path, 8);
        assert!(matches!(result, Err(MemoryError::Dimension { .. })));
    }

    #[test]
    #[serial]
    fn test_meta_roundtrip() {
        let store = MemoryStore::open_in_memory(4).unwrap();
        assert!(store.get_meta("k").unwrap().is_none());
        store.set_meta("k", "v1").unwrap();
        store.set_meta("k", "v2").unwrap();
        assert_eq!(store.get_meta("k").unwrap(), Some("v2".to_string()));
    }

    #[test]
    #[serial]
    fn test_with_transaction_rolls_back() {
        let store = MemoryStore::open_in_memory(4).unwrap();
        let result: Result<()> = store.with_transaction(|conn| {
            conn.execute(
                "INSERT INTO meta (key, value) VALUES ('tx', 'yes')",
                [],
            )?;
            Err(MemoryError::InvalidData("boom".into()))
        });
        assert!(result.is_err());
        assert!(store.get_meta("tx").unwrap().is_none());
    }
}
