//! Memory CRUD, scan, and similarity query operations.

use chrono::DateTime;
use rusqlite::{Connection, Row, params};
use tracing::debug;

use engram_types::{Artifacts, Memory, MemoryFlags};

use crate::error::{MemoryError, Result};
use crate::vector;

use super::{MemoryFilter, MemoryStore, QueryMatch, StoreStats};

const MEMORY_COLUMNS: &str = "id, session_id, timestamp, chunk_index, intent, action, outcome, \
     importance, artifacts, has_code, has_files, has_architecture, success, embedded_text";

impl MemoryStore {
    /// Store a single memory atomically.
    ///
    /// Rejects duplicate IDs and embeddings whose length differs from the
    /// store's dimensionality. Row and embedding commit together.
    pub fn put(&self, memory: &Memory) -> Result<()> {
        self.with_transaction(|conn| Self::insert_in_tx(conn, memory, self.dims()))
    }

    /// Store a batch of memories in one transaction.
    ///
    /// Either every memory in the batch becomes visible or none does; this
    /// is the atomic-visibility guarantee for a PreCompact ingestion.
    pub fn put_batch(&self, memories: &[Memory]) -> Result<usize> {
        let dims = self.dims();
        self.with_transaction(|conn| {
            for memory in memories {
                Self::insert_in_tx(conn, memory, dims)?;
            }
            Ok(memories.len())
        })
    }

    fn insert_in_tx(conn: &Connection, memory: &Memory, dims: usize) -> Result<()> {
        if memory.embedding.len() != dims {
            return Err(MemoryError::Dimension {
                expected: dims,
                actual: memory.embedding.len(),
            });
        }
        if memory.intent.is_empty() || memory.action.is_empty() {
            return Err(MemoryError::InvalidData(format!(
                "memory {} has empty intent or action",
                memory.id
            )));
        }

        let exists: bool = conn
            .prepare("SELECT 1 FROM memories WHERE id = ?1")?
            .exists(params![memory.id])?;
        if exists {
            return Err(MemoryError::DuplicateId(memory.id.clone()));
        }

        let artifacts_json = serde_json::to_string(&memory.artifacts)?;
        conn.execute(
            r#"
            INSERT INTO memories (id, session_id, timestamp, chunk_index, intent, action, outcome,
                                  importance, artifacts, has_code, has_files, has_architecture,
                                  success, embedded_text)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                memory.id,
                memory.session_id,
                memory.timestamp.to_rfc3339(),
                memory.chunk_index,
                memory.intent,
                memory.action,
                memory.outcome,
                memory.importance,
                artifacts_json,
                memory.flags.has_code as i32,
                memory.flags.has_files as i32,
                memory.flags.has_architecture as i32,
                memory.flags.success as i32,
                memory.embedded_text,
            ],
        )?;
        vector::store_embedding(conn, &memory.id, &memory.embedding)?;

        debug!("Inserted memory {}", memory.id);
        Ok(())
    }

    /// Get a memory by ID.
    pub fn get(&self, id: &str) -> Result<Option<Memory>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare(&format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"))?;
        let mut rows = stmt.query(params![id])?;

        if let Some(row) = rows.next()? {
            let mut memory = Self::row_to_memory(row)?;
            memory.embedding = vector::get_embedding(&conn, id)?.unwrap_or_default();
            Ok(Some(memory))
        } else {
            Ok(None)
        }
    }

    /// Delete a batch of memories (rows and embeddings) atomically.
    ///
    /// Returns the number of memory rows removed; unknown IDs are ignored.
    pub fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.with_transaction(|conn| {
            let mut deleted = 0;
            for id in ids {
                deleted += conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
                vector::delete_embedding(conn, id)?;
            }
            debug!("Deleted {} memories", deleted);
            Ok(deleted)
        })
    }

    /// Approximate nearest-neighbor query over cosine distance.
    ///
    /// Returns up to `k` matches that pass `filter`. The filter cannot be
    /// pushed into the index, so extra candidates are fetched and filtered
    /// post-hoc; heavily filtered stores may return fewer than `k`.
    pub fn query(
        &self,
        query_vec: &[f32],
        k: usize,
        filter: Option<&MemoryFilter>,
    ) -> Result<Vec<QueryMatch>> {
        if query_vec.len() != self.dims() {
            return Err(MemoryError::Dimension {
                expected: self.dims(),
                actual: query_vec.len(),
            });
        }

        let conn = self.conn.lock().unwrap();
        let fetch = if filter.is_some() { k.saturating_mul(3) } else { k };
        let hits = vector::search_similar(&conn, query_vec, fetch.max(k))?;

        let mut matches = Vec::new();
        for hit in hits {
            let mut stmt =
                conn.prepare(&format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"))?;
            let mut rows = stmt.query(params![hit.memory_id])?;
            let Some(row) = rows.next()? else {
                // Embedding row outlived its memory; skip.
                continue;
            };
            let mut memory = Self::row_to_memory(row)?;

            if let Some(f) = filter
                && !f.matches(&memory)
            {
                continue;
            }

            memory.embedding = vector::get_embedding(&conn, &memory.id)?.unwrap_or_default();
            matches.push(QueryMatch {
                similarity: 1.0 - hit.distance,
                distance: hit.distance,
                memory,
            });
            if matches.len() >= k {
                break;
            }
        }

        Ok(matches)
    }

    /// Iterate all memories matching `filter`, oldest first.
    pub fn scan(&self, filter: Option<&MemoryFilter>) -> Result<Vec<Memory>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories ORDER BY timestamp ASC, chunk_index ASC"
        ))?;
        let mut rows = stmt.query([])?;

        let mut memories = Vec::new();
        while let Some(row) = rows.next()? {
            let memory = Self::row_to_memory(row)?;
            if let Some(f) = filter
                && !f.matches(&memory)
            {
                continue;
            }
            memories.push(memory);
        }

        // Second pass for embeddings so the statement above isn't held open.
        for memory in &mut memories {
            memory.embedding = vector::get_embedding(&conn, &memory.id)?.unwrap_or_default();
        }

        Ok(memories)
    }

    /// The `n` most recent memories, optionally restricted to a session.
    pub fn recent(&self, n: usize, session_id: Option<&str>) -> Result<Vec<Memory>> {
        let conn = self.conn.lock().unwrap();

        let mut memories = Vec::new();
        if let Some(sid) = session_id {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MEMORY_COLUMNS} FROM memories WHERE session_id = ?1 \
                 ORDER BY timestamp DESC, chunk_index DESC LIMIT ?2"
            ))?;
            let mut rows = stmt.query(params![sid, n as i64])?;
            while let Some(row) = rows.next()? {
                memories.push(Self::row_to_memory(row)?);
            }
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MEMORY_COLUMNS} FROM memories \
                 ORDER BY timestamp DESC, chunk_index DESC LIMIT ?1"
            ))?;
            let mut rows = stmt.query(params![n as i64])?;
            while let Some(row) = rows.next()? {
                memories.push(Self::row_to_memory(row)?);
            }
        }

        for memory in &mut memories {
            memory.embedding = vector::get_embedding(&conn, &memory.id)?.unwrap_or_default();
        }
        Ok(memories)
    }

    /// Total number of stored memories.
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Number of memories in one session.
    pub fn count_session(&self, session_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Distinct session IDs present in the store.
    pub fn session_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT DISTINCT session_id FROM memories")?;
        let mut rows = stmt.query([])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }

    /// Aggregate statistics: totals, per-category and per-flag counts,
    /// average importance.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().unwrap();

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        let avg_importance: f64 = conn
            .query_row("SELECT AVG(importance) FROM memories", [], |row| {
                row.get::<_, Option<f64>>(0)
            })?
            .unwrap_or(0.0);
        let session_count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT session_id) FROM memories",
            [],
            |row| row.get(0),
        )?;

        let mut by_category = std::collections::BTreeMap::new();
        {
            let mut stmt = conn.prepare(
                r#"
                SELECT CASE
                    WHEN importance >= 20 THEN 'critical'
                    WHEN importance >= 10 THEN 'high'
                    WHEN importance >= 5 THEN 'medium'
                    ELSE 'low'
                END AS category, COUNT(*)
                FROM memories GROUP BY category
                "#,
            )?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                by_category.insert(row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize);
            }
        }

        let mut by_flag = std::collections::BTreeMap::new();
        for flag in ["has_code", "has_files", "has_architecture", "success"] {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM memories WHERE {flag} = 1"),
                [],
                |row| row.get(0),
            )?;
            by_flag.insert(flag.to_string(), count as usize);
        }

        let embedding_count = vector::count_embeddings(&conn)?;

        Ok(StoreStats {
            total: total as usize,
            by_category,
            by_flag,
            avg_importance: avg_importance as f32,
            session_count: session_count as usize,
            embedding_count,
        })
    }

    fn row_to_memory(row: &Row<'_>) -> Result<Memory> {
        let timestamp_str: String = row.get(2)?;
        let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
            .map_err(|e| MemoryError::InvalidData(format!("bad timestamp: {e}")))?
            .to_utc();
        let artifacts_json: String = row.get(8)?;
        let artifacts: Artifacts = serde_json::from_str(&artifacts_json)?;

        Ok(Memory {
            id: row.get(0)?,
            session_id: row.get(1)?,
            timestamp,
            chunk_index: row.get::<_, i64>(3)? as u32,
            intent: row.get(4)?,
            action: row.get(5)?,
            outcome: row.get(6)?,
            importance: row.get::<_, f64>(7)? as f32,
            artifacts,
            flags: MemoryFlags {
                has_code: row.get::<_, i64>(9)? != 0,
                has_files: row.get::<_, i64>(10)? != 0,
                has_architecture: row.get::<_, i64>(11)? != 0,
                success: row.get::<_, i64>(12)? != 0,
            },
            embedding: Vec::new(), // loaded separately from the vector table
            embedded_text: row.get(13)?,
        })
    }
}
