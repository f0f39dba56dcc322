//! Embedding storage and similarity search using sqlite-vec.
//!
//! A vec0 virtual table holds one row per memory, keyed by memory ID, with
//! cosine as the distance metric. These are low-level helpers; the store
//! wraps them with dimension checks and transactions.

use rusqlite::{Connection, params};
use tracing::debug;
use zerocopy::IntoBytes;

use crate::error::{MemoryError, Result};

/// Register the sqlite-vec extension for all future connections.
///
/// Uses `sqlite3_auto_extension`, which applies process-globally; calling
/// it more than once is harmless.
pub fn init_vector_extension() {
    use rusqlite::ffi::sqlite3_auto_extension;
    use sqlite_vec::sqlite3_vec_init;

    unsafe {
        #[allow(clippy::missing_transmute_annotations)]
        sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())));
    }
}

/// Create the embeddings virtual table.
pub fn create_vector_table(conn: &Connection, dims: usize) -> Result<()> {
    let sql = format!(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS memory_embeddings USING vec0(
            memory_id TEXT PRIMARY KEY,
            embedding float[{dims}] distance_metric=cosine
        )
        "#
    );
    conn.execute_batch(&sql)?;
    Ok(())
}

/// Store an embedding for a memory. Replaces any existing row.
pub fn store_embedding(conn: &Connection, memory_id: &str, embedding: &[f32]) -> Result<()> {
    // vec0 doesn't support INSERT OR REPLACE, so delete first.
    conn.execute(
        "DELETE FROM memory_embeddings WHERE memory_id = ?1",
        params![memory_id],
    )?;
    conn.execute(
        "INSERT INTO memory_embeddings (memory_id, embedding) VALUES (?1, ?2)",
        params![memory_id, embedding.as_bytes()],
    )?;
    Ok(())
}

/// Delete the embedding for a memory. Returns whether a row was removed.
pub fn delete_embedding(conn: &Connection, memory_id: &str) -> Result<bool> {
    let rows = conn.execute(
        "DELETE FROM memory_embeddings WHERE memory_id = ?1",
        params![memory_id],
    )?;
    Ok(rows > 0)
}

/// Fetch the stored embedding for a memory.
pub fn get_embedding(conn: &Connection, memory_id: &str) -> Result<Option<Vec<f32>>> {
    let mut stmt =
        conn.prepare("SELECT embedding FROM memory_embeddings WHERE memory_id = ?1")?;
    let mut rows = stmt.query(params![memory_id])?;

    if let Some(row) = rows.next()? {
        let bytes: Vec<u8> = row.get(0)?;
        Ok(Some(vec_from_bytes(&bytes)?))
    } else {
        Ok(None)
    }
}

/// A raw similarity hit: memory ID plus cosine distance.
#[derive(Debug, Clone)]
pub struct SimilarityHit {
    pub memory_id: String,
    /// Cosine distance (lower = more similar; similarity = 1 - distance).
    pub distance: f32,
}

/// K-nearest-neighbor search over the embeddings table.
pub fn search_similar(
    conn: &Connection,
    query_embedding: &[f32],
    limit: usize,
) -> Result<Vec<SimilarityHit>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT memory_id, distance
        FROM memory_embeddings
        WHERE embedding MATCH ?1
        ORDER BY distance
        LIMIT ?2
        "#,
    )?;

    let mut rows = stmt.query(params![query_embedding.as_bytes(), limit as i64])?;
    let mut results = Vec::new();
    while let Some(row) = rows.next()? {
        results.push(SimilarityHit {
            memory_id: row.get(0)?,
            distance: row.get(1)?,
        });
    }

    debug!("Similarity search returned {} hits (limit {})", results.len(), limit);
    Ok(results)
}

/// Count stored embeddings.
pub fn count_embeddings(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM memory_embeddings", [], |row| {
        row.get(0)
    })?;
    Ok(count as usize)
}

/// Decode a little-endian f32 blob back into a vector.
pub fn vec_from_bytes(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(MemoryError::InvalidData(format!(
            "embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn test_conn(dims: usize) -> Connection {
        init_vector_extension();
        let conn = Connection::open_in_memory().unwrap();
        create_vector_table(&conn, dims).unwrap();
        conn
    }

    #[test]
    #[serial]
    fn test_store_and_get_embedding() {
        let conn = test_conn(4);
        store_embedding(&conn, "m1", &[0.1, 0.2, 0.3, 0.4]).unwrap();

        let back = get_embedding(&conn, "m1").unwrap().unwrap();
        assert_eq!(back.len(), 4);
        assert!((back[0] - 0.1).abs() < 1e-6);
        assert!(get_embedding(&conn, "missing").unwrap().is_none());
    }

    #[test]
    #[serial]
    fn test_replace_embedding() {
        let conn = test_conn(4);
        store_embedding(&conn, "m1", &[1.0, 0.0, 0.0, 0.0]).unwrap();
        store_embedding(&conn, "m1", &[0.0, 1.0, 0.0, 0.0]).unwrap();

        assert_eq!(count_embeddings(&conn).unwrap(), 1);
        let back = get_embedding(&conn, "m1").unwrap().unwrap();
        assert_eq!(back[1], 1.0);
    }

    #[test]
    #[serial]
    fn test_delete_embedding() {
        let conn = test_conn(4);
        store_embedding(&conn, "m1", &[1.0, 0.0, 0.0, 0.0]).unwrap();
        assert!(delete_embedding(&conn, "m1").unwrap());
        assert!(!delete_embedding(&conn, "m1").unwrap());
        assert_eq!(count_embeddings(&conn).unwrap(), 0);
    }

    #[test]
    #[serial]
    fn test_cosine_ordering() {
        let conn = test_conn(4);
        store_embedding(&conn, "exact", &[1.0, 0.0, 0.0, 0.0]).unwrap();
        store_embedding(&conn, "close", &[0.9, 0.1, 0.0, 0.0]).unwrap();
        store_embedding(&conn, "far", &[0.0, 0.0, 1.0, 0.0]).unwrap();

        let hits = search_similar(&conn, &[1.0, 0.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].memory_id, "exact");
        assert!(hits[0].distance < 0.01);
        assert_eq!(hits[1].memory_id, "close");
        assert_eq!(hits[2].memory_id, "far");
    }

    #[test]
    fn test_vec_from_bytes_rejects_ragged() {
        assert!(vec_from_bytes(&[0u8; 7]).is_err());
        assert_eq!(vec_from_bytes(&[]).unwrap().len(), 0);
    }
}
