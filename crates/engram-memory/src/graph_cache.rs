//! TTL-cached knowledge graph snapshot.
//!
//! The graph lives under `memory_db/kg_cache/graph.json` with an mtime-based
//! TTL. Writes go to a temp file followed by a rename, so a concurrent
//! reader observes either the previous snapshot or the new one, never a
//! partial file. Staleness only degrades ranking, never correctness, so a
//! TTL (not a lock) is enough.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::error::Result;
use crate::graph::KnowledgeGraph;

/// Default snapshot TTL.
pub const DEFAULT_GRAPH_TTL: Duration = Duration::from_secs(300);

const SNAPSHOT_FILE: &str = "graph.json";

/// Handle to the on-disk graph snapshot.
#[derive(Debug, Clone)]
pub struct GraphCache {
    dir: PathBuf,
    ttl: Duration,
}

impl GraphCache {
    /// Cache rooted at the given `kg_cache` directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ttl: DEFAULT_GRAPH_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    /// Load the snapshot if present and fresh. Stale, missing, or
    /// unreadable snapshots return `None` (the caller rebuilds).
    pub fn load(&self) -> Option<KnowledgeGraph> {
        let path = self.snapshot_path();
        if !self.is_fresh(&path) {
            return None;
        }
        match std::fs::read_to_string(&path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(graph) => {
                    debug!("Loaded graph snapshot from {:?}", path);
                    Some(graph)
                }
                Err(e) => {
                    warn!("Graph snapshot unreadable ({e}); rebuilding");
                    None
                }
            },
            Err(_) => None,
        }
    }

    fn is_fresh(&self, path: &Path) -> bool {
        let Ok(metadata) = std::fs::metadata(path) else {
            return false;
        };
        let Ok(mtime) = metadata.modified() else {
            return false;
        };
        match SystemTime::now().duration_since(mtime) {
            Ok(age) => age <= self.ttl,
            // mtime in the future (clock skew) counts as fresh.
            Err(_) => true,
        }
    }

    /// Persist a snapshot atomically (temp file + rename).
    pub fn store(&self, graph: &KnowledgeGraph) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string(graph)?;

        let tmp = self.dir.join(format!(".{SNAPSHOT_FILE}.tmp"));
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, self.snapshot_path())?;

        debug!(
            "Stored graph snapshot ({} nodes, {} edges)",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(())
    }

    /// Drop the snapshot (after pruning, the cached graph may reference
    /// deleted memories).
    pub fn invalidate(&self) -> Result<()> {
        let path = self.snapshot_path();
        if path.exists() {
            std::fs::remove_file(&path)?;
            debug!("Invalidated graph snapshot");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_types::{Entity, EntityType};

    fn sample_graph() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        graph.add_memory(
            "m1",
            &[
                Entity::new(EntityType::File, "auth.py"),
                Entity::new(EntityType::Tool, "pytest"),
            ],
        );
        graph.compute_centrality();
        graph
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = GraphCache::new(dir.path().join("kg_cache"));
        assert!(cache.load().is_none());
    }

    #[test]
    fn test_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = GraphCache::new(dir.path().join("kg_cache"));
        cache.store(&sample_graph()).unwrap();

        let loaded = cache.load().unwrap();
        assert_eq!(loaded.node_count(), 2);
        assert_eq!(loaded.edge_count(), 1);
    }

    #[test]
    fn test_zero_ttl_is_always_stale() {
        let dir = tempfile::tempdir().unwrap();
        let cache = GraphCache::new(dir.path().join("kg_cache")).with_ttl(Duration::ZERO);
        cache.store(&sample_graph()).unwrap();
        // With a zero TTL even a just-written snapshot has expired.
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.load().is_none());
    }

    #[test]
    fn test_invalidate() {
        let dir = tempfile::tempdir().unwrap();
        let cache = GraphCache::new(dir.path().join("kg_cache"));
        cache.store(&sample_graph()).unwrap();
        cache.invalidate().unwrap();
        assert!(cache.load().is_none());
        // Invalidating twice is fine.
        cache.invalidate().unwrap();
    }

    #[test]
    fn test_corrupt_snapshot_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("kg_cache");
        std::fs::create_dir_all(&cache_dir).unwrap();
        std::fs::write(cache_dir.join("graph.json"), "{not json").unwrap();

        let cache = GraphCache::new(cache_dir);
        assert!(cache.load().is_none());
    }
}
