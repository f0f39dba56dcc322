//! Knowledge graph construction from the memory store.
//!
//! The graph is always derivable from a store scan; the snapshot under
//! `kg_cache/` is only a TTL'd cache. Readers that find a fresh snapshot
//! use it as-is; otherwise the graph is rebuilt and re-cached.

use tracing::{debug, warn};

use engram_memory::{GraphCache, KnowledgeGraph, MemoryStore};

use crate::entities;
use crate::error::Result;

/// Build the co-mention graph from every memory in the store and compute
/// centrality.
pub fn build_graph(store: &MemoryStore) -> Result<KnowledgeGraph> {
    let memories = store.scan(None)?;
    let mut graph = KnowledgeGraph::new();

    for memory in &memories {
        let entities = entities::extract_from_memory(memory);
        if !entities.is_empty() {
            graph.add_memory(&memory.id, &entities);
        }
    }

    graph.compute_centrality();
    debug!(
        "Built knowledge graph: {} nodes, {} edges from {} memories",
        graph.node_count(),
        graph.edge_count(),
        memories.len()
    );
    Ok(graph)
}

/// Return a fresh-enough graph: the cached snapshot when its TTL holds,
/// otherwise a rebuild (re-cached on the way out).
///
/// Cache write failures are non-fatal; ranking degrades to the freshly
/// built graph either way.
pub fn get_or_build(store: &MemoryStore, cache: Option<&GraphCache>) -> Result<KnowledgeGraph> {
    if let Some(cache) = cache
        && let Some(graph) = cache.load()
    {
        return Ok(graph);
    }

    let graph = build_graph(store)?;
    if let Some(cache) = cache
        && let Err(e) = cache.store(&graph)
    {
        warn!("Failed to persist graph snapshot: {e}");
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_types::{Entity, EntityType, Memory, memory_id};
    use serial_test::serial;

    fn memory(session: &str, index: u32, intent: &str, action: &str) -> Memory {
        let (artifacts, flags) = crate::artifacts::extract(&format!("{intent} {action}"));
        Memory {
            id: memory_id(session, index, intent),
            session_id: session.into(),
            timestamp: engram_types::now(),
            chunk_index: index,
            intent: intent.into(),
            action: action.into(),
            outcome: "done".into(),
            importance: 6.0,
            artifacts,
            flags,
            embedding: vec![0.0; 4],
            embedded_text: format!("Session {session}. {intent}"),
        }
    }

    #[test]
    #[serial]
    fn test_build_graph_from_store() {
        let store = MemoryStore::open_in_memory(4).unwrap();
        store
            .put_batch(&[
                memory("s1", 0, "fix auth", "edited auth.py and jwt.py"),
                memory("s1", 1, "session work", "edited jwt.py and session.py"),
            ])
            .unwrap();

        let graph = build_graph(&store).unwrap();
        assert!(graph.node_count() >= 3);

        // jwt.py co-occurs with both other files.
        let jwt = Entity::new(EntityType::File, "jwt.py");
        let hood = graph.neighborhood(&jwt, 1);
        assert!(hood.len() >= 3);
    }

    #[test]
    #[serial]
    fn test_graph_reconstructible_after_reload() {
        let store = MemoryStore::open_in_memory(4).unwrap();
        store
            .put_batch(&[memory("s1", 0, "fix auth", "edited auth.py")])
            .unwrap();

        let a = build_graph(&store).unwrap();
        let b = build_graph(&store).unwrap();
        assert_eq!(a.node_count(), b.node_count());
        assert_eq!(a.edge_count(), b.edge_count());
    }

    #[test]
    #[serial]
    fn test_get_or_build_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = GraphCache::new(dir.path().join("kg_cache"));
        let store = MemoryStore::open_in_memory(4).unwrap();
        store
            .put_batch(&[memory("s1", 0, "fix auth", "edited auth.py")])
            .unwrap();

        let first = get_or_build(&store, Some(&cache)).unwrap();
        assert!(first.node_count() > 0);

        // Add a memory; the fresh cache hides it until invalidation.
        store
            .put_batch(&[memory("s1", 1, "more work", "edited other.py")])
            .unwrap();
        let cached = get_or_build(&store, Some(&cache)).unwrap();
        assert_eq!(cached.node_count(), first.node_count());

        cache.invalidate().unwrap();
        let rebuilt = get_or_build(&store, Some(&cache)).unwrap();
        assert!(rebuilt.node_count() > first.node_count());
    }
}
