//! Knowledge graph over extracted entities.
//!
//! Nodes are entities; edges are undirected co-mention relations weighted by
//! the number of memories in which both entities co-occur. The graph is
//! derived state: it is always reconstructible from a scan of the memory
//! store, and the persisted form (see [`crate::graph_cache`]) is only a
//! cache.
//!
//! The representation is an arena (`Vec` of nodes) plus an index keyed by
//! `(entity type, canonical form)`, with adjacency maps per node. No
//! back-pointers; cycles are expected and fine.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::warn;

use engram_types::Entity;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// PageRank damping factor.
const PAGERANK_DAMPING: f64 = 0.85;
/// PageRank convergence tolerance (per-node, networkx-style `err < n·tol`).
const PAGERANK_TOLERANCE: f64 = 1e-6;
/// PageRank iteration cap.
const PAGERANK_MAX_ITER: usize = 100;

/// Graph-hop attenuation schedule: exact match, 1 hop, 2 hops.
const HOP_ATTENUATION: [f32; 3] = [1.0, 0.5, 0.25];

/// Stable lookup key for an entity.
pub fn entity_key(entity: &Entity) -> String {
    format!("{}:{}", entity.entity_type.as_str(), entity.canonical_form)
}

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// A node in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub entity: Entity,
    /// IDs of memories referencing this entity. Invariant: non-empty for
    /// every node in a graph built from live memories.
    pub memory_ids: Vec<String>,
    /// Centrality scores, recomputed whenever the graph changes.
    #[serde(default)]
    pub pagerank: f64,
    #[serde(default)]
    pub betweenness: f64,
    #[serde(default)]
    pub degree: usize,
}

/// Statistics about the graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub by_type: BTreeMap<String, usize>,
}

/// Entity co-mention graph with centrality.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
    /// Adjacency: `edges[i][j]` = co-mention weight between nodes i and j.
    /// Symmetric by construction.
    edges: Vec<BTreeMap<usize, f32>>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(BTreeMap::len).sum::<usize>() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by entity identity.
    pub fn node(&self, entity: &Entity) -> Option<&GraphNode> {
        self.index.get(&entity_key(entity)).map(|&i| &self.nodes[i])
    }

    /// All nodes, for reporting.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Record one memory's entity mentions.
    ///
    /// Every unordered pair of distinct entities in the memory contributes
    /// +1 to its co-mention edge weight.
    pub fn add_memory(&mut self, memory_id: &str, entities: &[Entity]) {
        // Dedup by identity key; a memory mentioning an entity twice is
        // still one co-mention.
        let mut indices: Vec<usize> = Vec::new();
        for entity in entities {
            let idx = self.intern(entity);
            if !indices.contains(&idx) {
                indices.push(idx);
            }
        }

        for &idx in &indices {
            let ids = &mut self.nodes[idx].memory_ids;
            if !ids.iter().any(|id| id == memory_id) {
                ids.push(memory_id.to_string());
            }
        }

        for (a_pos, &a) in indices.iter().enumerate() {
            for &b in &indices[a_pos + 1..] {
                *self.edges[a].entry(b).or_insert(0.0) += 1.0;
                *self.edges[b].entry(a).or_insert(0.0) += 1.0;
            }
        }
    }

    fn intern(&mut self, entity: &Entity) -> usize {
        let key = entity_key(entity);
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(GraphNode {
            entity: entity.clone(),
            memory_ids: Vec::new(),
            pagerank: 0.0,
            betweenness: 0.0,
            degree: 0,
        });
        self.edges.push(BTreeMap::new());
        self.index.insert(key, idx);
        idx
    }

    /// Entities within `hops` of the given entity, with attenuation factors
    /// 1.0 / 0.5 / 0.25 for 0, 1, and 2 hops. Hops beyond 2 are not used.
    ///
    /// Returns a map from entity key to attenuation. Unknown entities yield
    /// an empty map.
    pub fn neighborhood(&self, entity: &Entity, hops: usize) -> HashMap<String, f32> {
        let mut result = HashMap::new();
        let Some(&start) = self.index.get(&entity_key(entity)) else {
            return result;
        };

        let max_hops = hops.min(HOP_ATTENUATION.len() - 1);
        let mut visited: HashMap<usize, usize> = HashMap::new();
        let mut queue = VecDeque::new();
        visited.insert(start, 0);
        queue.push_back((start, 0usize));

        while let Some((idx, depth)) = queue.pop_front() {
            result.insert(
                entity_key(&self.nodes[idx].entity),
                HOP_ATTENUATION[depth],
            );
            if depth == max_hops {
                continue;
            }
            for &next in self.edges[idx].keys() {
                if !visited.contains_key(&next) {
                    visited.insert(next, depth + 1);
                    queue.push_back((next, depth + 1));
                }
            }
        }

        result
    }

    /// Memories referencing any entity within `hops` of the given entity,
    /// in BFS order, deduplicated.
    pub fn related_memories(&self, entity: &Entity, hops: usize) -> Vec<String> {
        let neighborhood = self.neighborhood(entity, hops);
        let mut seen = std::collections::HashSet::new();
        let mut result = Vec::new();

        // Order by attenuation (closer entities first) for stable output.
        let mut keys: Vec<(&String, &f32)> = neighborhood.iter().collect();
        keys.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));

        for (key, _) in keys {
            if let Some(&idx) = self.index.get(key) {
                for id in &self.nodes[idx].memory_ids {
                    if seen.insert(id.clone()) {
                        result.push(id.clone());
                    }
                }
            }
        }
        result
    }

    /// Recompute all centrality scores from the current node/edge set.
    ///
    /// PageRank is primary; if it fails to converge the scores degrade to
    /// normalized degree with a warning, and retrieval carries on.
    pub fn compute_centrality(&mut self) {
        let n = self.nodes.len();
        if n == 0 {
            return;
        }

        for i in 0..n {
            self.nodes[i].degree = self.edges[i].len();
        }

        match self.pagerank() {
            Some(scores) => {
                for (i, score) in scores.into_iter().enumerate() {
                    self.nodes[i].pagerank = score;
                }
            }
            None => {
                warn!("PageRank failed to converge; falling back to degree centrality");
                let total: f64 = self.nodes.iter().map(|node| node.degree as f64).sum();
                for i in 0..n {
                    self.nodes[i].pagerank = if total > 0.0 {
                        self.nodes[i].degree as f64 / total
                    } else {
                        1.0 / n as f64
                    };
                }
            }
        }

        let betweenness = self.betweenness();
        for (i, score) in betweenness.into_iter().enumerate() {
            self.nodes[i].betweenness = score;
        }
    }

    /// Weighted PageRank by power iteration. `None` on non-convergence.
    ///
    /// Disconnected components are handled by the teleportation term;
    /// isolated nodes redistribute their rank uniformly.
    fn pagerank(&self) -> Option<Vec<f64>> {
        let n = self.nodes.len();
        let n_f = n as f64;
        let weight_sums: Vec<f64> = self
            .edges
            .iter()
            .map(|adj| adj.values().map(|&w| w as f64).sum())
            .collect();

        let mut rank = vec![1.0 / n_f; n];
        for _ in 0..PAGERANK_MAX_ITER {
            let mut next = vec![(1.0 - PAGERANK_DAMPING) / n_f; n];
            let mut dangling = 0.0;

            for i in 0..n {
                if weight_sums[i] == 0.0 {
                    dangling += PAGERANK_DAMPING * rank[i];
                    continue;
                }
                for (&j, &w) in &self.edges[i] {
                    next[j] += PAGERANK_DAMPING * rank[i] * w as f64 / weight_sums[i];
                }
            }
            if dangling > 0.0 {
                let share = dangling / n_f;
                for value in &mut next {
                    *value += share;
                }
            }

            let err: f64 = next
                .iter()
                .zip(rank.iter())
                .map(|(a, b)| (a - b).abs())
                .sum();
            rank = next;
            if err < n_f * PAGERANK_TOLERANCE {
                return Some(rank);
            }
        }
        None
    }

    /// Brandes betweenness centrality (unweighted shortest paths),
    /// normalized for an undirected graph.
    fn betweenness(&self) -> Vec<f64> {
        let n = self.nodes.len();
        let mut centrality = vec![0.0f64; n];
        if n < 3 {
            return centrality;
        }

        for source in 0..n {
            let mut stack = Vec::new();
            let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
            let mut sigma = vec![0.0f64; n];
            let mut distance = vec![-1i64; n];
            sigma[source] = 1.0;
            distance[source] = 0;

            let mut queue = VecDeque::new();
            queue.push_back(source);
            while let Some(v) = queue.pop_front() {
                stack.push(v);
                for &w in self.edges[v].keys() {
                    if distance[w] < 0 {
                        distance[w] = distance[v] + 1;
                        queue.push_back(w);
                    }
                    if distance[w] == distance[v] + 1 {
                        sigma[w] += sigma[v];
                        predecessors[w].push(v);
                    }
                }
            }

            let mut delta = vec![0.0f64; n];
            while let Some(w) = stack.pop() {
                for &v in &predecessors[w] {
                    delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
                }
                if w != source {
                    centrality[w] += delta[w];
                }
            }
        }

        // Undirected: each pair counted twice; normalize to [0, 1].
        let scale = 1.0 / ((n - 1) as f64 * (n - 2) as f64);
        for value in &mut centrality {
            *value *= scale;
        }
        centrality
    }

    pub fn stats(&self) -> GraphStats {
        let mut by_type = BTreeMap::new();
        for node in &self.nodes {
            *by_type
                .entry(node.entity.entity_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        GraphStats {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            by_type,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use engram_types::EntityType;

    fn file(name: &str) -> Entity {
        Entity::new(EntityType::File, name)
    }

    #[test]
    fn test_empty_graph() {
        let mut graph = KnowledgeGraph::new();
        graph.compute_centrality();
        assert!(graph.is_empty());
        assert!(graph.neighborhood(&file("auth.py"), 2).is_empty());
    }

    #[test]
    fn test_co_mention_edges() {
        let mut graph = KnowledgeGraph::new();
        graph.add_memory("m1", &[file("auth.py"), file("jwt.py")]);
        graph.add_memory("m2", &[file("auth.py"), file("jwt.py")]);

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);

        // Weight accumulates across memories.
        let idx = graph.index[&entity_key(&file("auth.py"))];
        assert_eq!(graph.edges[idx].values().next().copied(), Some(2.0));
    }

    #[test]
    fn test_duplicate_mentions_in_one_memory() {
        let mut graph = KnowledgeGraph::new();
        graph.add_memory("m1", &[file("a.py"), file("a.py"), file("b.py")]);

        let node = graph.node(&file("a.py")).unwrap();
        assert_eq!(node.memory_ids, vec!["m1"]);
        let idx = graph.index[&entity_key(&file("a.py"))];
        assert_eq!(graph.edges[idx].values().next().copied(), Some(1.0));
    }

    #[test]
    fn test_hop_attenuation() {
        // a — b — c — d: from a, b is 1-hop, c is 2-hop, d unreachable at 2.
        let mut graph = KnowledgeGraph::new();
        graph.add_memory("m1", &[file("a"), file("b")]);
        graph.add_memory("m2", &[file("b"), file("c")]);
        graph.add_memory("m3", &[file("c"), file("d")]);

        let hood = graph.neighborhood(&file("a"), 2);
        assert_eq!(hood.get(&entity_key(&file("a"))), Some(&1.0));
        assert_eq!(hood.get(&entity_key(&file("b"))), Some(&0.5));
        assert_eq!(hood.get(&entity_key(&file("c"))), Some(&0.25));
        assert!(!hood.contains_key(&entity_key(&file("d"))));

        // Hops are capped at 2 even when more are requested.
        let hood = graph.neighborhood(&file("a"), 10);
        assert!(!hood.contains_key(&entity_key(&file("d"))));
    }

    #[test]
    fn test_related_memories_union() {
        let mut graph = KnowledgeGraph::new();
        graph.add_memory("m1", &[file("auth.py"), file("jwt.py")]);
        graph.add_memory("m2", &[file("jwt.py"), file("session.py")]);

        let related = graph.related_memories(&file("session.py"), 2);
        assert!(related.contains(&"m1".to_string()));
        assert!(related.contains(&"m2".to_string()));
        // Closest entity's memories come first.
        assert_eq!(related[0], "m2");
    }

    #[test]
    fn test_pagerank_favors_hub() {
        // Star: hub connected to three leaves.
        let mut graph = KnowledgeGraph::new();
        graph.add_memory("m1", &[file("hub"), file("a")]);
        graph.add_memory("m2", &[file("hub"), file("b")]);
        graph.add_memory("m3", &[file("hub"), file("c")]);
        graph.compute_centrality();

        let hub = graph.node(&file("hub")).unwrap();
        let leaf = graph.node(&file("a")).unwrap();
        assert!(hub.pagerank > leaf.pagerank);
        assert_eq!(hub.degree, 3);
        assert_eq!(leaf.degree, 1);

        // Ranks sum to ~1.
        let total: f64 = graph.nodes().iter().map(|node| node.pagerank).sum();
        assert!((total - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_pagerank_disconnected_components() {
        let mut graph = KnowledgeGraph::new();
        graph.add_memory("m1", &[file("a"), file("b")]);
        graph.add_memory("m2", &[file("x"), file("y")]);
        graph.compute_centrality();

        // Teleportation keeps every node's rank positive.
        for node in graph.nodes() {
            assert!(node.pagerank > 0.0);
        }
    }

    #[test]
    fn test_betweenness_bridge() {
        // Path a — bridge — b: the middle node carries all shortest paths.
        let mut graph = KnowledgeGraph::new();
        graph.add_memory("m1", &[file("a"), file("bridge")]);
        graph.add_memory("m2", &[file("bridge"), file("b")]);
        graph.compute_centrality();

        let bridge = graph.node(&file("bridge")).unwrap();
        let end = graph.node(&file("a")).unwrap();
        assert!(bridge.betweenness > end.betweenness);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut graph = KnowledgeGraph::new();
        graph.add_memory("m1", &[file("auth.py"), file("jwt.py")]);
        graph.compute_centrality();

        let json = serde_json::to_string(&graph).unwrap();
        let back: KnowledgeGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back.node_count(), 2);
        assert_eq!(back.edge_count(), 1);
        assert!(back.node(&file("auth.py")).is_some());
        let hood = back.neighborhood(&file("auth.py"), 1);
        assert_eq!(hood.get(&entity_key(&file("jwt.py"))), Some(&0.5));
    }
}
