//! Task-context-aware importance scoring.
//!
//! Given the entities of the current query, graph proximity boosts the
//! importance of candidate memories: an exact entity match counts 1.0, a
//! 1-hop neighbor 0.5, a 2-hop neighbor 0.25. The boost is capped so task
//! relevance can at most triple a memory's base importance, and the stored
//! importance is never mutated.

use std::collections::HashMap;

use engram_memory::{entity_key, KnowledgeGraph};
use engram_types::{Entity, Memory};

use crate::entities;

/// Per-entity mention frequency cap inside one memory.
const FREQ_CAP: usize = 3;
/// Upper bound on the summed task boost.
const BOOST_CLIP: f32 = 2.0;
/// Maximum graph hops considered.
const MAX_HOPS: usize = 2;

/// Result of task-scoring one memory.
#[derive(Debug, Clone)]
pub struct TaskScore {
    /// `base_importance · (1 + boost)`. Never persisted.
    pub task_importance: f32,
    /// The clipped boost in `[0, 2]`.
    pub boost: f32,
    /// Canonical forms of the entities that matched, for display.
    pub matched: Vec<String>,
}

/// Scores memories against the current task's entity neighborhood.
pub struct TaskContextScorer<'a> {
    graph: &'a KnowledgeGraph,
}

impl<'a> TaskContextScorer<'a> {
    pub fn new(graph: &'a KnowledgeGraph) -> Self {
        Self { graph }
    }

    /// Relevance map for a query: entity key → hop attenuation, maximized
    /// over all query entities.
    pub fn query_relevance(&self, query: &str) -> HashMap<String, f32> {
        let query_entities = entities::extract(query);
        self.relevance_of(&query_entities)
    }

    /// Relevance map for pre-extracted entities.
    pub fn relevance_of(&self, query_entities: &[Entity]) -> HashMap<String, f32> {
        let mut relevance: HashMap<String, f32> = HashMap::new();
        for entity in query_entities {
            for (key, attenuation) in self.graph.neighborhood(entity, MAX_HOPS) {
                relevance
                    .entry(key)
                    .and_modify(|r| *r = r.max(attenuation))
                    .or_insert(attenuation);
            }
        }
        relevance
    }

    /// Compute the task-conditional importance of a memory.
    ///
    /// `task_boost = Σ over memory entities of relevance(e) · freq(e)`,
    /// with freq capped at 3 mentions and the sum clipped to [0, 2].
    pub fn score(&self, memory: &Memory, relevance: &HashMap<String, f32>) -> TaskScore {
        if relevance.is_empty() {
            return TaskScore {
                task_importance: memory.importance,
                boost: 0.0,
                matched: Vec::new(),
            };
        }

        let text = format!("{} {} {}", memory.intent, memory.action, memory.outcome)
            .to_lowercase();
        let mut boost = 0.0f32;
        let mut matched = Vec::new();

        for entity in entities::extract_from_memory(memory) {
            let Some(&rel) = relevance.get(&entity_key(&entity)) else {
                continue;
            };
            let freq = text.matches(&entity.canonical_form).count().clamp(1, FREQ_CAP);
            boost += rel * freq as f32;
            matched.push(entity.canonical_form);
        }

        let boost = boost.clamp(0.0, BOOST_CLIP);
        TaskScore {
            task_importance: memory.importance * (1.0 + boost),
            boost,
            matched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_types::{Artifacts, EntityType, MemoryFlags};

    fn memory(intent: &str, action: &str, files: &[&str], importance: f32) -> Memory {
        Memory {
            id: format!("m-{intent}"),
            session_id: "s".into(),
            timestamp: engram_types::now(),
            chunk_index: 0,
            intent: intent.into(),
            action: action.into(),
            outcome: String::new(),
            importance,
            artifacts: Artifacts {
                files: files.iter().map(|f| f.to_string()).collect(),
                ..Default::default()
            },
            flags: MemoryFlags::default(),
            embedding: vec![],
            embedded_text: String::new(),
        }
    }

    fn graph_of(memories: &[&Memory]) -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        for m in memories {
            graph.add_memory(&m.id, &entities::extract_from_memory(m));
        }
        graph.compute_centrality();
        graph
    }

    #[test]
    fn test_exact_match_boosts() {
        let m = memory("fix auth", "edited auth.py", &["auth.py"], 10.0);
        let graph = graph_of(&[&m]);
        let scorer = TaskContextScorer::new(&graph);

        let relevance = scorer.query_relevance("fix bug in auth.py");
        let score = scorer.score(&m, &relevance);
        assert!(score.boost > 0.0);
        assert!(score.task_importance > 10.0);
        assert!(score.matched.iter().any(|e| e == "auth.py"));
    }

    #[test]
    fn test_no_entities_no_boost() {
        let m = memory("fix auth", "edited auth.py", &["auth.py"], 10.0);
        let graph = graph_of(&[&m]);
        let scorer = TaskContextScorer::new(&graph);

        let relevance = scorer.query_relevance("discuss favorite colors");
        let score = scorer.score(&m, &relevance);
        assert_eq!(score.boost, 0.0);
        assert_eq!(score.task_importance, 10.0);
    }

    #[test]
    fn test_one_hop_boost_is_half() {
        // M1 touches {auth.py, jwt.py}; M2 touches {jwt.py, session.py}.
        // A session.py query reaches auth.py at 2 hops via jwt.py.
        let m1 = memory("auth work", "edited auth.py and jwt.py", &["auth.py", "jwt.py"], 10.0);
        let m2 = memory(
            "session work",
            "edited jwt.py and session.py",
            &["jwt.py", "session.py"],
            10.0,
        );
        let graph = graph_of(&[&m1, &m2]);
        let scorer = TaskContextScorer::new(&graph);

        let relevance = scorer.query_relevance("changes to session.py");
        // session.py exact (1.0), jwt.py 1-hop (0.5), auth.py 2-hop (0.25).
        let key = |name: &str| entity_key(&Entity::new(EntityType::File, name));
        assert_eq!(relevance.get(&key("session.py")), Some(&1.0));
        assert_eq!(relevance.get(&key("jwt.py")), Some(&0.5));
        assert_eq!(relevance.get(&key("auth.py")), Some(&0.25));

        let s2 = scorer.score(&m2, &relevance);
        let s1 = scorer.score(&m1, &relevance);
        // M2 contains the exact entity; M1 only reaches it through hops.
        assert!(s2.task_importance > s1.task_importance);
        assert!(s1.boost > 0.0);
    }

    #[test]
    fn test_boost_clipped_at_two() {
        let files: Vec<String> = (0..30).map(|i| format!("f{i}.rs")).collect();
        let file_refs: Vec<&str> = files.iter().map(String::as_str).collect();
        let action = files.join(" ");
        let m = memory("touch everything", &action, &file_refs, 10.0);
        let graph = graph_of(&[&m]);
        let scorer = TaskContextScorer::new(&graph);

        let relevance = scorer.query_relevance(&action);
        let score = scorer.score(&m, &relevance);
        assert!(score.boost <= 2.0);
        assert!(score.task_importance <= 30.0 + 1e-3);
    }

    #[test]
    fn test_base_importance_not_mutated() {
        let m = memory("fix auth", "edited auth.py", &["auth.py"], 10.0);
        let graph = graph_of(&[&m]);
        let scorer = TaskContextScorer::new(&graph);
        let relevance = scorer.query_relevance("auth.py");
        let _ = scorer.score(&m, &relevance);
        assert_eq!(m.importance, 10.0);
    }
}
