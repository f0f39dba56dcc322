//! Agglomerative memory clustering.
//!
//! Groups one session's memories by embedding similarity: average linkage,
//! cosine distance, merging until no pair of clusters is closer than the
//! distance threshold. Labels are derived data for CLI summaries only and
//! never feed back into retrieval.

use std::collections::HashMap;

use serde::Serialize;

use engram_embed::cosine_similarity;
use engram_memory::MemoryStore;
use engram_types::Memory;

use crate::error::Result;

/// Clustering parameters.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Stop merging when the closest pair is farther than this.
    pub distance_threshold: f32,
    /// Keywords per cluster summary.
    pub summary_keywords: usize,
    /// Files per cluster summary.
    pub summary_files: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            distance_threshold: 0.4,
            summary_keywords: 5,
            summary_files: 3,
        }
    }
}

/// One cluster of related memories.
#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    pub label: usize,
    pub memory_ids: Vec<String>,
    /// Topic keywords plus involved files, for display.
    pub summary: String,
}

/// Cluster a session's memories.
///
/// Sessions with fewer than two memories yield one trivial cluster per
/// memory.
pub fn cluster_session(
    store: &MemoryStore,
    session_id: &str,
    config: &ClusterConfig,
) -> Result<Vec<Cluster>> {
    let filter = engram_memory::MemoryFilter::new().with_session(session_id);
    let memories = store.scan(Some(&filter))?;
    Ok(cluster_memories(&memories, config))
}

/// Agglomerative clustering over in-memory embeddings.
pub fn cluster_memories(memories: &[Memory], config: &ClusterConfig) -> Vec<Cluster> {
    if memories.is_empty() {
        return Vec::new();
    }

    // Each memory starts as its own cluster of indices.
    let mut clusters: Vec<Vec<usize>> = (0..memories.len()).map(|i| vec![i]).collect();

    // Pairwise cosine distances between members.
    let distance = |a: usize, b: usize| -> f32 {
        1.0 - cosine_similarity(&memories[a].embedding, &memories[b].embedding)
    };

    loop {
        let mut best: Option<(usize, usize, f32)> = None;
        for i in 0..clusters.len() {
            for j in (i + 1)..clusters.len() {
                // Average linkage: mean pairwise distance across clusters.
                let mut sum = 0.0f32;
                let mut count = 0usize;
                for &a in &clusters[i] {
                    for &b in &clusters[j] {
                        sum += distance(a, b);
                        count += 1;
                    }
                }
                let avg = sum / count as f32;
                if best.is_none_or(|(_, _, d)| avg < d) {
                    best = Some((i, j, avg));
                }
            }
        }

        match best {
            Some((i, j, d)) if d < config.distance_threshold => {
                let merged = clusters.remove(j);
                clusters[i].extend(merged);
            }
            _ => break,
        }
    }

    clusters
        .into_iter()
        .enumerate()
        .map(|(label, members)| {
            let member_memories: Vec<&Memory> = members.iter().map(|&i| &memories[i]).collect();
            Cluster {
                label,
                memory_ids: member_memories.iter().map(|m| m.id.clone()).collect(),
                summary: summarize(&member_memories, config),
            }
        })
        .collect()
}

/// Topic keywords (by frequency, words longer than 4 chars) plus involved
/// files.
fn summarize(memories: &[&Memory], config: &ClusterConfig) -> String {
    let mut word_freq: HashMap<String, usize> = HashMap::new();
    for memory in memories {
        let text = format!("{} {}", memory.intent, memory.action).to_lowercase();
        for word in text.split(|c: char| !c.is_alphanumeric()) {
            if word.len() > 4 {
                *word_freq.entry(word.to_string()).or_insert(0) += 1;
            }
        }
    }
    let mut ranked: Vec<(String, usize)> = word_freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let keywords: Vec<String> = ranked
        .into_iter()
        .take(config.summary_keywords)
        .map(|(w, _)| w)
        .collect();

    let mut files: Vec<&str> = Vec::new();
    for memory in memories {
        for file in &memory.artifacts.files {
            if !files.contains(&file.as_str()) {
                files.push(file);
            }
            if files.len() >= config.summary_files {
                break;
            }
        }
    }

    let mut parts = Vec::new();
    if !keywords.is_empty() {
        parts.push(format!("Topics: {}", keywords.join(", ")));
    }
    if !files.is_empty() {
        parts.push(format!("Files: {}", files.join(", ")));
    }
    if parts.is_empty() {
        "General work".to_string()
    } else {
        parts.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_types::{Artifacts, MemoryFlags};

    fn memory(id: &str, intent: &str, embedding: Vec<f32>, files: &[&str]) -> Memory {
        Memory {
            id: id.into(),
            session_id: "s".into(),
            timestamp: engram_types::now(),
            chunk_index: 0,
            intent: intent.into(),
            action: "action text".into(),
            outcome: String::new(),
            importance: 5.0,
            artifacts: Artifacts {
                files: files.iter().map(|f| f.to_string()).collect(),
                ..Default::default()
            },
            flags: MemoryFlags::default(),
            embedding,
            embedded_text: String::new(),
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(cluster_memories(&[], &ClusterConfig::default()).is_empty());
    }

    #[test]
    fn test_single_memory_single_cluster() {
        let memories = vec![memory("m1", "auth work", vec![1.0, 0.0, 0.0, 0.0], &[])];
        let clusters = cluster_memories(&memories, &ClusterConfig::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].memory_ids, vec!["m1"]);
    }

    #[test]
    fn test_two_groups_separate() {
        let memories = vec![
            memory("a1", "auth tokens", vec![1.0, 0.0, 0.0, 0.0], &["auth.py"]),
            memory("a2", "auth sessions", vec![0.95, 0.05, 0.0, 0.0], &["auth.py"]),
            memory("b1", "frontend styling", vec![0.0, 0.0, 1.0, 0.0], &["app.css"]),
        ];
        let clusters = cluster_memories(&memories, &ClusterConfig::default());
        assert_eq!(clusters.len(), 2);

        let auth_cluster = clusters
            .iter()
            .find(|c| c.memory_ids.contains(&"a1".to_string()))
            .unwrap();
        assert!(auth_cluster.memory_ids.contains(&"a2".to_string()));
        assert!(!auth_cluster.memory_ids.contains(&"b1".to_string()));
    }

    #[test]
    fn test_summary_mentions_files_and_topics() {
        let memories = vec![
            memory("a1", "tokens tokens tokens", vec![1.0, 0.0, 0.0, 0.0], &["auth.py"]),
            memory("a2", "tokens refresh", vec![0.98, 0.02, 0.0, 0.0], &["auth.py"]),
        ];
        let clusters = cluster_memories(&memories, &ClusterConfig::default());
        assert_eq!(clusters.len(), 1);
        assert!(clusters[0].summary.contains("tokens"));
        assert!(clusters[0].summary.contains("auth.py"));
    }
}
