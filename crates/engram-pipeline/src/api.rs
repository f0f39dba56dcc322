//! Programmatic query interface for the CLI and benchmark harnesses.

use std::sync::Arc;

use engram_embed::SharedEmbedder;
use engram_memory::{MemoryFilter, MemoryStore, QueryMatch, StoreStats};
use engram_types::Memory;

use crate::cluster::{Cluster, ClusterConfig, cluster_session};
use crate::error::Result;

/// Read-only query surface over the store.
pub struct QueryApi {
    store: Arc<MemoryStore>,
    embedder: SharedEmbedder,
}

impl QueryApi {
    pub fn new(store: Arc<MemoryStore>, embedder: SharedEmbedder) -> Self {
        Self { store, embedder }
    }

    /// Semantic search by topic.
    pub async fn search(
        &self,
        topic: &str,
        k: usize,
        min_importance: f32,
        session: Option<&str>,
    ) -> Result<Vec<QueryMatch>> {
        let query_vec = self.embedder.embed(topic).await?;
        let mut filter = MemoryFilter::new().with_min_importance(min_importance);
        if let Some(session) = session {
            filter = filter.with_session(session);
        }
        Ok(self.store.query(&query_vec, k, Some(&filter))?)
    }

    /// Keyword search: a memory matches when any keyword appears in its
    /// intent, action, outcome, or file list (case-insensitive). Results
    /// are ordered by importance, highest first.
    pub fn keyword_search(
        &self,
        keywords: &[String],
        k: usize,
        min_importance: f32,
        session: Option<&str>,
    ) -> Result<Vec<Memory>> {
        let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        let mut filter = MemoryFilter::new().with_min_importance(min_importance);
        if let Some(session) = session {
            filter = filter.with_session(session);
        }

        let mut matches: Vec<Memory> = self
            .store
            .scan(Some(&filter))?
            .into_iter()
            .filter(|memory| {
                let haystack = format!(
                    "{} {} {} {}",
                    memory.intent,
                    memory.action,
                    memory.outcome,
                    memory.artifacts.files.join(" ")
                )
                .to_lowercase();
                lowered.iter().any(|kw| haystack.contains(kw))
            })
            .collect();

        matches.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);
        Ok(matches)
    }

    /// Store statistics.
    pub fn stats(&self) -> Result<StoreStats> {
        Ok(self.store.stats()?)
    }

    /// Export all memories matching a filter.
    pub fn export(&self, filter: &MemoryFilter) -> Result<Vec<Memory>> {
        Ok(self.store.scan(Some(filter))?)
    }

    /// Cluster one session's memories for a topical summary.
    pub fn clusters(&self, session: &str) -> Result<Vec<Cluster>> {
        cluster_session(&self.store, session, &ClusterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_embed::MockEmbedder;
    use engram_types::{Artifacts, MemoryFlags, memory_id};
    use serial_test::serial;

    async fn seeded_api() -> QueryApi {
        let store = Arc::new(MemoryStore::open_in_memory(384).unwrap());
        let embedder: SharedEmbedder = Arc::new(MockEmbedder::new(384));

        let mut memories = Vec::new();
        for (i, (intent, importance, files)) in [
            ("fix JWT token validation in auth.py", 12.0, vec!["auth.py"]),
            ("style the landing page header", 6.0, vec!["app.css"]),
        ]
        .into_iter()
        .enumerate()
        {
            let text = format!("Session s1. {intent}");
            let embedding = embedder.embed(&text).await.unwrap();
            memories.push(Memory {
                id: memory_id("s1", i as u32, intent),
                session_id: "s1".into(),
                timestamp: engram_types::now(),
                chunk_index: i as u32,
                intent: intent.into(),
                action: "worked on it".into(),
                outcome: "done".into(),
                importance,
                artifacts: Artifacts {
                    files: files.into_iter().map(String::from).collect(),
                    ..Default::default()
                },
                flags: MemoryFlags::default(),
                embedding,
                embedded_text: text,
            });
        }
        store.put_batch(&memories).unwrap();
        QueryApi::new(store, embedder)
    }

    #[tokio::test]
    #[serial]
    async fn test_search_ranks_by_topic() {
        let api = seeded_api().await;
        let results = api.search("JWT auth token work", 10, 0.0, None).await.unwrap();
        assert!(!results.is_empty());
        assert!(results[0].memory.intent.contains("JWT"));
    }

    #[tokio::test]
    #[serial]
    async fn test_keyword_search() {
        let api = seeded_api().await;
        let results = api
            .keyword_search(&["auth.py".to_string()], 10, 0.0, None)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].intent.contains("JWT"));

        let none = api
            .keyword_search(&["nonexistent".to_string()], 10, 0.0, None)
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_keyword_search_min_importance() {
        let api = seeded_api().await;
        let results = api
            .keyword_search(&["the".to_string()], 10, 10.0, None)
            .unwrap();
        assert!(results.iter().all(|m| m.importance >= 10.0));
    }

    #[tokio::test]
    #[serial]
    async fn test_stats_and_export() {
        let api = seeded_api().await;
        let stats = api.stats().unwrap();
        assert_eq!(stats.total, 2);

        let exported = api
            .export(&MemoryFilter::new().with_min_importance(10.0))
            .unwrap();
        assert_eq!(exported.len(), 1);
    }
}
