//! PreCompact ingestion pipeline.
//!
//! Orchestrates: transcript load → chunking → per-chunk enrichment
//! (artifacts, importance, entities) → contextual embedding → one atomic
//! store batch → knowledge graph refresh → opportunistic prune → optional
//! clustering.
//!
//! The pipeline is best-effort background augmentation. The top-level entry
//! point never panics across the hook boundary: fatal problems become a
//! structured error output, non-fatal ones are logged and absorbed, and
//! the host's own flow is never blocked either way.

use std::sync::Arc;

use tracing::{debug, info, warn};

use engram_embed::{SharedEmbedder, embedded_text};
use engram_memory::{GraphCache, MemoryStore};
use engram_types::{Memory, PreCompactEvent, PreCompactOutput, memory_id};

use crate::chunker::{Chunker, ChunkerConfig};
use crate::cluster::{ClusterConfig, cluster_session};
use crate::error::Result;
use crate::prune::{PrunePolicy, Pruner};
use crate::score::{ImportanceScorer, ScorerWeights};
use crate::transcript::{MAX_TRANSCRIPT_MESSAGES, load_transcript};
use crate::{artifacts, knowledge};

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

/// PreCompact pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Transcript window bound; older messages beyond it are dropped.
    pub max_transcript_messages: usize,
    /// Run a prune sweep after ingestion.
    pub auto_prune: bool,
    /// Recompute session clusters after ingestion.
    pub cluster: bool,
    pub chunker: ChunkerConfig,
    pub weights: ScorerWeights,
    pub prune: PrunePolicy,
    pub cluster_config: ClusterConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_transcript_messages: MAX_TRANSCRIPT_MESSAGES,
            auto_prune: true,
            cluster: true,
            chunker: ChunkerConfig::default(),
            weights: ScorerWeights::default(),
            prune: PrunePolicy::default(),
            cluster_config: ClusterConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// The transcript-ingestion pipeline.
pub struct PreCompactPipeline {
    store: Arc<MemoryStore>,
    embedder: SharedEmbedder,
    cache: Option<GraphCache>,
    config: PipelineConfig,
}

impl PreCompactPipeline {
    pub fn new(
        store: Arc<MemoryStore>,
        embedder: SharedEmbedder,
        cache: Option<GraphCache>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            cache,
            config,
        }
    }

    /// Handle one PreCompact event. Never fails across the hook boundary.
    pub async fn run(&self, event: &PreCompactEvent) -> PreCompactOutput {
        match self.run_inner(event).await {
            Ok((stored, pruned)) => {
                info!(
                    session = %event.session_id,
                    stored, pruned, "PreCompact ingestion complete"
                );
                PreCompactOutput::ok(stored, pruned)
            }
            Err(e) => {
                warn!(session = %event.session_id, error = %e, "PreCompact ingestion failed");
                PreCompactOutput::error(e.to_string())
            }
        }
    }

    async fn run_inner(&self, event: &PreCompactEvent) -> Result<(usize, usize)> {
        let messages = load_transcript(&event.transcript_path, self.config.max_transcript_messages)?;
        let chunks = Chunker::new(self.config.chunker.clone()).chunk(&messages);
        if chunks.is_empty() {
            debug!("No chunks produced; nothing to store");
            return Ok((0, 0));
        }

        let scorer = ImportanceScorer::new(self.config.weights.clone());
        let timestamp = engram_types::now();
        let mut memories: Vec<Memory> = Vec::with_capacity(chunks.len());

        for (index, chunk) in chunks.iter().enumerate() {
            let index = index as u32;
            let id = memory_id(&event.session_id, index, &chunk.intent);

            // Re-ingesting the same transcript reproduces the same IDs;
            // already-stored chunks are skipped so re-runs are idempotent.
            if self.store.get(&id)?.is_some() {
                debug!("Memory {id} already stored; skipping chunk {index}");
                continue;
            }

            let (chunk_artifacts, mut flags) = artifacts::extract(&chunk.combined_text());
            flags.success = chunk.success;
            let importance = scorer.score(chunk, &chunk_artifacts, 0.0);

            let text = embedded_text(
                &event.session_id,
                timestamp,
                &chunk_artifacts.files,
                &chunk.intent,
                &chunk.action_full,
                &chunk.outcome,
            );

            // A lone user message has no action; the stored row still needs
            // one for the non-empty invariant.
            let action = if chunk.action.is_empty() {
                "No assistant response recorded".to_string()
            } else {
                chunk.action.clone()
            };

            memories.push(Memory {
                id,
                session_id: event.session_id.clone(),
                timestamp,
                chunk_index: index,
                intent: chunk.intent.clone(),
                action,
                outcome: chunk.outcome.clone(),
                importance,
                artifacts: chunk_artifacts,
                flags,
                embedding: Vec::new(),
                embedded_text: text,
            });
        }

        if memories.is_empty() {
            return Ok((0, 0));
        }

        // Embed the whole batch; one retry before giving up with the store
        // untouched.
        let texts: Vec<&str> = memories.iter().map(|m| m.embedded_text.as_str()).collect();
        let embeddings = match self.embedder.embed_batch(&texts).await {
            Ok(embeddings) => embeddings,
            Err(first) => {
                warn!("Embedding batch failed ({first}); retrying once");
                self.embedder.embed_batch(&texts).await?
            }
        };
        for (memory, embedding) in memories.iter_mut().zip(embeddings) {
            memory.embedding = embedding;
        }

        let stored = self.store.put_batch(&memories)?;

        // Graph refresh: merge the new memories into a fresh snapshot, or
        // rebuild outright when the cache has expired. Graph trouble only
        // costs ranking quality, so it never fails the ingestion.
        self.refresh_graph(&memories);

        let pruned = if self.config.auto_prune {
            match Pruner::new(self.config.prune.clone()).sweep(
                &self.store,
                self.cache.as_ref(),
                false,
            ) {
                Ok(report) => report.total_pruned,
                Err(e) => {
                    warn!("Prune sweep failed: {e}");
                    0
                }
            }
        } else {
            0
        };

        if self.config.cluster {
            self.refresh_clusters(&event.session_id);
        }

        Ok((stored, pruned))
    }

    fn refresh_graph(&self, new_memories: &[Memory]) {
        let graph = match self.cache.as_ref().and_then(|cache| cache.load()) {
            Some(mut graph) => {
                for memory in new_memories {
                    let entities = crate::entities::extract_from_memory(memory);
                    if !entities.is_empty() {
                        graph.add_memory(&memory.id, &entities);
                    }
                }
                graph.compute_centrality();
                graph
            }
            None => match knowledge::build_graph(&self.store) {
                Ok(graph) => graph,
                Err(e) => {
                    warn!("Graph rebuild failed: {e}");
                    return;
                }
            },
        };

        if let Some(cache) = &self.cache
            && let Err(e) = cache.store(&graph)
        {
            warn!("Failed to persist graph snapshot: {e}");
        }
    }

    fn refresh_clusters(&self, session_id: &str) {
        match cluster_session(&self.store, session_id, &self.config.cluster_config) {
            Ok(clusters) => {
                let labels: std::collections::BTreeMap<&str, usize> = clusters
                    .iter()
                    .flat_map(|c| c.memory_ids.iter().map(move |id| (id.as_str(), c.label)))
                    .collect();
                match serde_json::to_string(&labels) {
                    Ok(json) => {
                        if let Err(e) = self
                            .store
                            .set_meta(&format!("clusters.{session_id}"), &json)
                        {
                            warn!("Failed to store cluster labels: {e}");
                        }
                    }
                    Err(e) => warn!("Failed to serialize cluster labels: {e}"),
                }
                debug!("Clustered session {session_id} into {} groups", clusters.len());
            }
            Err(e) => warn!("Clustering failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_embed::MockEmbedder;
    use engram_types::CompactTrigger;
    use serial_test::serial;
    use std::io::Write;

    fn write_transcript(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    fn pipeline(store: Arc<MemoryStore>) -> PreCompactPipeline {
        PreCompactPipeline::new(
            store,
            Arc::new(MockEmbedder::new(384)),
            None,
            PipelineConfig::default(),
        )
    }

    fn event(session: &str, path: &str) -> PreCompactEvent {
        PreCompactEvent {
            session_id: session.into(),
            transcript_path: path.into(),
            hook_event_name: "PreCompact".into(),
            trigger: CompactTrigger::Auto,
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_transcript_is_error() {
        let store = Arc::new(MemoryStore::open_in_memory(384).unwrap());
        let output = pipeline(store)
            .run(&event("s1", "/nonexistent/file.jsonl"))
            .await;
        assert_eq!(output.status, engram_types::HookStatus::Error);
        assert!(output.error.is_some());
    }

    #[tokio::test]
    #[serial]
    async fn test_empty_transcript_is_ok() {
        let store = Arc::new(MemoryStore::open_in_memory(384).unwrap());
        let file = write_transcript(&[]);
        let output = pipeline(store.clone())
            .run(&event("s1", file.path().to_str().unwrap()))
            .await;
        assert_eq!(output.status, engram_types::HookStatus::Ok);
        assert_eq!(output.memories_stored, 0);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    #[serial]
    async fn test_basic_ingestion() {
        let store = Arc::new(MemoryStore::open_in_memory(384).unwrap());
        let file = write_transcript(&[
            r#"{"role": "user", "content": "implement JWT auth in auth.py"}"#,
            r#"{"role": "assistant", "content": "Created auth.py with JWT validation:\n```python\ndef validate(token):\n    return True\n```\nAll tests pass."}"#,
        ]);

        let output = pipeline(store.clone())
            .run(&event("s1", file.path().to_str().unwrap()))
            .await;

        assert_eq!(output.status, engram_types::HookStatus::Ok);
        assert_eq!(output.memories_stored, 1);

        let memories = store.scan(None).unwrap();
        let memory = &memories[0];
        assert!(memory.importance >= 10.0, "importance {}", memory.importance);
        assert!(memory.flags.has_files);
        assert!(memory.flags.has_code);
        assert!(memory.flags.success);
        assert_eq!(memory.artifacts.files, vec!["auth.py"]);
        assert!(memory.embedded_text.starts_with("Session "));
        assert_eq!(memory.embedding.len(), 384);
    }

    #[tokio::test]
    #[serial]
    async fn test_reingestion_is_idempotent() {
        let store = Arc::new(MemoryStore::open_in_memory(384).unwrap());
        let file = write_transcript(&[
            r#"{"role": "user", "content": "fix the login bug"}"#,
            r#"{"role": "assistant", "content": "Fixed the bug. Done."}"#,
        ]);
        let pipe = pipeline(store.clone());
        let path = file.path().to_str().unwrap();

        let first = pipe.run(&event("s1", path)).await;
        assert_eq!(first.memories_stored, 1);

        let second = pipe.run(&event("s1", path)).await;
        assert_eq!(second.status, engram_types::HookStatus::Ok);
        assert_eq!(second.memories_stored, 0);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[tokio::test]
    #[serial]
    async fn test_ids_are_stable_across_runs() {
        let store_a = Arc::new(MemoryStore::open_in_memory(384).unwrap());
        let store_b = Arc::new(MemoryStore::open_in_memory(384).unwrap());
        let file = write_transcript(&[
            r#"{"role": "user", "content": "fix the login bug"}"#,
            r#"{"role": "assistant", "content": "Fixed. Done."}"#,
        ]);
        let path = file.path().to_str().unwrap();

        pipeline(store_a.clone()).run(&event("s1", path)).await;
        pipeline(store_b.clone()).run(&event("s1", path)).await;

        let a = store_a.scan(None).unwrap();
        let b = store_b.scan(None).unwrap();
        assert_eq!(a[0].id, b[0].id);
    }
}
