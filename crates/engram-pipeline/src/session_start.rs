//! SessionStart retrieval pipeline.
//!
//! Produces the adaptive-K memory injection for a new session: semantic
//! candidates are quality-gated on similarity, re-ranked with graph-based
//! task importance, and topped with the most recent memories for temporal
//! continuity ("where you left off"). The quality gate may leave zero
//! semantic matches; the result is never padded to a fixed count.

use std::sync::Arc;

use tracing::{debug, info, warn};

use engram_embed::SharedEmbedder;
use engram_memory::{GraphCache, MemoryFilter, MemoryStore};
use engram_types::{Memory, SessionStartEvent, SessionStartOutput};

use crate::error::Result;
use crate::knowledge;
use crate::task_context::TaskContextScorer;

// ─────────────────────────────────────────────────────────────────────────────
// Config & Types
// ─────────────────────────────────────────────────────────────────────────────

/// Retrieval tuning knobs.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Maximum memories returned by ranking (K is adaptive, never padded).
    pub k_max: usize,
    /// Most-recent memories prepended regardless of query.
    pub k_recent: usize,
    /// Candidates below this importance are not considered.
    pub min_importance: f32,
    /// The quality gate: candidates below this similarity are discarded.
    pub min_similarity: f32,
    /// Weight of similarity in the final score.
    pub alpha: f32,
    /// Weight of normalized task importance in the final score.
    pub beta: f32,
    /// Restrict retrieval to one session. Default `None`: retrieval is
    /// cross-session.
    pub session_filter: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_max: 20,
            k_recent: 4,
            min_importance: 5.0,
            min_similarity: 0.35,
            alpha: 0.6,
            beta: 0.4,
            session_filter: None,
        }
    }
}

/// One retrieved memory with its scoring breakdown.
#[derive(Debug, Clone)]
pub struct RetrievedMemory {
    pub memory: Memory,
    /// Cosine similarity to the query (0 for recent-prepend entries).
    pub similarity: f32,
    /// Query-conditional importance; never persisted.
    pub task_importance: f32,
    /// Task boost in [0, 2].
    pub task_boost: f32,
    /// Entities that connected this memory to the query.
    pub matched_entities: Vec<String>,
    /// True for the temporal-continuity prepend; these bypass the quality
    /// gate and are marked distinctly in the output.
    pub recent: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Retriever
// ─────────────────────────────────────────────────────────────────────────────

/// The SessionStart retrieval pipeline. Read-only with respect to memories;
/// may refresh the graph snapshot when it has gone stale.
pub struct SessionStartRetriever {
    store: Arc<MemoryStore>,
    embedder: SharedEmbedder,
    cache: Option<GraphCache>,
    config: RetrievalConfig,
}

impl SessionStartRetriever {
    pub fn new(
        store: Arc<MemoryStore>,
        embedder: SharedEmbedder,
        cache: Option<GraphCache>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            cache,
            config,
        }
    }

    /// Handle one SessionStart event. Never fails across the hook boundary:
    /// any internal error degrades to an empty injection.
    pub async fn run(&self, event: &SessionStartEvent) -> SessionStartOutput {
        match self.retrieve(&event.task_query).await {
            Ok(results) => {
                info!(
                    session = %event.session_id,
                    injected = results.len(),
                    "SessionStart retrieval complete"
                );
                SessionStartOutput {
                    additional_context: format_context(&results),
                    memories_injected: results.len(),
                }
            }
            Err(e) => {
                warn!(session = %event.session_id, error = %e, "Retrieval failed; injecting nothing");
                SessionStartOutput {
                    additional_context: String::new(),
                    memories_injected: 0,
                }
            }
        }
    }

    /// Run the retrieval algorithm for a task query.
    ///
    /// Result order: recent prepend first (newest first), then ranked
    /// semantic matches. `|result| ≤ k_recent + k_max`, and may be zero.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedMemory>> {
        let semantic = self.semantic_matches(query).await?;

        // Temporal continuity: the most recent memories, regardless of the
        // query, deduplicated against the ranked set.
        let semantic_ids: Vec<&str> = semantic.iter().map(|r| r.memory.id.as_str()).collect();
        let mut results: Vec<RetrievedMemory> = self
            .store
            .recent(
                self.config.k_recent,
                self.config.session_filter.as_deref(),
            )?
            .into_iter()
            .filter(|m| m.importance >= self.config.min_importance)
            .filter(|m| !semantic_ids.contains(&m.id.as_str()))
            .map(|memory| RetrievedMemory {
                memory,
                similarity: 0.0,
                task_importance: 0.0,
                task_boost: 0.0,
                matched_entities: Vec::new(),
                recent: true,
            })
            .collect();

        results.extend(semantic);
        Ok(results)
    }

    async fn semantic_matches(&self, query: &str) -> Result<Vec<RetrievedMemory>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        // Queries are embedded without the contextual prefix.
        let query_vec = self.embedder.embed(query).await?;
        let mut filter = MemoryFilter::new().with_min_importance(self.config.min_importance);
        if let Some(ref session) = self.config.session_filter {
            filter = filter.with_session(session.clone());
        }

        let candidates =
            self.store
                .query(&query_vec, self.config.k_max * 2, Some(&filter))?;

        // The quality gate. Zero survivors is a valid outcome.
        let survivors: Vec<_> = candidates
            .into_iter()
            .filter(|c| c.similarity >= self.config.min_similarity)
            .collect();
        debug!(
            "Quality gate kept {} candidates (min similarity {})",
            survivors.len(),
            self.config.min_similarity
        );
        if survivors.is_empty() {
            return Ok(Vec::new());
        }

        // Task-context scoring against the graph neighborhood of the query.
        let graph = knowledge::get_or_build(&self.store, self.cache.as_ref())?;
        let scorer = TaskContextScorer::new(&graph);
        let relevance = scorer.query_relevance(query);

        let mut scored: Vec<RetrievedMemory> = survivors
            .into_iter()
            .map(|candidate| {
                let task = scorer.score(&candidate.memory, &relevance);
                RetrievedMemory {
                    similarity: candidate.similarity,
                    task_importance: task.task_importance,
                    task_boost: task.boost,
                    matched_entities: task.matched,
                    recent: false,
                    memory: candidate.memory,
                }
            })
            .collect();

        // Final score: α·similarity + β·normalized task importance.
        let max_task = scored
            .iter()
            .map(|r| r.task_importance)
            .fold(0.0f32, f32::max);
        let final_score = |r: &RetrievedMemory| {
            let normalized = if max_task > 0.0 {
                r.task_importance / max_task
            } else {
                0.0
            };
            self.config.alpha * r.similarity + self.config.beta * normalized
        };
        scored.sort_by(|a, b| {
            final_score(b)
                .partial_cmp(&final_score(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // Adaptive K: cap at k_max, never pad.
        scored.truncate(self.config.k_max);
        Ok(scored)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Formatting
// ─────────────────────────────────────────────────────────────────────────────

/// Render the injection block: short summaries with importance indicators,
/// never full transcripts.
pub fn format_context(results: &[RetrievedMemory]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut out = String::from("# Memory context restored\n\n");

    let recents: Vec<&RetrievedMemory> = results.iter().filter(|r| r.recent).collect();
    let relevant: Vec<&RetrievedMemory> = results.iter().filter(|r| !r.recent).collect();

    if !recents.is_empty() {
        out.push_str("## ⏪ Recent work\n\n");
        for (i, entry) in recents.iter().enumerate() {
            format_entry(&mut out, i + 1, entry);
        }
    }

    if !relevant.is_empty() {
        out.push_str("## 🔍 Relevant context\n\n");
        for (i, entry) in relevant.iter().enumerate() {
            format_entry(&mut out, i + 1, entry);
        }
    }

    out
}

fn format_entry(out: &mut String, index: usize, entry: &RetrievedMemory) {
    let memory = &entry.memory;
    let category = memory.category();

    out.push_str(&format!(
        "### {index}. {} {} [{} {:.1}",
        category.indicator(),
        memory.intent,
        category.as_str(),
        memory.importance
    ));
    if !entry.recent {
        out.push_str(&format!(" | relevance {:.0}%", entry.similarity * 100.0));
        if entry.task_boost > 0.0 {
            out.push_str(&format!(" | ⚡ boost {:.1}x", 1.0 + entry.task_boost));
        }
    }
    out.push_str("]\n");

    if !memory.outcome.is_empty() {
        out.push_str(&format!("- Outcome: {}\n", memory.outcome));
    }
    if !memory.artifacts.files.is_empty() {
        let files: Vec<String> = memory
            .artifacts
            .files
            .iter()
            .take(3)
            .map(|f| format!("`{f}`"))
            .collect();
        out.push_str(&format!("- Files: {}\n", files.join(", ")));
    }
    if !entry.matched_entities.is_empty() {
        let matched: Vec<String> = entry
            .matched_entities
            .iter()
            .take(3)
            .map(|e| format!("`{e}`"))
            .collect();
        out.push_str(&format!("- Matched: {}\n", matched.join(", ")));
    }
    out.push('\n');
}
