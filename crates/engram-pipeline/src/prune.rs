//! Memory pruning policies.
//!
//! Three policies run in order during a sweep: age+importance, redundancy,
//! and per-session capacity. Deletions go through the store atomically and
//! invalidate the graph snapshot, since a cached graph may reference
//! memories that no longer exist. Dry-run reports what would be removed
//! without touching anything.

use serde::Serialize;
use tracing::{debug, info};

use engram_embed::cosine_similarity;
use engram_memory::{GraphCache, MemoryStore};
use engram_types::Memory;

use crate::error::Result;

// ─────────────────────────────────────────────────────────────────────────────
// Policy
// ─────────────────────────────────────────────────────────────────────────────

/// Pruning thresholds.
#[derive(Debug, Clone)]
pub struct PrunePolicy {
    /// Memories older than this are age-prune candidates.
    pub old_threshold_days: f64,
    /// Age rule only removes memories below this importance.
    pub low_importance_threshold: f32,
    /// Cosine similarity above this marks a pair redundant.
    pub redundancy_threshold: f32,
    /// Per-session memory cap.
    pub max_per_session: usize,
}

impl Default for PrunePolicy {
    fn default() -> Self {
        Self {
            old_threshold_days: 90.0,
            low_importance_threshold: 3.0,
            redundancy_threshold: 0.95,
            max_per_session: 500,
        }
    }
}

/// What a sweep did (or would do, in dry-run).
#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    pub age_pruned: usize,
    pub redundancy_pruned: usize,
    pub capacity_pruned: usize,
    pub total_pruned: usize,
    pub remaining: usize,
    pub dry_run: bool,
    /// IDs removed, in policy order.
    pub removed_ids: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Pruner
// ─────────────────────────────────────────────────────────────────────────────

/// Applies the pruning policies to a store.
#[derive(Debug, Clone, Default)]
pub struct Pruner {
    policy: PrunePolicy,
}

impl Pruner {
    pub fn new(policy: PrunePolicy) -> Self {
        Self { policy }
    }

    /// Run one sweep over the whole store.
    ///
    /// With `dry_run` the report is produced but nothing is deleted and the
    /// graph cache stays valid.
    pub fn sweep(
        &self,
        store: &MemoryStore,
        cache: Option<&GraphCache>,
        dry_run: bool,
    ) -> Result<PruneReport> {
        let memories = store.scan(None)?;
        let now = engram_types::now();

        let mut doomed: Vec<usize> = Vec::new();
        let mut report = PruneReport {
            dry_run,
            ..Default::default()
        };

        // Policy 1: age + importance.
        for (i, memory) in memories.iter().enumerate() {
            if memory.age_days(now) > self.policy.old_threshold_days
                && memory.importance < self.policy.low_importance_threshold
            {
                doomed.push(i);
                report.age_pruned += 1;
            }
        }

        // Policy 2: redundancy. Keep the higher-importance memory of each
        // near-duplicate pair; ties keep the newer one.
        for i in 0..memories.len() {
            if doomed.contains(&i) {
                continue;
            }
            for j in (i + 1)..memories.len() {
                if doomed.contains(&i) {
                    break;
                }
                if doomed.contains(&j) {
                    continue;
                }
                let similarity =
                    cosine_similarity(&memories[i].embedding, &memories[j].embedding);
                if similarity <= self.policy.redundancy_threshold {
                    continue;
                }
                let drop = redundancy_victim(&memories[i], &memories[j], i, j);
                doomed.push(drop);
                report.redundancy_pruned += 1;
                debug!(
                    "Redundant pair ({:.3}): dropping {}",
                    similarity, memories[drop].id
                );
            }
        }

        // Policy 3: per-session capacity, dropping lowest importance first.
        for session in store.session_ids()? {
            let mut survivors: Vec<usize> = (0..memories.len())
                .filter(|&i| memories[i].session_id == session && !doomed.contains(&i))
                .collect();
            if survivors.len() <= self.policy.max_per_session {
                continue;
            }
            survivors.sort_by(|&a, &b| {
                memories[a]
                    .importance
                    .partial_cmp(&memories[b].importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let excess = survivors.len() - self.policy.max_per_session;
            for &idx in survivors.iter().take(excess) {
                doomed.push(idx);
                report.capacity_pruned += 1;
            }
        }

        report.removed_ids = doomed.iter().map(|&i| memories[i].id.clone()).collect();
        report.total_pruned = report.removed_ids.len();
        report.remaining = memories.len() - report.total_pruned;

        if !dry_run && !report.removed_ids.is_empty() {
            store.delete(&report.removed_ids)?;
            if let Some(cache) = cache {
                cache.invalidate()?;
            }
            info!(
                "Pruned {} memories (age {}, redundancy {}, capacity {})",
                report.total_pruned,
                report.age_pruned,
                report.redundancy_pruned,
                report.capacity_pruned
            );
        }

        Ok(report)
    }
}

/// Which of a redundant pair to drop: the lower importance, or the older
/// on a tie.
fn redundancy_victim(a: &Memory, b: &Memory, ia: usize, ib: usize) -> usize {
    if a.importance < b.importance {
        ia
    } else if b.importance < a.importance {
        ib
    } else if a.timestamp <= b.timestamp {
        ia
    } else {
        ib
    }
}
