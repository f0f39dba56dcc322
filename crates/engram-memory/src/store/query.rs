//! Filter and result types for store queries.

use std::collections::BTreeMap;

use serde::Serialize;

use engram_types::{Memory, Timestamp};

// ─────────────────────────────────────────────────────────────────────────────
// Filter
// ─────────────────────────────────────────────────────────────────────────────

/// Metadata predicate applied to query and scan results.
///
/// The vector index can't push these down, so they are applied post-hoc over
/// candidate rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    /// Restrict to one session. `None` = cross-session (the default).
    pub session_id: Option<String>,
    /// Minimum importance score.
    pub min_importance: f32,
    /// Only memories at or after this time.
    pub since: Option<Timestamp>,
    /// Only memories at or before this time.
    pub until: Option<Timestamp>,
    /// Require the has_code flag.
    pub require_code: bool,
    /// Require the has_files flag.
    pub require_files: bool,
}

impl MemoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_min_importance(mut self, min: f32) -> Self {
        self.min_importance = min;
        self
    }

    pub fn with_since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: Timestamp) -> Self {
        self.until = Some(until);
        self
    }

    /// Whether a memory passes this filter.
    pub fn matches(&self, memory: &Memory) -> bool {
        if let Some(ref sid) = self.session_id
            && memory.session_id != *sid
        {
            return false;
        }
        if memory.importance < self.min_importance {
            return false;
        }
        if let Some(since) = self.since
            && memory.timestamp < since
        {
            return false;
        }
        if let Some(until) = self.until
            && memory.timestamp > until
        {
            return false;
        }
        if self.require_code && !memory.flags.has_code {
            return false;
        }
        if self.require_files && !memory.flags.has_files {
            return false;
        }
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────────────────

/// One hit from a similarity query.
#[derive(Debug, Clone)]
pub struct QueryMatch {
    pub memory: Memory,
    /// Cosine distance (lower = more similar).
    pub distance: f32,
    /// Cosine similarity (`1 - distance`).
    pub similarity: f32,
}

/// Aggregate statistics over the store.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_flag: BTreeMap<String, usize>,
    pub avg_importance: f32,
    pub session_count: usize,
    pub embedding_count: usize,
}
