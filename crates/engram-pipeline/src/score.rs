//! Multi-signal importance scoring.
//!
//! `importance = Σ wᵢ · signalᵢ(chunk) · recency_decay(age)`. Ten weighted
//! signals, each detected from chunk text or artifacts; recency is a final
//! multiplicative decay, not an additive signal. Pure function of its
//! inputs: no I/O, never fails, unparseable input scores 0.

use std::sync::OnceLock;

use regex::Regex;

use engram_types::Artifacts;

use crate::chunker::Chunk;

// ─────────────────────────────────────────────────────────────────────────────
// Weights
// ─────────────────────────────────────────────────────────────────────────────

/// Signal weights. Callers may override any of them.
#[derive(Debug, Clone)]
pub struct ScorerWeights {
    pub decision_marker: f32,
    pub error_resolution: f32,
    pub learning: f32,
    pub file_creation: f32,
    pub test_success: f32,
    /// Per tool call, capped at [`Self::tool_usage_cap`] calls.
    pub tool_usage: f32,
    pub tool_usage_cap: usize,
    pub code_presence: f32,
    pub architecture: f32,
    /// Per unique file touched, capped at [`Self::file_ops_cap`] files.
    pub file_ops: f32,
    pub file_ops_cap: usize,
    /// Half-life of the recency decay, in days.
    pub recency_half_life_days: f32,
}

impl Default for ScorerWeights {
    fn default() -> Self {
        Self {
            decision_marker: 10.0,
            error_resolution: 8.0,
            learning: 7.0,
            file_creation: 6.0,
            test_success: 5.0,
            tool_usage: 0.5,
            tool_usage_cap: 10,
            code_presence: 2.0,
            architecture: 4.0,
            file_ops: 0.3,
            file_ops_cap: 15,
            recency_half_life_days: 30.0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Patterns
// ─────────────────────────────────────────────────────────────────────────────

fn decision_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(decided to|chose|will use|going with|opted to|selected)\b").unwrap()
    })
}

fn error_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(error|bug|issue|failure|exception|crash|panic)\b").unwrap()
    })
}

fn resolution_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(fixed|resolved|solved|debugged|works now|working now)\b").unwrap()
    })
}

fn learning_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(learned|discovered|turns out|realized|found that)\b").unwrap()
    })
}

fn creation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(created?|creating|wrote|added|new file)\b").unwrap())
}

fn test_success_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\btests?\s+(pass(ed|ing)?|succeed(ed)?|green)\b|\ball green\b)").unwrap()
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Scorer
// ─────────────────────────────────────────────────────────────────────────────

/// Deterministic importance scorer.
#[derive(Debug, Clone, Default)]
pub struct ImportanceScorer {
    weights: ScorerWeights,
}

impl ImportanceScorer {
    pub fn new(weights: ScorerWeights) -> Self {
        Self { weights }
    }

    /// Score a chunk. `age_days` is how old the chunk is at scoring time
    /// (0 for fresh ingestion).
    pub fn score(&self, chunk: &Chunk, artifacts: &Artifacts, age_days: f64) -> f32 {
        let w = &self.weights;
        let combined = chunk.combined_text().to_lowercase();
        let mut score = 0.0f32;

        // 1. Decision markers
        if decision_re().is_match(&combined) {
            score += w.decision_marker;
        }

        // 2. Error resolution: an error token and a resolution token must
        //    co-occur; either alone is not a resolution.
        if error_token_re().is_match(&combined) && resolution_token_re().is_match(&combined) {
            score += w.error_resolution;
        }

        // 3. Learning indicators
        if learning_re().is_match(&combined) {
            score += w.learning;
        }

        // 4. File creation (as opposed to edits)
        if !artifacts.files.is_empty() && creation_re().is_match(&chunk.action_full.to_lowercase())
        {
            score += w.file_creation;
        }

        // 5. Test success
        if test_success_re().is_match(&combined) {
            score += w.test_success;
        }

        // 6. Tool usage intensity
        score += w.tool_usage * chunk.tool_count.min(w.tool_usage_cap) as f32;

        // 7. Code presence
        if !artifacts.code_snippets.is_empty() {
            score += w.code_presence;
        }

        // 8. Architecture mentions
        if !artifacts.architecture.is_empty() {
            score += w.architecture;
        }

        // 9. File ops count
        score += w.file_ops * artifacts.files.len().min(w.file_ops_cap) as f32;

        // 10. Recency decay, multiplicative
        let decay = 0.5f32.powf(age_days as f32 / w.recency_half_life_days);
        (score * decay).max(0.0)
    }
}
