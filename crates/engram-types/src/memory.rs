//! The memory unit and its artifact bundle.

use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// The atomic unit of preserved context.
///
/// Memories are created only by the PreCompact pipeline and never mutated
/// afterwards; the pruner is the only component allowed to destroy them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Content-addressed ID: hash of `(session_id, chunk_index, intent)`.
    pub id: String,
    /// Opaque identifier of the host session this memory came from.
    pub session_id: String,
    /// Ingestion time (UTC).
    pub timestamp: Timestamp,
    /// Ordering within the session.
    pub chunk_index: u32,
    /// The user's goal for this chunk. Always non-empty.
    pub intent: String,
    /// What the assistant did. Always non-empty.
    pub action: String,
    /// Observed result. Empty string when the transcript ended mid-action.
    #[serde(default)]
    pub outcome: String,
    /// Importance score, computed once at ingestion. Non-negative.
    pub importance: f32,
    /// Structured artifacts extracted from the chunk text.
    #[serde(default)]
    pub artifacts: Artifacts,
    /// Boolean flags for fast filtering.
    #[serde(default)]
    pub flags: MemoryFlags,
    /// Dense embedding of `embedded_text`. Length is the deploy-time D.
    pub embedding: Vec<f32>,
    /// The exact string fed to the embedder (contextual prefix + summary).
    pub embedded_text: String,
}

impl Memory {
    /// Derive the importance category from the stored score.
    pub fn category(&self) -> ImportanceCategory {
        ImportanceCategory::from_score(self.importance)
    }

    /// Age of this memory in fractional days relative to `now`.
    pub fn age_days(&self, now: Timestamp) -> f64 {
        (now - self.timestamp).num_seconds().max(0) as f64 / 86_400.0
    }
}

/// Importance tiers derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportanceCategory {
    Low,
    Medium,
    High,
    Critical,
}

impl ImportanceCategory {
    /// Categorize a raw importance score.
    ///
    /// Boundaries: low < 5, medium 5–10, high 10–20, critical ≥ 20.
    pub fn from_score(score: f32) -> Self {
        if score >= 20.0 {
            Self::Critical
        } else if score >= 10.0 {
            Self::High
        } else if score >= 5.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Indicator glyph used in injected context blocks.
    pub fn indicator(&self) -> &'static str {
        match self {
            Self::Critical => "🔴",
            Self::High => "🟠",
            Self::Medium => "🟡",
            Self::Low => "🟢",
        }
    }
}

/// Multi-modal artifacts extracted from a chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Artifacts {
    /// Fenced code blocks, in order of appearance.
    #[serde(default)]
    pub code_snippets: Vec<CodeSnippet>,
    /// File paths, normalized to forward slashes, deduplicated and sorted.
    #[serde(default)]
    pub files: Vec<String>,
    /// Shell invocations, in order of appearance.
    #[serde(default)]
    pub commands: Vec<String>,
    /// Error messages and traces, in order of appearance.
    #[serde(default)]
    pub errors: Vec<String>,
    /// Sentences mentioning design or architectural decisions.
    #[serde(default)]
    pub architecture: Vec<String>,
}

impl Artifacts {
    /// True when no artifact of any kind was extracted.
    pub fn is_empty(&self) -> bool {
        self.code_snippets.is_empty()
            && self.files.is_empty()
            && self.commands.is_empty()
            && self.errors.is_empty()
            && self.architecture.is_empty()
    }
}

/// A code block with its (possibly inferred) language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSnippet {
    pub language: String,
    pub text: String,
}

/// Flags for fast metadata filtering.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MemoryFlags {
    #[serde(default)]
    pub has_code: bool,
    #[serde(default)]
    pub has_files: bool,
    #[serde(default)]
    pub has_architecture: bool,
    #[serde(default)]
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_boundaries() {
        assert_eq!(ImportanceCategory::from_score(0.0), ImportanceCategory::Low);
        assert_eq!(ImportanceCategory::from_score(4.9), ImportanceCategory::Low);
        assert_eq!(
            ImportanceCategory::from_score(5.0),
            ImportanceCategory::Medium
        );
        assert_eq!(
            ImportanceCategory::from_score(9.99),
            ImportanceCategory::Medium
        );
        assert_eq!(
            ImportanceCategory::from_score(10.0),
            ImportanceCategory::High
        );
        assert_eq!(
            ImportanceCategory::from_score(19.9),
            ImportanceCategory::High
        );
        assert_eq!(
            ImportanceCategory::from_score(20.0),
            ImportanceCategory::Critical
        );
    }

    #[test]
    fn test_artifacts_is_empty() {
        let mut artifacts = Artifacts::default();
        assert!(artifacts.is_empty());

        artifacts.files.push("src/auth.rs".to_string());
        assert!(!artifacts.is_empty());
    }

    #[test]
    fn test_memory_age_days() {
        let ts = crate::now() - chrono::Duration::days(3);
        let memory = Memory {
            id: "abc".into(),
            session_id: "s".into(),
            timestamp: ts,
            chunk_index: 0,
            intent: "i".into(),
            action: "a".into(),
            outcome: String::new(),
            importance: 1.0,
            artifacts: Artifacts::default(),
            flags: MemoryFlags::default(),
            embedding: vec![0.0; 4],
            embedded_text: "Session abc".into(),
        };
        let age = memory.age_days(crate::now());
        assert!((age - 3.0).abs() < 0.01);
    }

    #[test]
    fn test_memory_serde_roundtrip() {
        let memory = Memory {
            id: "deadbeef".into(),
            session_id: "sess".into(),
            timestamp: crate::now(),
            chunk_index: 2,
            intent: "implement auth".into(),
            action: "wrote auth.py".into(),
            outcome: "tests pass".into(),
            importance: 12.5,
            artifacts: Artifacts {
                files: vec!["auth.py".into()],
                ..Default::default()
            },
            flags: MemoryFlags {
                has_files: true,
                success: true,
                ..Default::default()
            },
            embedding: vec![0.1, 0.2],
            embedded_text: "Session sess at ...".into(),
        };

        let json = serde_json::to_string(&memory).unwrap();
        let back: Memory = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, memory.id);
        assert_eq!(back.category(), ImportanceCategory::High);
        assert!(back.flags.success);
    }
}
