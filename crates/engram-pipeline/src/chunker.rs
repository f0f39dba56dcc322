//! Transcript chunking into Intent/Action/Outcome triples.
//!
//! Each user turn opens a candidate chunk; the assistant's reply and any
//! tool traffic accumulate into the action until the next user turn. Two
//! overrides keep chunks aligned with the actual work:
//!
//! - a topic shift inside one assistant turn (a burst of file writes, or a
//!   decision marker after tool activity) splits the action into multiple
//!   chunks that share the originating intent;
//! - 3–5 closely related file-write operations collapse into a single
//!   chunk, so bulk edits don't explode into dozens of memories.

use std::sync::OnceLock;

use regex::Regex;

use engram_types::{Role, TranscriptMessage};

// ─────────────────────────────────────────────────────────────────────────────
// Config & Types
// ─────────────────────────────────────────────────────────────────────────────

/// Chunker tuning knobs.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Soft cap on intent length (chars).
    pub intent_cap: usize,
    /// Soft cap on action length (chars).
    pub action_cap: usize,
    /// Soft cap on outcome length (chars).
    pub outcome_cap: usize,
    /// File-write operations that trigger a chunk boundary.
    pub file_op_group: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            intent_cap: 500,
            action_cap: 1000,
            outcome_cap: 300,
            file_op_group: 3,
        }
    }
}

/// One Intent/Action/Outcome triple.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// The user's goal. Never empty.
    pub intent: String,
    /// What the assistant did, soft-capped. Empty only for a lone user
    /// message with no reply.
    pub action: String,
    /// The uncapped action text; embeddings use this.
    pub action_full: String,
    /// Trailing success/failure description. Empty when the transcript
    /// ended mid-action with no outcome markers.
    pub outcome: String,
    /// Number of tool invocations in the action.
    pub tool_count: usize,
    /// Tool names in invocation order.
    pub tool_names: Vec<String>,
    /// Whether the chunk reads as a success.
    pub success: bool,
}

impl Chunk {
    /// Combined text for artifact and entity extraction.
    pub fn combined_text(&self) -> String {
        format!("{} {} {}", self.intent, self.action_full, self.outcome)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Markers
// ─────────────────────────────────────────────────────────────────────────────

fn success_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(done|fixed|resolved|solved|completed|finished|successfully|success|works now|working now|tests? pass(?:ed|ing)?|all green)\b",
        )
        .unwrap()
    })
}

fn failure_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(error|errors|failed|failure|failing|broken|crash|crashed|exception)\b")
            .unwrap()
    })
}

fn decision_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(decided to|chose|going with|will use|opted to|selected)\b").unwrap()
    })
}

fn key_phrase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(decided|implement|creat|fix|refactor|will|let me|i'll)\w*\b").unwrap()
    })
}

fn is_file_write_tool(name: &str) -> bool {
    matches!(name, "Write" | "Edit" | "MultiEdit" | "write_file" | "edit_file")
}

// ─────────────────────────────────────────────────────────────────────────────
// Chunker
// ─────────────────────────────────────────────────────────────────────────────

/// Splits transcripts along semantic boundaries.
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

#[derive(Default)]
struct Accumulator {
    user: Vec<String>,
    assistant: Vec<String>,
    tool_names: Vec<String>,
    tool_successes: Vec<Option<bool>>,
}

impl Accumulator {
    fn has_work(&self) -> bool {
        !self.assistant.is_empty() || !self.tool_names.is_empty()
    }

    fn is_empty(&self) -> bool {
        self.user.is_empty() && !self.has_work()
    }
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Produce the ordered chunk sequence for a transcript.
    ///
    /// Empty input yields empty output. Consecutive chunks with identical
    /// `(intent, action)` are deduplicated.
    pub fn chunk(&self, messages: &[TranscriptMessage]) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut acc = Accumulator::default();

        for msg in messages {
            match msg.role {
                Role::User => {
                    if acc.has_work() {
                        self.emit(&mut chunks, &acc);
                        acc = Accumulator::default();
                    }
                    if !msg.content.trim().is_empty() {
                        acc.user.push(msg.content.trim().to_string());
                    }
                }
                Role::Assistant => {
                    if !msg.content.trim().is_empty() {
                        acc.assistant.push(msg.content.trim().to_string());
                    }
                    if self.should_split(&acc) {
                        self.emit(&mut chunks, &acc);
                        // Topic shift inside one turn: later chunks share
                        // the originating intent.
                        let user = acc.user.clone();
                        acc = Accumulator::default();
                        acc.user = user;
                    }
                }
                Role::Tool => {
                    let name = msg
                        .tool_name
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string());
                    acc.tool_names.push(name);
                    acc.tool_successes.push(msg.tool_success());
                }
                Role::Other => {}
            }
        }

        if !acc.is_empty() {
            self.emit(&mut chunks, &acc);
        }

        chunks
    }

    /// Natural-boundary override: detect a topic shift mid-turn.
    fn should_split(&self, acc: &Accumulator) -> bool {
        // A cluster of file writes with some explanation is one unit of
        // work; close it out rather than letting it absorb what follows.
        let file_ops = acc
            .tool_names
            .iter()
            .filter(|name| is_file_write_tool(name))
            .count();
        if file_ops >= self.config.file_op_group && acc.assistant.len() >= 2 {
            return true;
        }

        // A decision marker after tool activity marks a new direction.
        if !acc.tool_names.is_empty()
            && acc.assistant.len() >= 2
            && acc
                .assistant
                .last()
                .is_some_and(|text| decision_marker_re().is_match(text))
        {
            return true;
        }

        false
    }

    fn emit(&self, chunks: &mut Vec<Chunk>, acc: &Accumulator) {
        let Some(chunk) = self.build(acc) else {
            return;
        };
        // Skip immediate duplicates.
        if let Some(prev) = chunks.last()
            && prev.intent == chunk.intent
            && prev.action == chunk.action
        {
            return;
        }
        chunks.push(chunk);
    }

    fn build(&self, acc: &Accumulator) -> Option<Chunk> {
        if acc.is_empty() {
            return None;
        }

        // Intent: the user's words, or an inferred continuation marker.
        let user_text = acc.user.join(" ");
        let intent_raw = if user_text.trim().is_empty() {
            "Continue previous task".to_string()
        } else {
            user_text.trim().to_string()
        };
        let intent = truncate_chars(&intent_raw, self.config.intent_cap);

        // Action: what the tools did, plus the assistant's key sentences.
        let assistant_text = acc.assistant.join(" ");
        let mut parts = tool_op_summaries(&acc.tool_names);
        let key_phrases: Vec<&str> = crate::artifacts::split_sentences(&assistant_text)
            .filter(|s| key_phrase_re().is_match(s))
            .take(2)
            .collect();
        if !key_phrases.is_empty() {
            parts.extend(key_phrases.iter().map(|s| s.to_string()));
        } else if !assistant_text.is_empty() {
            parts.push(truncate_chars(&assistant_text, 300));
        }
        let action = truncate_chars(&parts.join(" - "), self.config.action_cap);

        // The full action keeps the entire assistant text so embeddings and
        // artifact extraction see everything the caps would drop.
        let mut full_parts = tool_op_summaries(&acc.tool_names);
        if !assistant_text.is_empty() {
            full_parts.push(assistant_text.clone());
        }
        let action_full = full_parts.join(" - ");

        let (outcome_raw, success) = detect_outcome(&assistant_text, &acc.tool_successes);
        let outcome = truncate_chars(&outcome_raw, self.config.outcome_cap);

        Some(Chunk {
            intent,
            action,
            action_full,
            outcome,
            tool_count: acc.tool_names.len(),
            tool_names: acc.tool_names.clone(),
            success,
        })
    }
}

/// Summarize tool usage into action fragments.
fn tool_op_summaries(tool_names: &[String]) -> Vec<String> {
    let mut parts = Vec::new();
    if tool_names.iter().any(|n| n == "Write" || n == "write_file") {
        parts.push("Created/wrote files".to_string());
    }
    if tool_names.iter().any(|n| n == "Edit" || n == "MultiEdit" || n == "edit_file") {
        parts.push("Modified files".to_string());
    }
    if tool_names.iter().any(|n| n == "Read" || n == "read_file") {
        parts.push("Analyzed code".to_string());
    }
    if tool_names.iter().any(|n| n == "Bash" || n == "shell") {
        parts.push("Executed commands".to_string());
    }
    parts
}

/// Find the trailing outcome sentence and the success flag.
///
/// Surface markers in the assistant's final sentences win; tool result
/// flags break ties; no signal at all means an empty outcome.
fn detect_outcome(assistant_text: &str, tool_successes: &[Option<bool>]) -> (String, bool) {
    let sentences: Vec<&str> = crate::artifacts::split_sentences(assistant_text).collect();
    for sentence in sentences.iter().rev().take(3) {
        let has_success = success_marker_re().is_match(sentence);
        let has_failure = failure_marker_re().is_match(sentence);
        if has_success || has_failure {
            return (sentence.to_string(), has_success && !has_failure);
        }
    }

    let flagged: Vec<bool> = tool_successes.iter().filter_map(|s| *s).collect();
    if !flagged.is_empty() {
        return if flagged.iter().all(|&ok| ok) {
            ("Task completed successfully".to_string(), true)
        } else {
            ("Encountered errors, troubleshooting".to_string(), false)
        };
    }

    (String::new(), false)
}

/// Truncate to `cap` chars, appending an ellipsis when anything was cut.
fn truncate_chars(s: &str, cap: usize) -> String {
    if s.chars().count() <= cap {
        return s.to_string();
    }
    let mut out: String = s.chars().take(cap.saturating_sub(1)).collect();
    out.push('…');
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
