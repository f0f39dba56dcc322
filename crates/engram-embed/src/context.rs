//! Contextual-prefix construction for memory embeddings.
//!
//! Every stored memory is embedded as
//!
//! ```text
//! Session {id8} at {YYYY-MM-DD HH:MM}. Files: {f1, f2, …}. {intent → action → outcome}
//! ```
//!
//! The short structural prefix biases the vector space so temporal queries
//! ("work from yesterday"), file-scoped queries ("changes to auth.py"), and
//! session-scoped queries retrieve meaningfully. Query embeddings are NOT
//! prefixed — the asymmetry still improves recall over no prefix at all.
//!
//! The prefix format is a compatibility contract: stored `embedded_text`
//! always starts with `"Session "`, and future embedders must keep that.

use chrono::{DateTime, Utc};

/// Maximum number of file paths carried in the prefix.
const PREFIX_MAX_FILES: usize = 5;

/// Build the contextual prefix for a memory.
pub fn contextual_prefix(session_id: &str, timestamp: DateTime<Utc>, files: &[String]) -> String {
    let short_id: String = session_id.chars().take(8).collect();
    let time = timestamp.format("%Y-%m-%d %H:%M");

    let mut prefix = format!("Session {short_id} at {time}. ");
    if !files.is_empty() {
        let listed: Vec<&str> = files
            .iter()
            .take(PREFIX_MAX_FILES)
            .map(String::as_str)
            .collect();
        prefix.push_str(&format!("Files: {}. ", listed.join(", ")));
    }
    prefix
}

/// Concatenate intent, action, and outcome into the summary that follows
/// the prefix. Empty parts are skipped.
pub fn enhanced_summary(intent: &str, action: &str, outcome: &str) -> String {
    [intent, action, outcome]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" → ")
}

/// The exact string fed to the embedder for a memory.
pub fn embedded_text(
    session_id: &str,
    timestamp: DateTime<Utc>,
    files: &[String],
    intent: &str,
    action: &str,
    outcome: &str,
) -> String {
    let mut text = contextual_prefix(session_id, timestamp, files);
    text.push_str(&enhanced_summary(intent, action, outcome));
    text
}
