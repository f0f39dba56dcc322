//! Lifecycle hook envelopes (host-compatible).
//!
//! The host pipes one JSON event object to stdin and reads one JSON
//! response from stdout. These types are the whole contract; anything the
//! host adds beyond them is ignored.

use serde::{Deserialize, Serialize};

/// What triggered the compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompactTrigger {
    Auto,
    Manual,
}

/// Which lifecycle moment fired the SessionStart hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMatcher {
    Compact,
    Resume,
    Startup,
}

/// PreCompact hook input.
#[derive(Debug, Clone, Deserialize)]
pub struct PreCompactEvent {
    pub session_id: String,
    pub transcript_path: String,
    #[serde(default)]
    pub hook_event_name: String,
    pub trigger: CompactTrigger,
}

/// Hook response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookStatus {
    Ok,
    Error,
}

/// PreCompact hook output.
///
/// Non-fatal errors never flip `status` to `error`; they are logged and the
/// pipeline reports what it did manage to store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreCompactOutput {
    pub status: HookStatus,
    pub memories_stored: usize,
    pub pruned: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PreCompactOutput {
    pub fn ok(memories_stored: usize, pruned: usize) -> Self {
        Self {
            status: HookStatus::Ok,
            memories_stored,
            pruned,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: HookStatus::Error,
            memories_stored: 0,
            pruned: 0,
            error: Some(message.into()),
        }
    }
}

/// SessionStart hook input.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionStartEvent {
    pub session_id: String,
    #[serde(default)]
    pub task_query: String,
    #[serde(default)]
    pub hook_event_name: String,
    pub matcher: SessionMatcher,
}

/// SessionStart hook output.
///
/// `additional_context` is the formatted memory block; empty string when
/// nothing passed the quality gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartOutput {
    pub additional_context: String,
    pub memories_injected: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precompact_event_parse() {
        let event: PreCompactEvent = serde_json::from_str(
            r#"{
                "session_id": "abc-123",
                "transcript_path": "/tmp/transcript.jsonl",
                "hook_event_name": "PreCompact",
                "trigger": "auto"
            }"#,
        )
        .unwrap();
        assert_eq!(event.session_id, "abc-123");
        assert_eq!(event.trigger, CompactTrigger::Auto);
    }

    #[test]
    fn test_precompact_event_rejects_bad_trigger() {
        let result: Result<PreCompactEvent, _> = serde_json::from_str(
            r#"{"session_id": "s", "transcript_path": "t", "trigger": "sometimes"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_session_start_event_parse() {
        let event: SessionStartEvent = serde_json::from_str(
            r#"{
                "session_id": "abc",
                "task_query": "continue the auth work",
                "hook_event_name": "SessionStart",
                "matcher": "compact"
            }"#,
        )
        .unwrap();
        assert_eq!(event.matcher, SessionMatcher::Compact);
        assert_eq!(event.task_query, "continue the auth work");
    }

    #[test]
    fn test_output_serialization() {
        let json = serde_json::to_string(&PreCompactOutput::ok(5, 2)).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(!json.contains("error"));

        let json = serde_json::to_string(&PreCompactOutput::error("bad input")).unwrap();
        assert!(json.contains("\"status\":\"error\""));
        assert!(json.contains("bad input"));
    }
}
