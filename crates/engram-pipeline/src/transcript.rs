//! Transcript loading.
//!
//! Transcripts are JSONL, one message per line. Hosts wrap messages in
//! different envelopes across versions; some nest the real message under a
//! `message` field. Unparseable lines are skipped, never fatal — only a
//! missing or unreadable file is an input-shape error.

use std::io::{BufRead, BufReader};
use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use engram_types::TranscriptMessage;

use crate::error::{PipelineError, Result};

/// Default bound on messages per ingestion; older messages are dropped.
pub const MAX_TRANSCRIPT_MESSAGES: usize = 1000;

/// Load a transcript, keeping the most recent `max_messages` window.
pub fn load_transcript(path: impl AsRef<Path>, max_messages: usize) -> Result<Vec<TranscriptMessage>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(|e| PipelineError::Transcript(format!("cannot open {path:?}: {e}")))?;

    let mut messages = Vec::new();
    let mut skipped = 0usize;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| PipelineError::Transcript(format!("read error: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Some(msg) => messages.push(msg),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Skipped {skipped} unparseable transcript lines");
    }
    if messages.len() > max_messages {
        let drop = messages.len() - max_messages;
        messages.drain(..drop);
        debug!("Transcript over limit; kept the most recent {max_messages} messages");
    }

    debug!("Loaded {} transcript messages from {:?}", messages.len(), path);
    Ok(messages)
}

/// Parse one line, unwrapping a nested `message` envelope when present.
fn parse_line(line: &str) -> Option<TranscriptMessage> {
    let value: Value = serde_json::from_str(line).ok()?;
    let inner = match value.get("message") {
        Some(nested @ Value::Object(_)) => nested.clone(),
        _ => value,
    };
    serde_json::from_value(inner).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_types::Role;
    use std::io::Write;

    fn write_transcript(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[test]
    fn test_load_flat_format() {
        let file = write_transcript(&[
            r#"{"role": "user", "content": "fix the bug"}"#,
            r#"{"role": "assistant", "content": "done"}"#,
        ]);
        let messages = load_transcript(file.path(), 100).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].content, "done");
    }

    #[test]
    fn test_load_nested_envelope() {
        let file = write_transcript(&[
            r#"{"type": "user", "message": {"role": "user", "content": "hello"}}"#,
        ]);
        let messages = load_transcript(file.path(), 100).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hello");
    }

    #[test]
    fn test_bad_lines_skipped() {
        let file = write_transcript(&[
            "not json at all",
            r#"{"role": "user", "content": "kept"}"#,
            r#"{"no_role": true}"#,
        ]);
        let messages = load_transcript(file.path(), 100).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "kept");
    }

    #[test]
    fn test_window_keeps_recent() {
        let lines: Vec<String> = (0..10)
            .map(|i| format!(r#"{{"role": "user", "content": "msg {i}"}}"#))
            .collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let file = write_transcript(&refs);

        let messages = load_transcript(file.path(), 3).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "msg 7");
        assert_eq!(messages[2].content, "msg 9");
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = load_transcript("/nonexistent/transcript.jsonl", 100);
        assert!(matches!(result, Err(PipelineError::Transcript(_))));
    }

    #[test]
    fn test_empty_file() {
        let file = write_transcript(&[]);
        let messages = load_transcript(file.path(), 100).unwrap();
        assert!(messages.is_empty());
    }
}
