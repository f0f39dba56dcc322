//! Tolerant transcript message carrier.
//!
//! Transcripts are line-delimited JSON produced by the host assistant. The
//! format varies across host versions, so this is deliberately a loose
//! bag-of-fields: the typed fields we care about, plus a flattened map
//! catching everything else. Only hook-envelope violations are rejected;
//! unknown message shapes degrade to empty content.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Message role. Unknown roles deserialize to [`Role::Other`] rather than
/// rejecting the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
    Other,
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "tool" => Role::Tool,
            _ => Role::Other,
        })
    }
}

/// One transcript line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: Role,
    /// Message text. Hosts that send structured content blocks have their
    /// text parts joined; non-text blocks are dropped.
    #[serde(default, deserialize_with = "deserialize_content")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Name of the tool, for `role: tool` lines and tool-use blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Raw tool result payload, shape owned by the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<Value>,
    /// Anything else the host sent; preserved but unused.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl TranscriptMessage {
    /// Build a plain user/assistant message (test and fixture helper).
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
            tool_name: None,
            tool_result: None,
            extra: HashMap::new(),
        }
    }

    /// Whether the tool result reports success.
    ///
    /// Returns `None` when no signal is present. Recognizes a boolean
    /// `success` field, an `is_error` field, and exit-code-zero payloads.
    pub fn tool_success(&self) -> Option<bool> {
        let result = self.tool_result.as_ref()?;
        if let Some(success) = result.get("success").and_then(Value::as_bool) {
            return Some(success);
        }
        if let Some(is_error) = result.get("is_error").and_then(Value::as_bool) {
            return Some(!is_error);
        }
        if let Some(code) = result.get("exit_code").and_then(Value::as_i64) {
            return Some(code == 0);
        }
        None
    }
}

/// Accept `content` as a string or as a list of content blocks.
fn deserialize_content<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(content_to_text(&value))
}

fn content_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|block| match block {
                Value::String(s) => Some(s.clone()),
                Value::Object(obj) => obj.get("text").and_then(Value::as_str).map(String::from),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
