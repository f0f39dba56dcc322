//! Shared types for the engram memory pipeline.
//!
//! Everything that crosses a crate boundary lives here: the [`Memory`] unit
//! and its artifacts, typed [`Entity`] mentions, the tolerant transcript
//! message carrier, and the lifecycle hook envelopes exchanged with the host
//! assistant over stdin/stdout.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

pub mod entity;
pub mod hooks;
pub mod memory;
pub mod transcript;

pub use entity::{Entity, EntityType};
pub use hooks::{
    CompactTrigger, HookStatus, PreCompactEvent, PreCompactOutput, SessionMatcher,
    SessionStartEvent, SessionStartOutput,
};
pub use memory::{Artifacts, CodeSnippet, ImportanceCategory, Memory, MemoryFlags};
pub use transcript::{Role, TranscriptMessage};

/// Timestamp type used throughout the system.
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Compute the content-addressed ID for a memory.
///
/// The ID is a function of `(session_id, chunk_index, intent)` only, so
/// re-ingesting the same transcript produces the same IDs. Fields are joined
/// with a unit separator to avoid ambiguity between adjacent values.
pub fn memory_id(session_id: &str, chunk_index: u32, intent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update([0x1f]);
    hasher.update(chunk_index.to_le_bytes());
    hasher.update([0x1f]);
    hasher.update(intent.as_bytes());
    let digest = hasher.finalize();
    // 16 bytes of the digest is plenty for uniqueness and keeps IDs readable.
    digest[..16].iter().map(|b| format!("{b:02x}")).collect()
}
