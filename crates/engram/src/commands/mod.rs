//! CLI command implementations.

pub mod clusters;
pub mod export;
pub mod hook;
pub mod prune;
pub mod query;
pub mod stats;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use engram_embed::{EMBEDDING_DIMS, EmbedderSpec, SharedEmbedder, build_embedder};
use engram_memory::{GraphCache, MemoryStore};
use engram_types::Memory;

/// Shared context for command execution.
pub struct Context {
    /// State directory (`~/.engram` by default); holds `memory_db/` and
    /// `debug.log`.
    pub data_dir: PathBuf,
    /// Output JSON instead of human-readable text.
    pub json_output: bool,
}

impl Context {
    /// Path of the store directory.
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("memory_db")
    }

    /// Open the memory store.
    pub fn open_store(&self) -> Result<Arc<MemoryStore>> {
        let store = MemoryStore::open(self.store_dir(), EMBEDDING_DIMS)
            .context("failed to open memory store")?;
        Ok(Arc::new(store))
    }

    /// Build the process-wide embedder. Provider comes from
    /// `ENGRAM_EMBEDDER` ("local" or "mock"); local is the default and
    /// falls back to mock when no model files are installed.
    pub fn embedder(&self) -> Result<SharedEmbedder> {
        let spec = EmbedderSpec {
            provider: std::env::var("ENGRAM_EMBEDDER").unwrap_or_default(),
            ..Default::default()
        };
        Ok(build_embedder(&spec)?)
    }

    /// The knowledge-graph snapshot cache under the store directory.
    pub fn graph_cache(&self) -> GraphCache {
        GraphCache::new(self.store_dir().join("kg_cache"))
    }
}

/// One-line human rendering of a memory.
pub fn format_memory_line(memory: &Memory) -> String {
    let category = memory.category();
    let mut line = format!(
        "{} [{:>5.1}] {}",
        category.indicator(),
        memory.importance,
        memory.intent
    );
    if !memory.outcome.is_empty() {
        line.push_str(&format!(" — {}", memory.outcome));
    }
    if !memory.artifacts.files.is_empty() {
        let files: Vec<&str> = memory
            .artifacts
            .files
            .iter()
            .take(3)
            .map(String::as_str)
            .collect();
        line.push_str(&format!(" ({})", files.join(", ")));
    }
    line
}
