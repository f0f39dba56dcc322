//! Error types for the pipeline crate.

use thiserror::Error;

/// Errors that can occur while running a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Store operation failed.
    #[error("Store error: {0}")]
    Memory(#[from] engram_memory::MemoryError),

    /// Embedding failed.
    #[error("Embedding error: {0}")]
    Embed(#[from] engram_embed::EmbedError),

    /// Transcript could not be loaded.
    #[error("Transcript error: {0}")]
    Transcript(String),

    /// Filesystem operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
