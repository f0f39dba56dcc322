//! Error types for the embedding crate.

use thiserror::Error;

/// Errors that can occur while producing embeddings.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Embedding model could not be loaded.
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// Inference failed.
    #[error("Inference error: {0}")]
    Inference(String),

    /// Tokenization failed.
    #[error("Tokenization error: {0}")]
    Tokenization(String),

    /// Invalid embedder configuration.
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;
