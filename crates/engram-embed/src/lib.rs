//! Text embedding for semantic memory recall.
//!
//! This crate provides the [`Embedder`] trait and its implementations:
//!
//! - [`MockEmbedder`]: deterministic hashed bag-of-tokens vectors. Always
//!   available, no model files needed; texts sharing tokens land near each
//!   other, so retrieval behaves sensibly even without a real model.
//! - `LocalEmbedder`: ONNX Runtime inference over a sentence-transformer
//!   model (requires the `local-embeddings` feature).
//!
//! Everything is strictly offline. The dimensionality `D` is a deploy-time
//! constant ([`EMBEDDING_DIMS`]); the memory store rejects vectors of any
//! other length.

use std::sync::Arc;

use async_trait::async_trait;

pub mod context;
pub mod error;

#[cfg(feature = "local-embeddings")]
pub mod local;

pub use context::{contextual_prefix, embedded_text, enhanced_summary};
pub use error::{EmbedError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Embedding dimensionality (all-MiniLM-L6-v2 class models produce 384-dim
/// vectors). Deploy-time constant; changing it requires re-embedding.
pub const EMBEDDING_DIMS: usize = 384;

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for generating text embeddings.
///
/// Implementations must be deterministic: the same text always produces the
/// same vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts in a batch.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Dimensionality of vectors produced by this embedder.
    fn dimensions(&self) -> usize;

    /// Name of this embedder, recorded in the store's meta table.
    fn name(&self) -> &str;
}

/// A shared embedder handle. Loaded once per process and passed explicitly
/// through the pipelines.
pub type SharedEmbedder = Arc<dyn Embedder>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// Deterministic embedder based on a hashed bag of tokens.
///
/// Each token ≥3 chars is hashed into a handful of vector positions; the
/// result is L2-normalized. Texts with overlapping vocabulary produce
/// similar vectors, so similarity thresholds and ranking are meaningful in
/// tests and in model-less deployments.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIMS)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embedding = vec![0.0f32; self.dimensions];

        for token in tokenize(text) {
            // Each token contributes to 4 positions with signs derived from
            // successive LCG steps of its hash.
            let mut state = fnv1a(token);
            for _ in 0..4 {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let index = (state >> 33) as usize % self.dimensions;
                let sign = if state & 1 == 0 { 1.0 } else { -1.0 };
                embedding[index] += sign;
            }
        }

        // Normalize to unit length. Empty text stays the zero vector.
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Lowercased alphanumeric tokens, skipping anything shorter than 3 chars.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '.' && c != '_' && c != '/')
        .filter(|t| t.len() >= 3)
        .map(|t| t.to_lowercase())
}

fn fnv1a(s: String) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Provider-agnostic embedder configuration.
#[derive(Debug, Clone, Default)]
pub struct EmbedderSpec {
    /// Provider name: "local" or "mock". Empty means "local with mock fallback".
    pub provider: String,
    /// Path to the ONNX model file (local provider).
    pub model_path: Option<std::path::PathBuf>,
    /// Path to tokenizer.json (local provider).
    pub tokenizer_path: Option<std::path::PathBuf>,
}

/// Build a [`SharedEmbedder`] from a spec.
///
/// The local provider falls back to the mock embedder when model files are
/// missing or the `local-embeddings` feature is disabled, so the pipeline
/// always has a working embedder.
pub fn build_embedder(spec: &EmbedderSpec) -> Result<SharedEmbedder> {
    match spec.provider.as_str() {
        "mock" => Ok(Arc::new(MockEmbedder::default())),
        "local" | "" => {
            #[cfg(feature = "local-embeddings")]
            {
                let (model_path, tokenizer_path) = match (&spec.model_path, &spec.tokenizer_path) {
                    (Some(m), Some(t)) => (m.clone(), t.clone()),
                    _ => {
                        let Some(dir) = default_model_dir() else {
                            tracing::warn!("No model directory; falling back to mock embedder");
                            return Ok(Arc::new(MockEmbedder::default()));
                        };
                        (dir.join("model.onnx"), dir.join("tokenizer.json"))
                    }
                };
                if model_path.exists() && tokenizer_path.exists() {
                    let embedder =
                        local::LocalEmbedder::load(&model_path, &tokenizer_path, EMBEDDING_DIMS)?;
                    return Ok(Arc::new(embedder));
                }
                tracing::warn!(
                    "Embedding model not found at {:?}; falling back to mock embedder",
                    model_path
                );
                Ok(Arc::new(MockEmbedder::default()))
            }
            #[cfg(not(feature = "local-embeddings"))]
            {
                tracing::warn!(
                    "Built without the local-embeddings feature; using mock embedder"
                );
                Ok(Arc::new(MockEmbedder::default()))
            }
        }
        other => Err(EmbedError::Config(format!(
            "Unknown embedding provider '{other}'. Valid: local, mock"
        ))),
    }
}

/// Default directory for local embedding model files.
pub fn default_model_dir() -> Option<std::path::PathBuf> {
    dirs::data_dir().map(|d| d.join("engram").join("models"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Similarity
// ─────────────────────────────────────────────────────────────────────────────

/// Cosine similarity between two vectors. Mismatched lengths score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
