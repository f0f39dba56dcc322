//! Local embedding inference with ONNX Runtime.
//!
//! Loads a sentence-transformer ONNX export plus its `tokenizer.json` and
//! produces mean-pooled, L2-normalized embeddings entirely offline. Requires
//! the `local-embeddings` feature.

use std::path::Path;

use async_trait::async_trait;
use ndarray::Array2;
use ort::{GraphOptimizationLevel, Session};
use tokenizers::Tokenizer;

use crate::error::{EmbedError, Result};
use crate::Embedder;

/// Inference batch size; larger inputs are chunked to bound memory.
const BATCH_CHUNK: usize = 32;

/// Embedder backed by a local ONNX model.
///
/// The session is expensive to construct; load once per process and share
/// via [`crate::SharedEmbedder`]. `Session::run` takes `&self`, so the
/// embedder is safe to share across threads without an external mutex.
pub struct LocalEmbedder {
    session: Session,
    tokenizer: Tokenizer,
    dimensions: usize,
}

impl LocalEmbedder {
    /// Load a model and tokenizer from disk.
    pub fn load(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        dimensions: usize,
    ) -> Result<Self> {
        let session = Session::builder()
            .map_err(|e| EmbedError::ModelLoad(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| EmbedError::ModelLoad(e.to_string()))?
            .commit_from_file(model_path.as_ref())
            .map_err(|e| {
                EmbedError::ModelLoad(format!(
                    "failed to load ONNX model from {:?}: {e}",
                    model_path.as_ref()
                ))
            })?;

        let tokenizer = Tokenizer::from_file(tokenizer_path.as_ref()).map_err(|e| {
            EmbedError::ModelLoad(format!(
                "failed to load tokenizer from {:?}: {e}",
                tokenizer_path.as_ref()
            ))
        })?;

        tracing::info!(model = ?model_path.as_ref(), dimensions, "Local embedder loaded");
        Ok(Self {
            session,
            tokenizer,
            dimensions,
        })
    }

    /// Run inference on one batch of encodings.
    fn run_batch(&self, encodings: &[tokenizers::Encoding]) -> Result<Vec<Vec<f32>>> {
        let batch_size = encodings.len();
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let mut token_type_ids = vec![0i64; batch_size * max_len];

        for (i, enc) in encodings.iter().enumerate() {
            let offset = i * max_len;
            for (j, (&id, (&mask, &ty))) in enc
                .get_ids()
                .iter()
                .zip(enc.get_attention_mask().iter().zip(enc.get_type_ids()))
                .enumerate()
            {
                input_ids[offset + j] = id as i64;
                attention_mask[offset + j] = mask as i64;
                token_type_ids[offset + j] = ty as i64;
            }
        }

        let shape_err = |e: ndarray::ShapeError| EmbedError::Inference(e.to_string());
        let ids_array = Array2::from_shape_vec((batch_size, max_len), input_ids).map_err(shape_err)?;
        let mask_array =
            Array2::from_shape_vec((batch_size, max_len), attention_mask.clone()).map_err(shape_err)?;
        let types_array =
            Array2::from_shape_vec((batch_size, max_len), token_type_ids).map_err(shape_err)?;

        let outputs = self
            .session
            .run(
                ort::inputs![
                    "input_ids" => ids_array.view(),
                    "attention_mask" => mask_array.view(),
                    "token_type_ids" => types_array.view(),
                ]
                .map_err(|e| EmbedError::Inference(e.to_string()))?,
            )
            .map_err(|e| EmbedError::Inference(e.to_string()))?;

        let hidden = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedError::Inference(e.to_string()))?;
        let hidden = hidden.view().to_owned();
        let shape = hidden.shape();
        let (seq_len, hidden_dim) = (shape[1], shape[2]);

        if hidden_dim != self.dimensions {
            return Err(EmbedError::Inference(format!(
                "model produced {hidden_dim}-dim vectors, expected {}",
                self.dimensions
            )));
        }

        // Mean pooling over unmasked tokens, then L2 normalization.
        let mut results = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            let mask = &attention_mask[i * max_len..(i + 1) * max_len];
            let mut pooled = vec![0.0f32; hidden_dim];
            let mut count = 0.0f32;

            for (j, &mask_val) in mask.iter().enumerate().take(seq_len) {
                if mask_val > 0 {
                    for k in 0..hidden_dim {
                        pooled[k] += hidden[[i, j, k]];
                    }
                    count += 1.0;
                }
            }
            if count > 0.0 {
                for v in &mut pooled {
                    *v /= count;
                }
            }

            let norm: f32 = pooled.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 1e-9 {
                for v in &mut pooled {
                    *v /= norm;
                }
            }
            results.push(pooled);
        }

        Ok(results)
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Inference("no embedding returned".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings: Vec<_> = texts
            .iter()
            .map(|text| {
                self.tokenizer
                    .encode(*text, true)
                    .map_err(|e| EmbedError::Tokenization(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut all = Vec::with_capacity(texts.len());
        for chunk in encodings.chunks(BATCH_CHUNK) {
            all.extend(self.run_batch(chunk)?);
        }
        Ok(all)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "local"
    }
}
