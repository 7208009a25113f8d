//! ONNX-based embedding model implementation.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::ArrayViewD;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use specrag_core::{Embedder, RagError, Result};

/// nomic-embed-text-v1.5 configuration.
const EMBEDDING_DIM: usize = 768;
const MAX_TOKENS: usize = 8192;
const NUM_THREADS: usize = 4;

/// Prefix for indexed fragments in asymmetric retrieval.
const DOCUMENT_PREFIX: &str = "search_document: ";

/// Prefix for user questions in asymmetric retrieval.
const QUERY_PREFIX: &str = "search_query: ";

/// ONNX embedder for nomic-embed-text-v1.5 or a compatible model taking
/// `input_ids` and `attention_mask`.
pub struct OnnxEmbedder {
    /// ONNX inference session (wrapped in Mutex for interior mutability).
    session: Mutex<Session>,

    tokenizer: Arc<Tokenizer>,

    dimension: usize,

    max_tokens: usize,
}

impl OnnxEmbedder {
    /// Load the model and tokenizer with nomic-embed-text-v1.5 settings.
    pub fn new(model_path: impl AsRef<Path>, tokenizer_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(model_path, tokenizer_path, EMBEDDING_DIM, MAX_TOKENS, NUM_THREADS)
    }

    /// Load a model producing `dimension`-wide vectors.
    pub fn with_config(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        dimension: usize,
        max_tokens: usize,
        num_threads: usize,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();

        info!("Loading ONNX model from {:?}", model_path);

        let session = Session::builder()
            .map_err(|e| RagError::embedding(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| RagError::embedding(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(num_threads)
            .map_err(|e| RagError::embedding(format!("Failed to set thread count: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| RagError::embedding(format!("Failed to load model: {}", e)))?;

        info!("Loading tokenizer from {:?}", tokenizer_path);

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| RagError::embedding(format!("Failed to load tokenizer: {}", e)))?;

        info!(
            "Embedder initialized: dim={}, max_tokens={}",
            dimension, max_tokens
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer: Arc::new(tokenizer),
            dimension,
            max_tokens,
        })
    }

    fn embed_batch(&self, texts: &[&str], prefix: &str) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prefixed: Vec<String> = texts.iter().map(|t| format!("{}{}", prefix, t)).collect();
        let prefixed_refs: Vec<&str> = prefixed.iter().map(String::as_str).collect();

        let encodings = self
            .tokenizer
            .encode_batch(prefixed_refs, true)
            .map_err(|e| RagError::embedding(format!("Tokenization failed: {}", e)))?;

        // Pad to the longest encoding, capped at the model limit
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(self.max_tokens);
        let batch_size = encodings.len();

        debug!("Embedding batch: size={}, max_len={}", batch_size, max_len);

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            for j in 0..ids.len().min(max_len) {
                input_ids[i * max_len + j] = i64::from(ids[j]);
                attention_mask[i * max_len + j] = i64::from(mask[j]);
            }
        }

        let input_ids_tensor = Tensor::from_array((vec![batch_size, max_len], input_ids))
            .map_err(|e| RagError::embedding(format!("Failed to create input tensor: {}", e)))?;
        let attention_mask_tensor = Tensor::from_array((vec![batch_size, max_len], attention_mask))
            .map_err(|e| RagError::embedding(format!("Failed to create mask tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| RagError::embedding(format!("Failed to lock session: {}", e)))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor
            ])
            .map_err(|e| RagError::embedding(format!("Inference failed: {}", e)))?;

        // Output names differ between exports; the first one holds the states.
        let (name, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| RagError::embedding("No output tensor found"))?;
        debug!("Using model output {}", name);

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| RagError::embedding(format!("Failed to extract tensor: {}", e)))?;

        let shape = view.shape().to_vec();
        let hidden_dim = match shape.as_slice() {
            [_, _, hidden] | [_, hidden] => *hidden,
            _ => {
                return Err(RagError::embedding(format!(
                    "Unexpected output shape: {:?}",
                    shape
                )))
            }
        };
        if hidden_dim != self.dimension {
            return Err(RagError::embedding(format!(
                "Model produces {}-dimensional vectors, configured dimension is {}",
                hidden_dim, self.dimension
            )));
        }

        let embeddings = if shape.len() == 3 {
            let masks: Vec<&[u32]> = encodings.iter().map(|e| e.get_attention_mask()).collect();
            mean_pool(&view, &masks)
        } else {
            // Already pooled
            (0..batch_size)
                .map(|i| l2_normalize((0..hidden_dim).map(|j| view[[i, j]]).collect()))
                .collect()
        };

        Ok(embeddings)
    }
}

/// Mean of the token states under the attention mask, L2-normalized.
///
/// `states` has shape `[batch, seq, hidden]`, one mask per batch row.
fn mean_pool(states: &ArrayViewD<'_, f32>, masks: &[&[u32]]) -> Vec<Vec<f32>> {
    let seq_len = states.shape()[1];
    let hidden_dim = states.shape()[2];

    masks
        .iter()
        .enumerate()
        .map(|(i, mask)| {
            let mut sum = vec![0.0f32; hidden_dim];
            let mut count = 0usize;

            for (j, &attended) in mask.iter().take(seq_len).enumerate() {
                if attended != 1 {
                    continue;
                }
                for (k, total) in sum.iter_mut().enumerate() {
                    *total += states[[i, j, k]];
                }
                count += 1;
            }

            if count == 0 {
                return sum;
            }
            l2_normalize(sum.into_iter().map(|s| s / count as f32).collect())
        })
        .collect()
}

fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        // Session is not Send; inference runs on the calling task
        self.embed_batch(texts, DOCUMENT_PREFIX)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text], QUERY_PREFIX)?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding("No embedding returned"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_missing_model_is_embedding_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = OnnxEmbedder::new(dir.path().join("model.onnx"), dir.path().join("tokenizer.json"));
        match result {
            Err(e) => assert_eq!(e.error_code(), "EMBEDDING_ERROR"),
            Ok(_) => panic!("loading a missing model should fail"),
        }
    }

    #[test]
    fn test_mean_pool_ignores_padding() {
        let masks: [&[u32]; 2] = [&[1, 1], &[1, 0]];

        // Second sequence is padded with a large state that must not count.
        let mut states = Array3::<f32>::zeros((2, 2, 2));
        states[[0, 0, 0]] = 1.0;
        states[[0, 1, 1]] = 1.0;
        states[[1, 0, 0]] = 2.0;
        states[[1, 1, 1]] = 100.0;

        let pooled = mean_pool(&states.view().into_dyn(), &masks);
        let half = 1.0 / 2.0f32.sqrt();
        assert!((pooled[0][0] - half).abs() < 1e-6);
        assert!((pooled[0][1] - half).abs() < 1e-6);
        assert_eq!(pooled[1], vec![1.0, 0.0]);

        let empty: [&[u32]; 1] = [&[0, 0]];
        let pooled = mean_pool(&states.view().into_dyn(), &empty);
        assert_eq!(pooled[0], vec![0.0, 0.0]);
    }
}
