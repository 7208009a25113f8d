//! Embedder selection from configuration.

use async_trait::async_trait;
use tracing::{info, warn};

use specrag_core::{EmbeddingBackend, EmbeddingConfig, Embedder, Result};

use crate::hashing::HashingEmbedder;
use crate::onnx::OnnxEmbedder;

/// Model file inside `embedding.model_path`.
pub const MODEL_FILE: &str = "model.onnx";

/// Tokenizer file inside `embedding.model_path`.
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// The embedder chosen by `EmbeddingConfig`.
pub enum ConfiguredEmbedder {
    Onnx(OnnxEmbedder),
    Hashing(HashingEmbedder),
}

impl ConfiguredEmbedder {
    /// Build the configured embedder.
    ///
    /// `Auto` loads the ONNX model when both model files exist and falls
    /// back to feature hashing otherwise. `Onnx` fails if the model cannot
    /// be loaded.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let model = config.model_path.join(MODEL_FILE);
        let tokenizer = config.model_path.join(TOKENIZER_FILE);

        let use_onnx = match config.backend {
            EmbeddingBackend::Onnx => true,
            EmbeddingBackend::Hashing => false,
            EmbeddingBackend::Auto => {
                let present = model.is_file() && tokenizer.is_file();
                if !present {
                    warn!(
                        "No embedding model at {:?}, using feature hashing",
                        config.model_path
                    );
                }
                present
            }
        };

        let embedder = if use_onnx {
            Self::Onnx(OnnxEmbedder::with_config(
                model,
                tokenizer,
                config.dimension,
                config.max_tokens,
                config.num_threads,
            )?)
        } else {
            Self::Hashing(HashingEmbedder::with_dimension(config.dimension)?)
        };

        info!("Using {} embedder ({} dimensions)", embedder.name(), config.dimension);
        Ok(embedder)
    }

    /// Short name of the active backend.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Onnx(_) => "onnx",
            Self::Hashing(_) => "hashing",
        }
    }
}

#[async_trait]
impl Embedder for ConfiguredEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        match self {
            Self::Onnx(e) => e.embed_documents(texts).await,
            Self::Hashing(e) => e.embed_documents(texts).await,
        }
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        match self {
            Self::Onnx(e) => e.embed_query(text).await,
            Self::Hashing(e) => e.embed_query(text).await,
        }
    }

    fn dimension(&self) -> usize {
        match self {
            Self::Onnx(e) => e.dimension(),
            Self::Hashing(e) => e.dimension(),
        }
    }
}
