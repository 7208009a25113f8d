//! Configuration types for specrag.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{RagError, Result};
use crate::types::FieldMapping;

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecRagConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Index names.
    #[serde(default)]
    pub indices: IndexConfig,

    /// Stored document field names.
    #[serde(default)]
    pub fields: FieldMapping,

    /// Retrieval configuration.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: 30000,
        }
    }
}

/// Names of the four indices an ingested specification lands in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Structured path documents, keyed by path.
    #[serde(default = "default_paths_index")]
    pub paths: String,

    /// Structured component documents, keyed by component name.
    #[serde(default = "default_components_index")]
    pub components: String,

    /// Embedded path fragments.
    #[serde(default = "default_path_vectors_index")]
    pub path_vectors: String,

    /// Embedded component fragments.
    #[serde(default = "default_component_vectors_index")]
    pub component_vectors: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            paths: default_paths_index(),
            components: default_components_index(),
            path_vectors: default_path_vectors_index(),
            component_vectors: default_component_vectors_index(),
        }
    }
}

impl IndexConfig {
    /// All index names.
    pub fn all(&self) -> [&str; 4] {
        [
            &self.paths,
            &self.components,
            &self.path_vectors,
            &self.component_vectors,
        ]
    }
}

/// Retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Keyword-vs-vector trust (1 = keyword only, 0 = vector only).
    #[serde(default = "default_alpha")]
    pub alpha: f32,

    /// Number of fragments to keep after ranking.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Attach parent fragments to ranked results.
    #[serde(default = "default_true")]
    pub expand_parents: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            top_k: 15,
            expand_parents: true,
        }
    }
}

/// Which embedder produces fragment vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// ONNX model when its files are present, feature hashing otherwise.
    #[default]
    Auto,

    /// ONNX model; fails when the model cannot be loaded.
    Onnx,

    /// Feature hashing, no model files needed.
    Hashing,
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedder selection.
    #[serde(default)]
    pub backend: EmbeddingBackend,

    /// Directory holding `model.onnx` and `tokenizer.json`.
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Vector dimension; must match the model output.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Maximum tokens per embedded text.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Auto,
            model_path: default_model_path(),
            dimension: 768,
            max_tokens: 8192,
            num_threads: 4,
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_busy_timeout() -> u32 {
    30000
}

fn default_paths_index() -> String {
    "paths".to_string()
}

fn default_components_index() -> String {
    "components".to_string()
}

fn default_path_vectors_index() -> String {
    "vectors_paths".to_string()
}

fn default_component_vectors_index() -> String {
    "vectors_components".to_string()
}

fn default_alpha() -> f32 {
    0.5
}

fn default_top_k() -> usize {
    15
}

fn default_dimension() -> usize {
    768
}

fn default_max_tokens() -> usize {
    8192
}

fn default_num_threads() -> usize {
    4
}

fn default_model_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("specrag")
        .join("models")
        .join("nomic-embed-text-v1.5")
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("specrag")
        .join("specrag.db")
}

impl SpecRagConfig {
    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| RagError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("specrag").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("specrag.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.retrieval.alpha) {
            return Err(RagError::Config {
                message: format!(
                    "retrieval.alpha must be within [0, 1], got {}",
                    self.retrieval.alpha
                ),
            });
        }
        if self.retrieval.top_k == 0 {
            return Err(RagError::Config {
                message: "retrieval.top_k must be at least 1".to_string(),
            });
        }
        if self.embedding.dimension == 0 {
            return Err(RagError::Config {
                message: "embedding.dimension must be at least 1".to_string(),
            });
        }
        if self.embedding.max_tokens == 0 || self.embedding.num_threads == 0 {
            return Err(RagError::Config {
                message: "embedding.max_tokens and embedding.num_threads must be at least 1"
                    .to_string(),
            });
        }
        Ok(())
    }
}
