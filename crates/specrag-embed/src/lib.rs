//! specrag-embed - Text embeddings for fragment indexing
//!
//! This crate provides two embedders behind the `Embedder` trait:
//!
//! - `OnnxEmbedder`: ONNX Runtime inference with a HuggingFace tokenizer,
//!   document/query prefixes for asymmetric retrieval, attention-masked
//!   mean pooling and L2 normalization
//! - `HashingEmbedder`: deterministic feature hashing that needs no model
//!   files, used offline and in tests
//!
//! `ConfiguredEmbedder` picks one from `EmbeddingConfig`.

mod configured;
mod hashing;
mod onnx;

pub use configured::{ConfiguredEmbedder, MODEL_FILE, TOKENIZER_FILE};
pub use hashing::HashingEmbedder;
pub use onnx::OnnxEmbedder;

// Re-export the Embedder trait for convenience
pub use specrag_core::Embedder;
