//! Core traits defining the interfaces between components.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{Fragment, Hit, IndexOutcome, IndexStats, TermQuery};

/// Document store: search and point lookups against named indices.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // Index operations
    async fn create_index(&self, index: &str, mapping: &Value) -> Result<()>;
    async fn delete_index(&self, index: &str) -> Result<()>;
    async fn index_exists(&self, index: &str) -> Result<bool>;
    async fn refresh(&self, index: &str) -> Result<()>;

    // Document operations
    async fn index(&self, index: &str, id: &str, body: Value, refresh: bool) -> Result<IndexOutcome>;

    /// Point lookup; `Ok(None)` when the document does not exist.
    async fn get(&self, index: &str, id: &str) -> Result<Option<Value>>;

    /// Ranked hits for `query`, best first, at most `size`.
    async fn search(&self, index: &str, query: &TermQuery, size: usize) -> Result<Vec<Hit>>;

    // Stats
    async fn index_stats(&self) -> Result<Vec<IndexStats>>;
}

/// Nearest-neighbour search over stored document vectors.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Hits ordered by descending similarity to `embedding`.
    async fn vector_search(&self, index: &str, embedding: &[f32], k: usize) -> Result<Vec<Hit>>;
}

/// Semantic similarity source used by the hybrid ranker.
#[async_trait]
pub trait VectorSource: Send + Sync {
    /// Up to `k` fragments, most similar first.
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Fragment>>;
}

/// Embedding model trait.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of document texts.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;
}
