//! Vector similarity source backed by an embedder and a vector index.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use specrag_core::{Embedder, FieldMapping, Fragment, Result, VectorIndex, VectorSource};

/// Similarity source that embeds the query and searches one vector index.
pub struct EmbeddingVectorSource<S, E> {
    store: Arc<S>,
    embedder: Arc<E>,
    index: String,
    fields: FieldMapping,
}

impl<S: VectorIndex, E: Embedder> EmbeddingVectorSource<S, E> {
    /// Create a source over `index` with default field names.
    pub fn new(store: Arc<S>, embedder: Arc<E>, index: impl Into<String>) -> Self {
        Self {
            store,
            embedder,
            index: index.into(),
            fields: FieldMapping::default(),
        }
    }

    /// Override the field names used to read stored fragments.
    pub fn with_fields(mut self, fields: FieldMapping) -> Self {
        self.fields = fields;
        self
    }
}

#[async_trait]
impl<S: VectorIndex, E: Embedder> VectorSource for EmbeddingVectorSource<S, E> {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Fragment>> {
        let embedding = self.embedder.embed_query(query).await?;
        let hits = self.store.vector_search(&self.index, &embedding, k).await?;
        debug!("Vector search on {} returned {} hits", self.index, hits.len());

        let fragments = hits
            .into_iter()
            .filter_map(|hit| match Fragment::from_source(&hit.source, &self.fields) {
                Ok(fragment) => Some(fragment),
                Err(e) => {
                    warn!("Skipping vector hit {}: {}", hit.id, e);
                    None
                }
            })
            .collect();

        Ok(fragments)
    }
}
