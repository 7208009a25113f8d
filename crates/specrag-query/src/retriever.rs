//! Retriever combining hybrid ranking with parent expansion.

use std::time::Instant;

use tracing::info;

use specrag_core::{DocumentStore, Fragment, VectorSource};

use crate::expand::ParentExpander;
use crate::ranker::HybridRanker;

/// Retrieval entry point handed to the answer chain.
pub struct Retriever<S, V> {
    ranker: HybridRanker<S, V>,
    expander: Option<ParentExpander<S>>,
    top_k: usize,
}

impl<S: DocumentStore, V: VectorSource> Retriever<S, V> {
    /// Create a new retriever; `expander = None` disables parent expansion.
    pub fn new(ranker: HybridRanker<S, V>, expander: Option<ParentExpander<S>>, top_k: usize) -> Self {
        Self {
            ranker,
            expander,
            top_k,
        }
    }

    /// Ranked fragments for `query`, each followed by its parent when one
    /// is configured and found.
    pub async fn get_relevant_documents(&self, query: &str) -> Vec<Fragment> {
        let start = Instant::now();

        let ranked = self.ranker.rank(query, self.top_k).await;
        let ranked_count = ranked.len();

        let fragments = match &self.expander {
            Some(expander) => expander.expand(ranked).await,
            None => ranked,
        };

        info!(
            "Retrieved {} fragments ({} ranked) in {}ms",
            fragments.len(),
            ranked_count,
            start.elapsed().as_millis()
        );

        fragments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;
    use specrag_core::Embedder;
    use specrag_embed::HashingEmbedder;
    use specrag_store::SqliteStore;

    use crate::ranker::RankerConfig;
    use crate::vector::EmbeddingVectorSource;

    async fn seeded_store(embedder: &HashingEmbedder) -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        let docs = [
            ("pets_root", "/pets path item with get and post", None),
            ("get_pets", "GET /pets lists every pet", Some("pets_root")),
            ("get_users", "GET /users lists every user", None),
        ];
        for (id, text, parent) in docs {
            let vector = embedder.embed_query(text).await.unwrap();
            let mut metadata = json!({"id": id});
            if let Some(parent) = parent {
                metadata["parent_id"] = json!(parent);
            }
            store
                .index(
                    "vectors_paths",
                    id,
                    json!({"text": text, "vector": vector, "metadata": metadata}),
                    true,
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_retrieval_with_parents() {
        let embedder = Arc::new(HashingEmbedder::new());
        let store = seeded_store(&embedder).await;

        let vectors = Arc::new(EmbeddingVectorSource::new(
            store.clone(),
            embedder,
            "vectors_paths",
        ));
        let ranker = HybridRanker::new(
            store.clone(),
            vectors,
            RankerConfig::new("vectors_paths", 0.5).unwrap(),
        );
        let expander = ParentExpander::new(store, "vectors_paths");
        let retriever = Retriever::new(ranker, Some(expander), 2);

        let fragments = retriever.get_relevant_documents("lists every pet").await;

        let pos = fragments
            .iter()
            .position(|f| f.id() == Some("get_pets"))
            .unwrap();
        assert!(fragments[pos + 1].is_parent());
        assert_eq!(fragments[pos + 1].id(), Some("pets_root"));
        assert!(fragments.len() <= 4);
    }

    #[tokio::test]
    async fn test_retrieval_without_expansion() {
        let embedder = Arc::new(HashingEmbedder::new());
        let store = seeded_store(&embedder).await;

        let vectors = Arc::new(EmbeddingVectorSource::new(
            store.clone(),
            embedder,
            "vectors_paths",
        ));
        let ranker = HybridRanker::new(
            store,
            vectors,
            RankerConfig::new("vectors_paths", 0.5).unwrap(),
        );
        let retriever = Retriever::new(ranker, None, 3);

        let fragments = retriever.get_relevant_documents("users").await;
        assert_eq!(fragments.len(), 3);
        assert!(fragments.iter().all(|f| !f.is_parent()));
    }
}
