//! Embedding and indexing of fragments.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, info};

use specrag_core::{
    DocumentStore, Embedder, FieldMapping, Fragment, RagError, Result, META_ID, META_PARENT_ID,
};

/// Body field holding an inlined parent fragment.
const PARENT_FIELD: &str = "parent";

/// Writes fragments with their embeddings into a vector index.
pub struct FragmentIndexer<S, E> {
    store: Arc<S>,
    embedder: Arc<E>,
    fields: FieldMapping,
}

impl<S: DocumentStore, E: Embedder> FragmentIndexer<S, E> {
    /// Create an indexer with default field names.
    pub fn new(store: Arc<S>, embedder: Arc<E>) -> Self {
        Self {
            store,
            embedder,
            fields: FieldMapping::default(),
        }
    }

    /// Override the stored field names.
    pub fn with_fields(mut self, fields: FieldMapping) -> Self {
        self.fields = fields;
        self
    }

    /// Embed and index `fragments` into `index`.
    ///
    /// Each fragment is stored as `{text, vector, metadata}` under its
    /// metadata `id`, or under a content hash when it has none; the hash
    /// then becomes the stored `metadata.id`. When
    /// `parents` holds an entry for the fragment id, the parent is inlined
    /// under `parent` and its id recorded as `metadata.parent_id`.
    ///
    /// Stops at the first failure, which is logged. Returns the number of
    /// fragments indexed.
    pub async fn add_documents(
        &self,
        index: &str,
        fragments: &[Fragment],
        parents: Option<&HashMap<String, Fragment>>,
    ) -> usize {
        match self.try_add_documents(index, fragments, parents).await {
            Ok(count) => count,
            Err((count, e)) => {
                error!("Error adding documents to {} after {}: {}", index, count, e);
                count
            }
        }
    }

    async fn try_add_documents(
        &self,
        index: &str,
        fragments: &[Fragment],
        parents: Option<&HashMap<String, Fragment>>,
    ) -> std::result::Result<usize, (usize, RagError)> {
        if fragments.is_empty() {
            return Ok(0);
        }

        let texts: Vec<&str> = fragments.iter().map(|f| f.content.as_str()).collect();
        let vectors = self
            .embedder
            .embed_documents(&texts)
            .await
            .map_err(|e| (0, e))?;

        let mut count = 0;
        for (fragment, vector) in fragments.iter().zip(vectors) {
            let id = match fragment.id() {
                Some(id) => id.to_string(),
                None => blake3::hash(fragment.content.as_bytes()).to_hex().to_string(),
            };
            let parent = parents.and_then(|p| p.get(&id));
            let body = self.body(&id, fragment, vector, parent);

            self.store
                .index(index, &id, body, false)
                .await
                .map_err(|e| (count, e))?;
            count += 1;
        }

        self.store.refresh(index).await.map_err(|e| (count, e))?;
        info!("Indexed {} fragments into {}", count, index);
        Ok(count)
    }

    fn body(
        &self,
        id: &str,
        fragment: &Fragment,
        vector: Vec<f32>,
        parent: Option<&Fragment>,
    ) -> Value {
        let mut metadata = fragment.metadata.clone();
        metadata
            .entry(META_ID)
            .or_insert_with(|| Value::String(id.to_string()));
        let mut body = Map::new();

        if let Some(parent) = parent {
            let parent_id = parent.id().map(String::from);
            let mut inlined = Map::new();
            inlined.insert(
                META_ID.to_string(),
                parent_id.clone().map(Value::String).unwrap_or(Value::Null),
            );
            inlined.insert(
                self.fields.text_field.clone(),
                Value::String(parent.content.clone()),
            );
            inlined.insert(
                self.fields.metadata_field.clone(),
                Value::Object(parent.metadata.clone()),
            );
            body.insert(PARENT_FIELD.to_string(), Value::Object(inlined));

            if let Some(parent_id) = parent_id {
                metadata.insert(META_PARENT_ID.to_string(), Value::String(parent_id));
            }
        }

        body.insert(
            self.fields.text_field.clone(),
            Value::String(fragment.content.clone()),
        );
        body.insert(
            self.fields.vector_field.clone(),
            Value::Array(
                vector
                    .into_iter()
                    .map(|x| Value::from(f64::from(x)))
                    .collect(),
            ),
        );
        body.insert(self.fields.metadata_field.clone(), Value::Object(metadata));

        Value::Object(body)
    }

    /// Replace `index` with an empty index using `mapping`.
    ///
    /// Unlike the read paths, failures here are returned as
    /// `RagError::Provisioning`.
    pub async fn create_index(&self, index: &str, mapping: &Value) -> Result<()> {
        let provision = |e: RagError| RagError::provisioning(index, e.to_string());

        if self.store.index_exists(index).await.map_err(provision)? {
            info!("Index '{}' already exists. Deleting it.", index);
            self.store.delete_index(index).await.map_err(provision)?;
        }
        self.store
            .create_index(index, mapping)
            .await
            .map_err(provision)?;

        debug!("Index '{}' created with mapping {}", index, mapping);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use specrag_core::VectorIndex;
    use specrag_core::ScoredFragment;
    use specrag_embed::HashingEmbedder;
    use specrag_query::{EmbeddingVectorSource, HybridRanker, RankerConfig};
    use specrag_store::SqliteStore;

    fn indexer(store: Arc<SqliteStore>) -> FragmentIndexer<SqliteStore, HashingEmbedder> {
        FragmentIndexer::new(store, Arc::new(HashingEmbedder::with_dimension(32).unwrap()))
    }

    #[tokio::test]
    async fn test_add_documents_with_parent() {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        let indexer = indexer(store.clone());

        let parent = Fragment::new("/pets path item").with_meta("id", "/pets");
        let child = Fragment::new("GET /pets").with_meta("id", "get /pets");
        let parents = HashMap::from([("get /pets".to_string(), parent.clone())]);

        assert_eq!(indexer.add_documents("vectors_paths", &[parent], None).await, 1);
        assert_eq!(
            indexer
                .add_documents("vectors_paths", &[child], Some(&parents))
                .await,
            1
        );

        let source = store.get("vectors_paths", "get /pets").await.unwrap().unwrap();
        assert_eq!(source["metadata"]["parent_id"], "/pets");
        assert_eq!(source["parent"]["id"], "/pets");
        assert_eq!(source["parent"]["text"], "/pets path item");

        let fragment = Fragment::from_source(&source, &FieldMapping::default()).unwrap();
        assert_eq!(fragment.parent_id(), Some("/pets"));

        let mut query = vec![0.0; 32];
        query[0] = 1.0;
        let hits = store.vector_search("vectors_paths", &query, 10).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_fragment_without_id_uses_content_hash() {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        let indexer = indexer(store.clone());

        let fragments = [Fragment::new("anonymous")];
        assert_eq!(indexer.add_documents("vectors", &fragments, None).await, 1);

        let id = blake3::hash(b"anonymous").to_hex().to_string();
        let source = store.get("vectors", &id).await.unwrap().unwrap();
        assert_eq!(source["metadata"]["id"], id.as_str());
    }

    #[tokio::test]
    async fn test_fragment_without_id_ranks_once() {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        let embedder = Arc::new(HashingEmbedder::with_dimension(32).unwrap());
        let indexer = FragmentIndexer::new(store.clone(), embedder.clone());

        let fragments = [Fragment::new("list pets"), Fragment::new("create user")];
        assert_eq!(indexer.add_documents("vectors", &fragments, None).await, 2);

        let vectors = Arc::new(EmbeddingVectorSource::new(store.clone(), embedder, "vectors"));
        let ranker = HybridRanker::new(store, vectors, RankerConfig::new("vectors", 0.5).unwrap());
        let ranked = ranker.rank_scored("pets", 10).await.unwrap();

        let pets: Vec<&ScoredFragment> = ranked
            .iter()
            .filter(|s| s.fragment.content == "list pets")
            .collect();
        assert_eq!(pets.len(), 1);
        assert_eq!(
            pets[0].fragment.id(),
            Some(blake3::hash(b"list pets").to_hex().as_str())
        );
    }

    #[tokio::test]
    async fn test_create_index_replaces_existing() {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        let indexer = indexer(store.clone());

        indexer
            .add_documents("paths", &[Fragment::new("old").with_meta("id", "old")], None)
            .await;
        indexer
            .create_index("paths", &json!({"properties": {}}))
            .await
            .unwrap();

        assert!(store.index_exists("paths").await.unwrap());
        assert!(store.get("paths", "old").await.unwrap().is_none());
    }
}
