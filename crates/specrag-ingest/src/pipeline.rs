//! End-to-end ingestion of one specification into the four indices.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use specrag_core::{DocumentStore, Embedder, FieldMapping, IndexConfig, Result};

use crate::indexer::FragmentIndexer;
use crate::loader::{BulkLoader, BulkReport};
use crate::split::split_spec;

/// Summary of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Path and operation fragments embedded into the path vector index.
    pub path_fragments: usize,

    /// Schema fragments embedded into the component vector index.
    pub component_fragments: usize,

    /// Structured path documents.
    pub paths: BulkReport,

    /// Structured component documents.
    pub components: BulkReport,
}

/// Loads specifications into the path, component and vector indices.
pub struct Ingestor<S, E> {
    indexer: FragmentIndexer<S, E>,
    loader: BulkLoader<S>,
    indices: IndexConfig,
    fields: FieldMapping,
    dimension: usize,
}

impl<S: DocumentStore, E: Embedder> Ingestor<S, E> {
    /// Create an ingestor writing to `indices`.
    pub fn new(store: Arc<S>, embedder: Arc<E>, indices: IndexConfig, fields: FieldMapping) -> Self {
        let dimension = embedder.dimension();
        Self {
            indexer: FragmentIndexer::new(store.clone(), embedder).with_fields(fields.clone()),
            loader: BulkLoader::new(store),
            indices,
            fields,
            dimension,
        }
    }

    /// Recreate all four indices empty.
    pub async fn init_indices(&self) -> Result<()> {
        let keyed = self.keyed_mapping();
        let vectors = self.vector_mapping();

        self.indexer.create_index(&self.indices.paths, &keyed).await?;
        self.indexer.create_index(&self.indices.components, &keyed).await?;
        self.indexer
            .create_index(&self.indices.path_vectors, &vectors)
            .await?;
        self.indexer
            .create_index(&self.indices.component_vectors, &vectors)
            .await?;

        info!("Initialized indices {:?}", self.indices.all());
        Ok(())
    }

    /// Split, embed and load `spec`.
    ///
    /// Fails only when the document lacks `paths`; individual write
    /// failures are counted in the report.
    pub async fn ingest_spec(&self, spec: &Value) -> Result<IngestReport> {
        let fragments = split_spec(spec)?;

        let mut report = IngestReport::default();
        report.path_fragments += self
            .indexer
            .add_documents(&self.indices.path_vectors, &fragments.paths, None)
            .await;
        report.path_fragments += self
            .indexer
            .add_documents(
                &self.indices.path_vectors,
                &fragments.operations,
                Some(&fragments.parents),
            )
            .await;
        report.component_fragments = self
            .indexer
            .add_documents(&self.indices.component_vectors, &fragments.components, None)
            .await;

        report.paths = self.loader.bulk_write_paths(&self.indices.paths, spec).await?;
        if spec.get("components").is_some() {
            report.components = self
                .loader
                .bulk_write_components(&self.indices.components, spec)
                .await?;
        }

        info!(
            "Ingested specification: {} path fragments, {} component fragments, {} paths, {} components",
            report.path_fragments,
            report.component_fragments,
            report.paths.written,
            report.components.written
        );
        Ok(report)
    }

    fn keyed_mapping(&self) -> Value {
        json!({
            "properties": {
                self.fields.key_field.as_str(): {"type": "keyword"}
            }
        })
    }

    fn vector_mapping(&self) -> Value {
        json!({
            "properties": {
                self.fields.text_field.as_str(): {"type": "text"},
                self.fields.vector_field.as_str(): {"type": "knn_vector", "dimension": self.dimension},
                self.fields.metadata_field.as_str(): {"type": "object"}
            }
        })
    }
}
