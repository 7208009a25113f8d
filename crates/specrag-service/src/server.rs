//! Tool server implementation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use specrag_core::{DocumentStore, Embedder, EmbeddingBackend, RagError, SpecRagConfig};
use specrag_embed::ConfiguredEmbedder;
use specrag_ingest::Ingestor;
use specrag_query::{EmbeddingVectorSource, HybridRanker, ParentExpander, RankerConfig, Retriever};
use specrag_resolve::ReferenceResolver;
use specrag_store::SqliteStore;

type StoreVectors = EmbeddingVectorSource<SqliteStore, ConfiguredEmbedder>;

/// Spec RAG server state.
pub struct SpecRagServer {
    /// Database store.
    store: Arc<SqliteStore>,

    /// Embedder.
    embedder: Arc<ConfiguredEmbedder>,

    /// Reference resolver over the keyed indices.
    resolver: ReferenceResolver<SqliteStore>,

    /// Ingestion pipeline.
    ingestor: Ingestor<SqliteStore, ConfiguredEmbedder>,

    /// Active configuration.
    config: SpecRagConfig,
}

/// Which fragments a search runs over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// Path and operation fragments.
    #[default]
    Paths,

    /// Schema fragments.
    Components,
}

/// Search request parameters.
#[derive(Debug, Deserialize, Serialize)]
pub struct SearchParams {
    /// The user question.
    pub query: String,

    /// Maximum number of ranked fragments (default: configured `top_k`).
    pub top_k: Option<usize>,

    /// Fragments to search (default: paths).
    #[serde(default)]
    pub scope: SearchScope,
}

/// Path lookup parameters.
#[derive(Debug, Deserialize, Serialize)]
pub struct PathParams {
    /// Path key, e.g. `/pets/{id}`.
    pub path: String,
}

/// Schema lookup parameters.
#[derive(Debug, Deserialize, Serialize)]
pub struct SchemaParams {
    /// Component name, e.g. `Pet`.
    pub key: String,
}

/// Ingest request parameters.
#[derive(Debug, Deserialize, Serialize)]
pub struct IngestParams {
    /// OpenAPI document as JSON text.
    pub content: String,
}

/// Tool result.
#[derive(Debug, Serialize)]
pub struct ToolResult {
    /// Whether the operation was successful.
    pub success: bool,

    /// Result message or content.
    pub message: String,
}

impl ToolResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    fn failed(action: &str, e: &RagError) -> Self {
        Self::error(format!("{} failed [{}]: {}", action, e.error_code(), e))
    }
}

impl SpecRagServer {
    /// Create a server over the configured on-disk database.
    pub fn new(config: SpecRagConfig) -> Result<Self, RagError> {
        config.validate()?;
        info!(
            "Initializing specrag server with database at {:?}",
            config.database.path
        );

        let store = Arc::new(SqliteStore::open(&config.database, config.fields.clone())?);
        Self::with_store(store, config)
    }

    /// Create a server with an in-memory database, default configuration
    /// and the feature-hashing embedder.
    pub fn new_memory() -> Result<Self, RagError> {
        info!("Initializing specrag server with in-memory database");

        let mut config = SpecRagConfig::default();
        config.embedding.backend = EmbeddingBackend::Hashing;
        let store = Arc::new(SqliteStore::open_memory_with_fields(config.fields.clone())?);
        Self::with_store(store, config)
    }

    fn with_store(store: Arc<SqliteStore>, config: SpecRagConfig) -> Result<Self, RagError> {
        let embedder = Arc::new(ConfiguredEmbedder::from_config(&config.embedding)?);
        let resolver = ReferenceResolver::new(
            store.clone(),
            config.indices.paths.clone(),
            config.indices.components.clone(),
        )
        .with_key_field(config.fields.key_field.clone());
        let ingestor = Ingestor::new(
            store.clone(),
            embedder.clone(),
            config.indices.clone(),
            config.fields.clone(),
        );

        Ok(Self {
            store,
            embedder,
            resolver,
            ingestor,
            config,
        })
    }

    /// Get the server info.
    pub fn info() -> ServerInfo {
        ServerInfo {
            name: "specrag".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Hybrid retrieval and $ref resolution over OpenAPI specifications"
                .to_string(),
        }
    }

    /// List available tools.
    pub fn tools() -> Vec<ToolInfo> {
        vec![
            ToolInfo {
                name: "spec_search".to_string(),
                description: "Find the specification fragments most relevant to a question"
                    .to_string(),
            },
            ToolInfo {
                name: "spec_path".to_string(),
                description: "Get a path with every component it references".to_string(),
            },
            ToolInfo {
                name: "spec_schema".to_string(),
                description: "Get a component with all references inlined".to_string(),
            },
            ToolInfo {
                name: "spec_ingest".to_string(),
                description: "Load an OpenAPI JSON document".to_string(),
            },
            ToolInfo {
                name: "spec_init".to_string(),
                description: "Recreate all indices empty".to_string(),
            },
            ToolInfo {
                name: "spec_stats".to_string(),
                description: "Get document counts per index".to_string(),
            },
        ]
    }

    /// Get the active configuration.
    pub fn config(&self) -> &SpecRagConfig {
        &self.config
    }

    fn retriever(
        &self,
        scope: SearchScope,
        top_k: usize,
    ) -> Result<Retriever<SqliteStore, StoreVectors>, RagError> {
        let index = match scope {
            SearchScope::Paths => &self.config.indices.path_vectors,
            SearchScope::Components => &self.config.indices.component_vectors,
        };
        let fields = self.config.fields.clone();

        let vectors = Arc::new(
            EmbeddingVectorSource::new(self.store.clone(), self.embedder.clone(), index.as_str())
                .with_fields(fields.clone()),
        );
        let ranker_config =
            RankerConfig::new(index.as_str(), self.config.retrieval.alpha)?.with_fields(fields.clone());
        let ranker = HybridRanker::new(self.store.clone(), vectors, ranker_config);
        let expander = self.config.retrieval.expand_parents.then(|| {
            ParentExpander::new(self.store.clone(), index.as_str()).with_fields(fields)
        });

        Ok(Retriever::new(ranker, expander, top_k))
    }

    /// Search the ingested fragments.
    pub async fn spec_search(&self, params: SearchParams) -> ToolResult {
        info!("Searching {:?} for: {:?}", params.scope, params.query);

        let top_k = params.top_k.unwrap_or(self.config.retrieval.top_k);
        if top_k == 0 {
            return ToolResult::error("top_k must be at least 1");
        }

        let retriever = match self.retriever(params.scope, top_k) {
            Ok(retriever) => retriever,
            Err(e) => return ToolResult::failed("Search", &e),
        };

        let fragments = retriever.get_relevant_documents(&params.query).await;
        if fragments.is_empty() {
            return ToolResult::success("No matching fragments found.");
        }

        let mut output = format!("Found {} fragments:\n\n", fragments.len());
        for (rank, fragment) in fragments.iter().enumerate() {
            let label = if fragment.is_parent() { "parent" } else { "match" };
            output.push_str(&format!(
                "---\n[{}] {} ({})\n```json\n{}\n```\n\n",
                rank + 1,
                fragment.id().unwrap_or("(no id)"),
                label,
                fragment.content
            ));
        }

        ToolResult::success(output)
    }

    /// A path together with its referenced components.
    pub async fn spec_path(&self, params: PathParams) -> ToolResult {
        info!("Resolving path: {}", params.path);

        match self
            .resolver
            .get_path_with_resolved_components(&params.path)
            .await
        {
            Some(context) => match serde_json::to_string_pretty(&context) {
                Ok(text) => ToolResult::success(text),
                Err(e) => ToolResult::failed("Serialization", &RagError::from(e)),
            },
            None => ToolResult::error(format!("Path '{}' not found.", params.path)),
        }
    }

    /// A component with all references inlined.
    pub async fn spec_schema(&self, params: SchemaParams) -> ToolResult {
        info!("Resolving schema: {}", params.key);

        match self.resolver.get_fully_resolved_schema(&params.key).await {
            Some(text) => ToolResult::success(text),
            None => ToolResult::error(format!("Schema '{}' not found.", params.key)),
        }
    }

    /// Load an OpenAPI JSON document.
    pub async fn spec_ingest(&self, params: IngestParams) -> ToolResult {
        let spec: Value = match serde_json::from_str(params.content.trim()) {
            Ok(spec) => spec,
            Err(e) => return ToolResult::failed("Parsing", &RagError::from(e)),
        };

        match self.ingestor.ingest_spec(&spec).await {
            Ok(report) => {
                let mut output = String::from("Ingested specification:\n\n");
                output.push_str(&format!("- Path fragments: {}\n", report.path_fragments));
                output.push_str(&format!(
                    "- Component fragments: {}\n",
                    report.component_fragments
                ));
                output.push_str(&format!(
                    "- Paths: {} written, {} failed\n",
                    report.paths.written, report.paths.failed
                ));
                output.push_str(&format!(
                    "- Components: {} written, {} failed\n",
                    report.components.written, report.components.failed
                ));
                ToolResult::success(output)
            }
            Err(e) => ToolResult::failed("Ingest", &e),
        }
    }

    /// Recreate all indices empty.
    pub async fn spec_init(&self) -> ToolResult {
        match self.ingestor.init_indices().await {
            Ok(()) => ToolResult::success(format!(
                "Indices {} created.",
                self.config.indices.all().join(", ")
            )),
            Err(e) => ToolResult::failed("Index initialization", &e),
        }
    }

    /// Document counts per index.
    pub async fn spec_stats(&self) -> ToolResult {
        match self.store.index_stats().await {
            Ok(stats) => {
                if stats.is_empty() {
                    return ToolResult::success("No indices found.");
                }

                let mut output = format!(
                    "Embedder: {} ({} dimensions)\nFound {} indices:\n\n",
                    self.embedder.name(),
                    self.embedder.dimension(),
                    stats.len()
                );
                for index in stats {
                    output.push_str(&format!(
                        "- {}: {} documents, {} vectors\n",
                        index.name, index.documents, index.vectors
                    ));
                }
                ToolResult::success(output)
            }
            Err(e) => ToolResult::failed("Stats", &e),
        }
    }
}

/// Server info.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

/// Tool info.
#[derive(Debug, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PETSTORE: &str = r##"{
        "openapi": "3.0.0",
        "info": {"title": "Petstore", "version": "1.0.0"},
        "paths": {
            "/pets": {
                "get": {
                    "summary": "List all pets",
                    "operationId": "listPets",
                    "parameters": [{"name": "limit", "in": "query", "example": 20}],
                    "responses": {"200": {"content": {"application/json": {
                        "schema": {"$ref": "#/components/schemas/Pets"}
                    }}}}
                }
            },
            "/users/{id}": {
                "get": {
                    "summary": "Find a user",
                    "responses": {"200": {"content": {"application/json": {
                        "schema": {"$ref": "#/components/schemas/User"}
                    }}}}
                }
            }
        },
        "components": {
            "schemas": {
                "Pet": {"type": "object", "properties": {"owner": {"$ref": "#/components/schemas/User"}}},
                "Pets": {"type": "array", "items": {"$ref": "#/components/schemas/Pet"}},
                "User": {"type": "object", "properties": {"pets": {"$ref": "#/components/schemas/Pets"}}}
            }
        }
    }"##;

    async fn loaded_server() -> SpecRagServer {
        let server = SpecRagServer::new_memory().unwrap();
        assert!(server.spec_init().await.success);
        let result = server
            .spec_ingest(IngestParams {
                content: PETSTORE.to_string(),
            })
            .await;
        assert!(result.success, "Ingest failed: {}", result.message);
        server
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = SpecRagServer::new_memory().unwrap();
        let info = SpecRagServer::info();
        assert_eq!(info.name, "specrag");
        assert_eq!(server.config().retrieval.top_k, 15);
    }

    #[tokio::test]
    async fn test_tools_list() {
        let tools = SpecRagServer::tools();
        assert_eq!(tools.len(), 6);
        assert!(tools.iter().any(|t| t.name == "spec_search"));
    }

    #[tokio::test]
    async fn test_ingest_and_search() {
        let server = loaded_server().await;

        let result = server
            .spec_search(SearchParams {
                query: "list all pets".to_string(),
                top_k: Some(3),
                scope: SearchScope::Paths,
            })
            .await;
        assert!(result.success, "Search failed: {}", result.message);
        assert!(result.message.contains("get /pets"));
        assert!(result.message.contains("(parent)"));
    }

    #[tokio::test]
    async fn test_search_components() {
        let server = loaded_server().await;

        let result = server
            .spec_search(SearchParams {
                query: "User".to_string(),
                top_k: None,
                scope: SearchScope::Components,
            })
            .await;
        assert!(result.success);
        assert!(result.message.contains("schemas_User"));
    }

    #[tokio::test]
    async fn test_path_tool() {
        let server = loaded_server().await;

        let result = server
            .spec_path(PathParams {
                path: "/users/{id}".to_string(),
            })
            .await;
        assert!(result.success, "Path failed: {}", result.message);

        let context: Value = serde_json::from_str(&result.message).unwrap();
        let keys: Vec<&str> = context["components"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|c| c["key"].as_str())
            .collect();
        assert_eq!(keys, vec!["User", "Pets", "Pet"]);

        let missing = server
            .spec_path(PathParams {
                path: "/owners".to_string(),
            })
            .await;
        assert!(!missing.success);
    }

    #[tokio::test]
    async fn test_schema_tool() {
        let server = loaded_server().await;

        let result = server
            .spec_schema(SchemaParams {
                key: "Pet".to_string(),
            })
            .await;
        assert!(result.success);
        let values: Vec<Value> = serde_json::from_str(&result.message).unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0]["key"], "Pet");

        let missing = server
            .spec_schema(SchemaParams {
                key: "NonExistentKey".to_string(),
            })
            .await;
        assert!(!missing.success);
    }

    #[tokio::test]
    async fn test_ingest_rejects_invalid_json() {
        let server = SpecRagServer::new_memory().unwrap();

        let result = server
            .spec_ingest(IngestParams {
                content: "{not json".to_string(),
            })
            .await;
        assert!(!result.success);
        assert!(result.message.contains("SERIALIZATION_ERROR"));
    }

    #[tokio::test]
    async fn test_stats() {
        let server = loaded_server().await;

        let result = server.spec_stats().await;
        assert!(result.success);
        assert!(result.message.contains("vectors_paths: 4 documents, 4 vectors"));
        assert!(result.message.contains("components: 3 documents, 0 vectors"));
        assert!(result.message.contains("Embedder: hashing (768 dimensions)"));
    }

    #[tokio::test]
    async fn test_search_on_empty_store() {
        let server = SpecRagServer::new_memory().unwrap();

        let result = server
            .spec_search(SearchParams {
                query: "pets".to_string(),
                top_k: None,
                scope: SearchScope::Paths,
            })
            .await;
        assert!(result.success);
        assert!(result.message.contains("No matching fragments"));
    }
}
