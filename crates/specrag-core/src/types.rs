//! Core domain types for the retrieval engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RagError, Result};

/// Free-form fragment metadata, keyed by field name.
pub type Metadata = Map<String, Value>;

/// Metadata key holding a fragment's identity.
pub const META_ID: &str = "id";

/// Metadata key pointing at the owning parent fragment.
pub const META_PARENT_ID: &str = "parent_id";

/// Metadata flag set only on synthesized parent copies.
pub const META_IS_PARENT: &str = "is_parent";

/// Names of the fields a stored document uses for its parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Field holding the searchable text.
    #[serde(default = "default_text_field")]
    pub text_field: String,

    /// Field holding the embedding vector.
    #[serde(default = "default_vector_field")]
    pub vector_field: String,

    /// Field holding fragment metadata.
    #[serde(default = "default_metadata_field")]
    pub metadata_field: String,

    /// Field holding the lookup key of path and component documents.
    #[serde(default = "default_key_field")]
    pub key_field: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            text_field: default_text_field(),
            vector_field: default_vector_field(),
            metadata_field: default_metadata_field(),
            key_field: default_key_field(),
        }
    }
}

fn default_text_field() -> String {
    "text".to_string()
}

fn default_vector_field() -> String {
    "vector".to_string()
}

fn default_metadata_field() -> String {
    "metadata".to_string()
}

fn default_key_field() -> String {
    "key".to_string()
}

/// A unit of indexed content handed to the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Text content.
    pub content: String,

    /// Metadata, including `id` and optionally `parent_id` / `is_parent`.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Fragment {
    /// Create a fragment with empty metadata.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Builder-style metadata setter.
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Build a fragment from a raw store source.
    ///
    /// The text field must be a string; the metadata field, when present,
    /// must be an object.
    pub fn from_source(source: &Value, fields: &FieldMapping) -> Result<Self> {
        let content = source
            .get(&fields.text_field)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RagError::malformed(format!("missing text field '{}'", fields.text_field))
            })?;

        let metadata = match source.get(&fields.metadata_field) {
            None | Some(Value::Null) => Metadata::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                return Err(RagError::malformed(format!(
                    "metadata field '{}' is not an object: {}",
                    fields.metadata_field, other
                )))
            }
        };

        Ok(Self {
            content: content.to_string(),
            metadata,
        })
    }

    /// Store body for this fragment (text and metadata only).
    pub fn to_source(&self, fields: &FieldMapping) -> Value {
        let mut body = Map::new();
        body.insert(fields.text_field.clone(), Value::String(self.content.clone()));
        body.insert(
            fields.metadata_field.clone(),
            Value::Object(self.metadata.clone()),
        );
        Value::Object(body)
    }

    /// Identity from metadata, if set.
    pub fn id(&self) -> Option<&str> {
        self.metadata.get(META_ID).and_then(Value::as_str)
    }

    /// Parent identifier; empty strings count as unset.
    pub fn parent_id(&self) -> Option<&str> {
        self.metadata
            .get(META_PARENT_ID)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Whether this fragment was synthesized by parent expansion.
    pub fn is_parent(&self) -> bool {
        self.metadata
            .get(META_IS_PARENT)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// A fragment paired with its relevance score during ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredFragment {
    /// Identifier the score is accumulated under.
    pub id: String,

    /// Accumulated relevance score (higher is better).
    pub score: f32,

    /// The fragment itself.
    pub fragment: Fragment,
}

/// A raw search hit from the document store.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// Document identifier.
    pub id: String,

    /// Native relevance score (higher is better).
    pub score: f32,

    /// Stored source document.
    pub source: Value,
}

/// Query shapes understood by the document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermQuery {
    /// Full-text match: any analyzed term of `text` in `field`.
    Match { field: String, text: String },

    /// Exact match of `value` against `field`.
    Term { field: String, value: String },
}

impl TermQuery {
    /// Full-text match query.
    pub fn matching(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Match {
            field: field.into(),
            text: text.into(),
        }
    }

    /// Exact term query.
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Term {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Result status of an index write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexOutcome {
    Created,
    Updated,
}

impl std::fmt::Display for IndexOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
        }
    }
}

/// Kinds of reusable OpenAPI components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComponentType {
    Schemas,
    Responses,
    Parameters,
    Examples,
    RequestBodies,
    Headers,
    SecuritySchemes,
    Links,
    Callbacks,
}

impl ComponentType {
    /// Every component type, in the order the loader walks them.
    pub const ALL: [ComponentType; 9] = [
        Self::Schemas,
        Self::Responses,
        Self::Parameters,
        Self::Examples,
        Self::RequestBodies,
        Self::Headers,
        Self::SecuritySchemes,
        Self::Links,
        Self::Callbacks,
    ];

    /// Name as it appears under `components` in a specification.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schemas => "schemas",
            Self::Responses => "responses",
            Self::Parameters => "parameters",
            Self::Examples => "examples",
            Self::RequestBodies => "requestBodies",
            Self::Headers => "headers",
            Self::SecuritySchemes => "securitySchemes",
            Self::Links => "links",
            Self::Callbacks => "callbacks",
        }
    }

    /// Parse a component type name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Store identifier of the component `name` of this type.
    pub fn document_id(&self, name: &str) -> String {
        format!("{}_{}", self.as_str(), name)
    }
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One API path with its per-verb method definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathDocument {
    /// The path string, e.g. `/pets/{id}`.
    pub key: String,

    /// Specification-level `info` object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,

    /// Method definitions keyed by HTTP verb.
    #[serde(default)]
    pub methods: Map<String, Value>,
}

impl PathDocument {
    /// Validate a raw store source as a path document.
    pub fn from_source(source: &Value) -> Result<Self> {
        let doc: PathDocument = serde_json::from_value(source.clone())
            .map_err(|e| RagError::malformed(format!("invalid path document: {}", e)))?;

        for (verb, method) in &doc.methods {
            let Some(method) = method.as_object() else {
                return Err(RagError::malformed(format!(
                    "method '{}' of {} is not an object",
                    verb, doc.key
                )));
            };
            if let Some(params) = method.get("parameters") {
                if !params.is_array() {
                    return Err(RagError::malformed(format!(
                        "parameters of {} {} is not a list",
                        verb, doc.key
                    )));
                }
            }
        }

        Ok(doc)
    }

    /// Parameter list of one method, empty when absent.
    pub fn parameters(&self, verb: &str) -> &[Value] {
        self.methods
            .get(verb)
            .and_then(|m| m.get("parameters"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// One named reusable component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDocument {
    /// Component name, e.g. `Pet`.
    pub key: String,

    /// The component body.
    pub value: Value,

    /// Which `components` section it came from.
    pub component_type: ComponentType,
}

impl ComponentDocument {
    /// Validate a raw store source as a component document.
    pub fn from_source(source: &Value) -> Result<Self> {
        serde_json::from_value(source.clone())
            .map_err(|e| RagError::malformed(format!("invalid component document: {}", e)))
    }

    /// Store identifier, `<component_type>_<name>`.
    pub fn document_id(&self) -> String {
        self.component_type.document_id(&self.key)
    }
}

/// A path together with every component it transitively references.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathContext {
    pub path: PathDocument,
    pub components: Vec<ComponentDocument>,
}

/// Document counts for one index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Index name.
    pub name: String,

    /// Number of stored documents.
    pub documents: u64,

    /// Number of documents carrying a vector.
    pub vectors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fragment_from_source() {
        let fields = FieldMapping::default();
        let source = json!({
            "text": "GET /pets lists pets",
            "metadata": {"id": "p1", "parent_id": "root"}
        });
        let fragment = Fragment::from_source(&source, &fields).unwrap();
        assert_eq!(fragment.content, "GET /pets lists pets");
        assert_eq!(fragment.id(), Some("p1"));
        assert_eq!(fragment.parent_id(), Some("root"));
        assert!(!fragment.is_parent());
    }

    #[test]
    fn test_fragment_rejects_missing_text() {
        let fields = FieldMapping::default();
        let err = Fragment::from_source(&json!({"metadata": {}}), &fields).unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_DOCUMENT");

        let err = Fragment::from_source(&json!({"text": "x", "metadata": 3}), &fields).unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_DOCUMENT");
    }

    #[test]
    fn test_empty_parent_id_is_unset() {
        let fragment = Fragment::new("x").with_meta(META_PARENT_ID, "");
        assert_eq!(fragment.parent_id(), None);
    }

    #[test]
    fn test_component_type_names() {
        assert_eq!(ComponentType::parse("requestBodies"), Some(ComponentType::RequestBodies));
        assert_eq!(ComponentType::parse("widgets"), None);
        assert_eq!(ComponentType::Schemas.document_id("Pet"), "schemas_Pet");
        assert_eq!(
            serde_json::to_value(ComponentType::SecuritySchemes).unwrap(),
            json!("securitySchemes")
        );
    }

    #[test]
    fn test_path_document_validation() {
        let doc = PathDocument::from_source(&json!({
            "key": "/pets",
            "info": {"title": "Petstore"},
            "methods": {"get": {"parameters": [{"name": "limit"}]}}
        }))
        .unwrap();
        assert_eq!(doc.parameters("get").len(), 1);
        assert!(doc.parameters("post").is_empty());

        assert!(PathDocument::from_source(&json!({"methods": {}})).is_err());
        assert!(PathDocument::from_source(&json!({
            "key": "/pets",
            "methods": {"get": {"parameters": "limit"}}
        }))
        .is_err());
    }

    #[test]
    fn test_component_document_validation() {
        let doc = ComponentDocument::from_source(&json!({
            "key": "Pet",
            "value": {"type": "object"},
            "component_type": "schemas"
        }))
        .unwrap();
        assert_eq!(doc.document_id(), "schemas_Pet");

        assert!(ComponentDocument::from_source(&json!({
            "key": "Pet",
            "value": {},
            "component_type": "widgets"
        }))
        .is_err());
    }
}
