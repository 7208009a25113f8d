//! `$ref` discovery in JSON documents.

use serde_json::Value;
use tracing::warn;

use specrag_core::{ComponentType, RagError, Result};

/// JSON key marking a reference.
pub const REF_KEY: &str = "$ref";

/// A parsed `$ref` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRef {
    /// The reference string as written, e.g. `#/components/schemas/Pet`.
    pub raw: String,

    /// Last `/`-separated segment, e.g. `Pet`.
    pub key: String,

    /// Component section named by the reference, if any.
    pub component_type: Option<ComponentType>,
}

impl ComponentRef {
    /// Parse a reference string.
    ///
    /// Fails with `MalformedReference` when the last segment is empty.
    pub fn parse(raw: &str) -> Result<Self> {
        let segments: Vec<&str> = raw.split('/').collect();
        let key = segments.last().copied().unwrap_or_default();
        if key.is_empty() {
            return Err(RagError::MalformedReference {
                reference: raw.to_string(),
            });
        }

        let component_type = match segments.as_slice() {
            [.., "components", section, _] => ComponentType::parse(section),
            _ => None,
        };

        Ok(Self {
            raw: raw.to_string(),
            key: key.to_string(),
            component_type,
        })
    }

    /// Store identifier the loader gives the referenced component.
    pub fn document_id(&self) -> Option<String> {
        self.component_type.map(|t| t.document_id(&self.key))
    }
}

/// Every `$ref` string in `value`, in depth-first document order.
///
/// References with an empty target are logged and skipped.
pub fn find_references(value: &Value) -> Vec<ComponentRef> {
    let mut refs = Vec::new();
    walk(value, &mut refs);
    refs
}

fn walk(value: &Value, refs: &mut Vec<ComponentRef>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match child {
                    Value::String(raw) if key == REF_KEY => {
                        match ComponentRef::parse(raw) {
                            Ok(reference) => refs.push(reference),
                            Err(e) => warn!("Skipping reference: {}", e),
                        }
                    }
                    Value::Object(_) | Value::Array(_) => walk(child, refs),
                    _ => {}
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, refs);
            }
        }
        _ => {}
    }
}
