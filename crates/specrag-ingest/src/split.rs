//! Splitting a specification into embeddable fragments.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::{debug, info};

use specrag_core::{Fragment, RagError, Result, META_ID};

/// Fragment kind for a whole path item.
pub const KIND_PATH: &str = "path";

/// Fragment kind for a single operation of a path.
pub const KIND_OPERATION: &str = "operation";

/// Fragment kind for a `components.schemas` entry.
pub const KIND_COMPONENT: &str = "schema";

/// Operation keys of an OpenAPI path item.
const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Specification-level context repeated in every path fragment.
const PATH_CONTEXT_KEYS: [&str; 3] = ["info", "servers", "security"];

/// `components` sections repeated in every schema fragment.
const COMPONENT_CONTEXT_KEYS: [&str; 2] = ["securitySchemes", "basicAuth"];

/// Fragments produced from one specification.
#[derive(Debug, Clone, Default)]
pub struct SpecFragments {
    /// One fragment per path item, carrying the specification context.
    pub paths: Vec<Fragment>,

    /// One fragment per operation, each a child of its path fragment.
    pub operations: Vec<Fragment>,

    /// Path fragment for each operation fragment id.
    pub parents: HashMap<String, Fragment>,

    /// One fragment per `components.schemas` entry.
    pub components: Vec<Fragment>,
}

/// Split a parsed OpenAPI document into fragments.
///
/// The document must contain a `paths` object; `components` is optional.
pub fn split_spec(spec: &Value) -> Result<SpecFragments> {
    let paths = spec
        .get("paths")
        .and_then(Value::as_object)
        .ok_or_else(|| RagError::malformed("specification has no 'paths' object"))?;

    let mut fragments = SpecFragments::default();

    let mut context = Map::new();
    for key in PATH_CONTEXT_KEYS {
        if let Some(value) = spec.get(key).filter(|v| is_present(v)) {
            context.insert(key.to_string(), value.clone());
        }
    }

    for (path, item) in paths {
        if !is_present(item) {
            debug!("Skipping empty path item {}", path);
            continue;
        }

        let mut content = context.clone();
        content.insert(path.clone(), item.clone());
        let parent = fragment(path, path, KIND_PATH, &content)?;

        if let Some(item) = item.as_object() {
            for (verb, operation) in item {
                if !HTTP_METHODS.contains(&verb.as_str()) {
                    continue;
                }
                let id = format!("{} {}", verb, path);
                let mut method = Map::new();
                method.insert(verb.clone(), operation.clone());
                let mut content = Map::new();
                content.insert(path.clone(), Value::Object(method));

                fragments
                    .operations
                    .push(fragment(&id, path, KIND_OPERATION, &content)?);
                fragments.parents.insert(id, parent.clone());
            }
        }

        fragments.paths.push(parent);
    }

    match spec.get("components").and_then(Value::as_object) {
        Some(components) => {
            let mut context = Map::new();
            for key in COMPONENT_CONTEXT_KEYS {
                if let Some(value) = components.get(key).filter(|v| is_present(v)) {
                    context.insert(key.to_string(), value.clone());
                }
            }

            if let Some(schemas) = components.get("schemas").and_then(Value::as_object) {
                for (name, schema) in schemas {
                    if !is_present(schema) {
                        continue;
                    }
                    let mut content = context.clone();
                    content.insert(name.clone(), schema.clone());
                    let id = format!("schemas_{}", name);
                    fragments
                        .components
                        .push(fragment(&id, name, KIND_COMPONENT, &content)?);
                }
            }
        }
        None => info!("No components found in the specification"),
    }

    debug!(
        "Split specification into {} path, {} operation and {} component fragments",
        fragments.paths.len(),
        fragments.operations.len(),
        fragments.components.len()
    );
    Ok(fragments)
}

fn fragment(id: &str, key: &str, kind: &str, content: &Map<String, Value>) -> Result<Fragment> {
    Ok(Fragment::new(serde_json::to_string(content)?)
        .with_meta(META_ID, id)
        .with_meta("key", key)
        .with_meta("kind", kind))
}

/// Null, `false`, zero and empty containers carry nothing worth embedding.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
