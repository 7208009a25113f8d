//! Reference resolver over the path and component indices.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use specrag_core::{
    ComponentDocument, DocumentStore, PathContext, PathDocument, RagError, Result, TermQuery,
};

use crate::reference::{find_references, ComponentRef, REF_KEY};

/// Hit limit for key lookups; only the first hit is used.
const KEY_LOOKUP_SIZE: usize = 100;

/// Component document field naming its `components` section.
const COMPONENT_TYPE_FIELD: &str = "component_type";

/// Resolved documents keyed by reference key, in discovery order.
///
/// Keys whose lookup missed are remembered too, so one resolve call never
/// fetches the same key twice.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSet {
    docs: Map<String, Value>,
    missed: HashSet<String>,
}

impl ResolvedSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    fn seeded(key: impl Into<String>, root: Value) -> Self {
        let mut set = Self::new();
        set.docs.insert(key.into(), root);
        set
    }

    /// Whether `key` has already been looked up, found or not.
    pub fn contains(&self, key: &str) -> bool {
        self.docs.contains_key(key) || self.missed.contains(key)
    }

    /// Whether a lookup of `key` found nothing.
    pub fn is_missed(&self, key: &str) -> bool {
        self.missed.contains(key)
    }

    /// Resolved document for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.docs.get(key)
    }

    /// Number of resolved documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Resolved keys in discovery order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.docs.keys()
    }

    /// Resolved documents in discovery order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.docs.values()
    }

    /// Consume the set, yielding documents in discovery order.
    pub fn into_values(self) -> impl Iterator<Item = Value> {
        self.docs.into_iter().map(|(_, value)| value)
    }

    fn insert(&mut self, key: String, doc: Value) {
        self.docs.insert(key, doc);
    }

    fn mark_missed(&mut self, key: String) {
        self.missed.insert(key);
    }
}

/// Resolves `$ref` strings against stored component documents.
pub struct ReferenceResolver<S> {
    store: Arc<S>,
    paths_index: String,
    components_index: String,
    key_field: String,
}

impl<S: DocumentStore> ReferenceResolver<S> {
    /// Create a resolver reading paths and components from the given indices.
    pub fn new(
        store: Arc<S>,
        paths_index: impl Into<String>,
        components_index: impl Into<String>,
    ) -> Self {
        Self {
            store,
            paths_index: paths_index.into(),
            components_index: components_index.into(),
            key_field: "key".to_string(),
        }
    }

    /// Override the field holding document keys.
    pub fn with_key_field(mut self, key_field: impl Into<String>) -> Self {
        self.key_field = key_field.into();
        self
    }

    /// First document in `index` whose key field equals `key`.
    pub async fn fetch_by_key(&self, index: &str, key: &str) -> Result<Option<Value>> {
        let query = TermQuery::term(&self.key_field, key);
        let hits = self.store.search(index, &query, KEY_LOOKUP_SIZE).await?;
        Ok(hits.into_iter().next().map(|hit| hit.source))
    }

    /// Path document for `path_key` with every component it transitively
    /// references, in depth-first discovery order.
    pub async fn get_path_with_resolved_components(&self, path_key: &str) -> Option<PathContext> {
        let source = match self.fetch_by_key(&self.paths_index, path_key).await {
            Ok(Some(source)) => source,
            Ok(None) => {
                warn!("No path found for: {}", path_key);
                return None;
            }
            Err(e) => {
                error!("Failed to look up path {}: {}", path_key, e);
                return None;
            }
        };

        let path = match PathDocument::from_source(&source) {
            Ok(path) => path,
            Err(e) => {
                error!("Stored path {} is malformed: {}", path_key, e);
                return None;
            }
        };

        let mut resolved = ResolvedSet::new();
        self.collect_component_refs(&source, &mut resolved).await;

        let components: Vec<ComponentDocument> = resolved
            .into_values()
            .filter_map(|value| match ComponentDocument::from_source(&value) {
                Ok(component) => Some(component),
                Err(e) => {
                    warn!("Dropping malformed component referenced by {}: {}", path_key, e);
                    None
                }
            })
            .collect();

        debug!(
            "Resolved {} components for path {}",
            components.len(),
            path_key
        );
        Some(PathContext { path, components })
    }

    /// The component stored under `key` and everything it references, each
    /// with its references inlined, as an indented JSON array (root first).
    pub async fn get_fully_resolved_schema(&self, key: &str) -> Option<String> {
        let root = match self.fetch_root(key).await {
            Ok(Some(root)) => root,
            Ok(None) => {
                info!("No component found for key: {}", key);
                return None;
            }
            Err(e) => {
                error!("Failed to look up component {}: {}", key, e);
                return None;
            }
        };

        let resolved = match self.flatten_references(root).await {
            Ok(resolved) => resolved,
            Err(e) => {
                error!("Failed to resolve {}: {}", key, e);
                return None;
            }
        };

        let values: Vec<&Value> = resolved.values().collect();
        match serde_json::to_string_pretty(&values) {
            Ok(text) => Some(text),
            Err(e) => {
                error!("Failed to serialize resolved schema {}: {}", key, e);
                None
            }
        }
    }

    /// Record every component transitively referenced from `obj` into
    /// `resolved` without touching `obj`.
    pub async fn collect_component_refs(&self, obj: &Value, resolved: &mut ResolvedSet) {
        // Explicit stack of per-document reference lists keeps the walk
        // depth-first without async recursion.
        let mut pending = vec![find_references(obj).into_iter()];

        loop {
            let next = match pending.last_mut() {
                Some(refs) => refs.next(),
                None => break,
            };
            let Some(reference) = next else {
                pending.pop();
                continue;
            };

            if resolved.contains(&reference.key) {
                continue;
            }

            match self.fetch_component(&reference).await {
                Some(doc) => {
                    let nested = find_references(&doc);
                    resolved.insert(reference.key, doc);
                    pending.push(nested.into_iter());
                }
                None => resolved.mark_missed(reference.key),
            }
        }
    }

    /// Resolve everything reachable from `root` and inline each reference.
    ///
    /// The result holds `root` under its own key followed by each referenced
    /// document. Within every document, a resolved `$ref` value is replaced
    /// by the referenced document, itself inlined. A reference back to a
    /// document already being inlined keeps its string value.
    pub async fn flatten_references(&self, root: Value) -> Result<ResolvedSet> {
        let root_key = root
            .get(&self.key_field)
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| {
                RagError::malformed(format!("root document has no '{}' field", self.key_field))
            })?;

        let mut resolved = ResolvedSet::seeded(root_key, root.clone());
        self.collect_component_refs(&root, &mut resolved).await;

        let mut flattened = Map::with_capacity(resolved.len());
        for (key, doc) in &resolved.docs {
            let mut expanding = vec![key.clone()];
            flattened.insert(key.clone(), inline(doc, &resolved, &mut expanding));
        }
        resolved.docs = flattened;

        Ok(resolved)
    }

    async fn fetch_root(&self, key: &str) -> Result<Option<Value>> {
        if let Some(root) = self.fetch_by_key(&self.components_index, key).await? {
            return Ok(Some(root));
        }
        self.store.get(&self.components_index, key).await
    }

    /// Referenced component, or `None` when it is missing or the lookup
    /// failed.
    async fn fetch_component(&self, reference: &ComponentRef) -> Option<Value> {
        let query = TermQuery::term(&self.key_field, &reference.key);
        let mut hits = match self
            .store
            .search(&self.components_index, &query, KEY_LOOKUP_SIZE)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                error!("Failed to resolve {}: {}", reference.raw, e);
                return None;
            }
        };

        // Names may repeat across sections; prefer the section the
        // reference points into.
        let pos = reference
            .component_type
            .and_then(|section| {
                hits.iter().position(|hit| {
                    hit.source.get(COMPONENT_TYPE_FIELD).and_then(Value::as_str)
                        == Some(section.as_str())
                })
            })
            .unwrap_or(0);
        if pos < hits.len() {
            return Some(with_component_type(hits.swap_remove(pos).source, reference));
        }

        if let Some(id) = reference.document_id() {
            match self.store.get(&self.components_index, &id).await {
                Ok(Some(doc)) => return Some(with_component_type(doc, reference)),
                Ok(None) => {}
                Err(e) => {
                    error!("Failed to resolve {}: {}", reference.raw, e);
                    return None;
                }
            }
        }

        let err = RagError::MalformedReference {
            reference: reference.raw.clone(),
        };
        warn!("{}", err);
        None
    }
}

/// Fill in `component_type` from the reference when the stored document
/// lacks it.
fn with_component_type(mut doc: Value, reference: &ComponentRef) -> Value {
    if let (Some(section), Value::Object(map)) = (reference.component_type, &mut doc) {
        map.entry(COMPONENT_TYPE_FIELD)
            .or_insert_with(|| Value::String(section.as_str().to_string()));
    }
    doc
}

/// Copy of `value` with resolved references inlined.
fn inline(value: &Value, resolved: &ResolvedSet, expanding: &mut Vec<String>) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, child) in map {
                let rewritten = match child {
                    Value::String(raw) if key == REF_KEY => {
                        inline_reference(raw, resolved, expanding).unwrap_or_else(|| child.clone())
                    }
                    _ => inline(child, resolved, expanding),
                };
                out.insert(key.clone(), rewritten);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| inline(item, resolved, expanding))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn inline_reference(raw: &str, resolved: &ResolvedSet, expanding: &mut Vec<String>) -> Option<Value> {
    let reference = ComponentRef::parse(raw).ok()?;
    if expanding.contains(&reference.key) {
        return None;
    }
    let target = resolved.get(&reference.key)?;

    expanding.push(reference.key);
    let inlined = inline(target, resolved, expanding);
    expanding.pop();

    Some(inlined)
}
