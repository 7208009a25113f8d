//! Bulk loading of structured path and component documents.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use specrag_core::{
    ComponentDocument, ComponentType, DocumentStore, PathDocument, RagError, Result,
};

/// Outcome of a bulk write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    /// Documents written.
    pub written: usize,

    /// Documents whose write failed.
    pub failed: usize,
}

impl BulkReport {
    fn record(&mut self, result: &Result<()>) {
        match result {
            Ok(()) => self.written += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Writes one document per path or component of a specification.
///
/// Every write is refreshed immediately. A failed write is logged and the
/// loader moves on to the next item; nothing is rolled back.
pub struct BulkLoader<S> {
    store: Arc<S>,
}

impl<S: DocumentStore> BulkLoader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Write one `PathDocument` per entry of `spec.paths`, keyed by path.
    pub async fn bulk_write_paths(&self, index: &str, spec: &Value) -> Result<BulkReport> {
        let paths = spec
            .get("paths")
            .and_then(Value::as_object)
            .ok_or_else(|| RagError::malformed("specification has no 'paths' object"))?;
        let info = spec.get("info").filter(|v| !v.is_null()).cloned();

        let mut report = BulkReport::default();
        for (path, item) in paths {
            let doc = PathDocument {
                key: path.clone(),
                info: info.clone(),
                methods: prepare_methods(path, item),
            };

            let result = self.write(index, path, &doc).await;
            if let Err(e) = &result {
                error!("Failed to write path {}: {}", path, e);
            }
            report.record(&result);
        }

        info!(
            "Wrote {} path documents to {} ({} failed)",
            report.written, index, report.failed
        );
        Ok(report)
    }

    /// Write one `ComponentDocument` per named component, keyed by
    /// `<component_type>_<name>`.
    pub async fn bulk_write_components(&self, index: &str, spec: &Value) -> Result<BulkReport> {
        let components = spec
            .get("components")
            .and_then(Value::as_object)
            .ok_or_else(|| RagError::malformed("specification has no 'components' object"))?;

        let mut report = BulkReport::default();
        for component_type in ComponentType::ALL {
            let Some(section) = components.get(component_type.as_str()) else {
                continue;
            };
            let Some(section) = section.as_object() else {
                warn!("Skipping components.{}: not an object", component_type);
                continue;
            };

            for (name, value) in section {
                let doc = ComponentDocument {
                    key: name.clone(),
                    value: value.clone(),
                    component_type,
                };
                let id = doc.document_id();

                let result = self.write(index, &id, &doc).await;
                if let Err(e) = &result {
                    error!("Failed to write {} {}: {}", component_type, name, e);
                }
                report.record(&result);
            }
        }

        info!(
            "Wrote {} component documents to {} ({} failed)",
            report.written, index, report.failed
        );
        Ok(report)
    }

    async fn write<T: Serialize>(&self, index: &str, id: &str, doc: &T) -> Result<()> {
        let body = serde_json::to_value(doc)?;
        let outcome = self.store.index(index, id, body, true).await?;
        debug!("Inserted document {} into {}: {}", id, index, outcome);
        Ok(())
    }
}

/// Operation objects of a path item with parameter examples coerced to text.
///
/// Entries that are not objects (path-level `summary`, `parameters`) are
/// not operations and are left out.
fn prepare_methods(path: &str, item: &Value) -> Map<String, Value> {
    let mut methods = Map::new();
    let Some(item) = item.as_object() else {
        warn!("Path item {} is not an object", path);
        return methods;
    };

    for (verb, details) in item {
        let Value::Object(details) = details else {
            debug!("Skipping non-operation entry {} of {}", verb, path);
            continue;
        };

        let mut prepared = details.clone();
        if let Some(Value::Array(params)) = prepared.get_mut("parameters") {
            for param in params.iter_mut() {
                coerce_example(param);
            }
        }
        methods.insert(verb.clone(), Value::Object(prepared));
    }

    methods
}

/// Store a parameter's `example` as text: strings as-is, anything else as
/// compact JSON.
fn coerce_example(param: &mut Value) {
    let Some(example) = param.get_mut("example") else {
        return;
    };
    if example.is_string() {
        return;
    }
    let text = example.to_string();
    *example = Value::String(text);
}
