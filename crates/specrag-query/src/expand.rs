//! Parent expansion for ranked fragments.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, warn};

use specrag_core::{DocumentStore, FieldMapping, Fragment, META_IS_PARENT};

/// Appends the parent of each ranked fragment that names one.
///
/// For every input fragment with a non-empty `parent_id`, the parent is
/// fetched by identifier and placed directly after its child with
/// `is_parent = true`. Duplicated parents are kept; a parent that cannot be
/// fetched is omitted.
pub struct ParentExpander<S> {
    store: Arc<S>,
    index: String,
    fields: FieldMapping,
}

impl<S: DocumentStore> ParentExpander<S> {
    /// Create an expander over `index` with default field names.
    pub fn new(store: Arc<S>, index: impl Into<String>) -> Self {
        Self {
            store,
            index: index.into(),
            fields: FieldMapping::default(),
        }
    }

    /// Override the stored field names.
    pub fn with_fields(mut self, fields: FieldMapping) -> Self {
        self.fields = fields;
        self
    }

    /// Expand `fragments` with their parents, preserving input order.
    pub async fn expand(&self, fragments: Vec<Fragment>) -> Vec<Fragment> {
        let mut expanded = Vec::with_capacity(fragments.len() * 2);

        for fragment in fragments {
            let parent = match fragment.parent_id() {
                Some(parent_id) => self.fetch_parent(parent_id).await,
                None => None,
            };

            expanded.push(fragment);
            if let Some(parent) = parent {
                expanded.push(parent);
            }
        }

        expanded
    }

    async fn fetch_parent(&self, parent_id: &str) -> Option<Fragment> {
        let source = match self.store.get(&self.index, parent_id).await {
            Ok(Some(source)) => source,
            Ok(None) => {
                warn!("Parent {} not found in {}", parent_id, self.index);
                return None;
            }
            Err(e) => {
                error!("Failed to fetch parent {}: {}", parent_id, e);
                return None;
            }
        };

        match Fragment::from_source(&source, &self.fields) {
            Ok(mut parent) => {
                parent
                    .metadata
                    .insert(META_IS_PARENT.to_string(), Value::Bool(true));
                Some(parent)
            }
            Err(e) => {
                error!("Parent {} is malformed: {}", parent_id, e);
                None
            }
        }
    }
}
