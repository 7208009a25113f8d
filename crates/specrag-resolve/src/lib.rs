//! specrag-resolve - `$ref` resolution for stored OpenAPI documents
//!
//! Walks path and component documents for `$ref` strings, fetches the
//! referenced components from the document store and either bundles them
//! (path context) or inlines them (fully resolved schema).

mod reference;
mod resolver;

pub use reference::{find_references, ComponentRef};
pub use resolver::{ReferenceResolver, ResolvedSet};
