//! specrag-ingest - Loading OpenAPI specifications into the document store
//!
//! This crate splits a parsed specification into embeddable fragments,
//! writes them to the vector indices, and bulk loads the structured path
//! and component documents the reference resolver reads.

mod indexer;
mod loader;
mod pipeline;
mod split;

pub use indexer::FragmentIndexer;
pub use loader::{BulkLoader, BulkReport};
pub use pipeline::{IngestReport, Ingestor};
pub use split::{split_spec, SpecFragments, KIND_COMPONENT, KIND_OPERATION, KIND_PATH};
