//! specrag-service - Tool facade for the OpenAPI retrieval engine
//!
//! This crate wires the store, embedder, hybrid retriever, reference
//! resolver and ingestion pipeline together and exposes them as tools for
//! a chat front end.
//!
//! # Tools
//!
//! - `spec_search` - Hybrid search over path or component fragments
//! - `spec_path` - A path with every component it references
//! - `spec_schema` - A component with all references inlined
//! - `spec_ingest` - Load an OpenAPI JSON document
//! - `spec_init` - Recreate the indices empty
//! - `spec_stats` - Document counts per index

mod server;

pub use server::{
    IngestParams, PathParams, SchemaParams, SearchParams, SearchScope, ServerInfo, SpecRagServer,
    ToolInfo, ToolResult,
};
