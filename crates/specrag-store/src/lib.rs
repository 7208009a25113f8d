//! specrag-store - SQLite document store
//!
//! This crate provides persistent storage for path, component and fragment
//! documents across named indices, with FTS5 keyword search, exact key
//! lookups and kNN search through sqlite-vec. When the extension cannot be
//! initialized, vector search falls back to a cosine scan.

mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

// Re-export schema for testing/migrations
pub use schema::{vec_schema, vec_table_name, SCHEMA, SCHEMA_VERSION};
