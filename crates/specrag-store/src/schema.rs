//! Database schema definitions.

/// Main schema SQL for initializing the database.
pub const SCHEMA: &str = r#"
-- Indices table
CREATE TABLE IF NOT EXISTS indices (
    name TEXT PRIMARY KEY,
    mapping TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL
);

-- Documents table, one row per (index, id)
CREATE TABLE IF NOT EXISTS documents (
    index_name TEXT NOT NULL REFERENCES indices(name) ON DELETE CASCADE,
    doc_id TEXT NOT NULL,
    doc_key TEXT,
    body TEXT NOT NULL,
    search_text TEXT NOT NULL DEFAULT '',
    vector BLOB,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (index_name, doc_id)
);

CREATE INDEX IF NOT EXISTS idx_documents_key ON documents(index_name, doc_key);

-- FTS5 virtual table for match queries on the text field
CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
    search_text,
    content=documents,
    content_rowid=rowid
);

-- Triggers to keep FTS5 in sync with documents table
CREATE TRIGGER IF NOT EXISTS documents_ai AFTER INSERT ON documents BEGIN
    INSERT INTO documents_fts(rowid, search_text) VALUES (NEW.rowid, NEW.search_text);
END;

CREATE TRIGGER IF NOT EXISTS documents_ad AFTER DELETE ON documents BEGIN
    INSERT INTO documents_fts(documents_fts, rowid, search_text) VALUES ('delete', OLD.rowid, OLD.search_text);
END;

CREATE TRIGGER IF NOT EXISTS documents_au AFTER UPDATE ON documents BEGIN
    INSERT INTO documents_fts(documents_fts, rowid, search_text) VALUES ('delete', OLD.rowid, OLD.search_text);
    INSERT INTO documents_fts(rowid, search_text) VALUES (NEW.rowid, NEW.search_text);
END;

-- Dimensions that have a sqlite-vec table
CREATE TABLE IF NOT EXISTS vector_tables (
    dimension INTEGER PRIMARY KEY
);
"#;

/// Name of the sqlite-vec table holding vectors of `dimension` floats.
pub fn vec_table_name(dimension: usize) -> String {
    format!("vec_documents_{}", dimension)
}

/// Schema for the sqlite-vec table of one dimension.
/// This must be created after the extension is registered.
///
/// Rows share their rowid with `documents`; `index_name` partitions the
/// kNN search so each named index is searched on its own.
pub fn vec_schema(dimension: usize) -> String {
    format!(
        r#"
CREATE VIRTUAL TABLE IF NOT EXISTS {} USING vec0(
    index_name text partition key,
    embedding float[{}] distance_metric=cosine
);
"#,
        vec_table_name(dimension),
        dimension
    )
}

/// Schema version for migrations.
pub const SCHEMA_VERSION: u32 = 1;
