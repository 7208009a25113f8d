//! SQLite-based storage implementation.

use std::path::Path;
use std::sync::{Mutex, Once};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info, warn};

use specrag_core::{
    DatabaseConfig, DocumentStore, FieldMapping, Hit, IndexOutcome, IndexStats, RagError,
    Result, TermQuery, VectorIndex,
};

use crate::schema::{vec_schema, vec_table_name, SCHEMA};

/// Pseudo-field addressing the document identifier in term queries.
const ID_FIELD: &str = "_id";

/// Largest `k` sqlite-vec accepts in a kNN query.
const VEC_MAX_K: usize = 4096;

static VEC_EXTENSION: Once = Once::new();

/// Register sqlite-vec for every connection opened afterwards.
fn register_vec_extension() {
    VEC_EXTENSION.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

/// SQLite-based document store.
///
/// Every named index shares one `documents` table. The configured text field
/// is mirrored into an FTS5 table for match queries, the key field into an
/// indexed column for exact lookups, and the vector field into a BLOB plus,
/// when sqlite-vec is loaded, the `vec0` table of its dimension.
pub struct SqliteStore {
    /// Connection wrapped in blocking Mutex.
    conn: Mutex<Connection>,

    /// Field names used to pick documents apart.
    fields: FieldMapping,

    /// Whether the sqlite-vec extension is loaded.
    vec_enabled: bool,
}

/// A document body split into its stored columns.
struct PreparedBody {
    key: Option<String>,
    search_text: String,
    vector: Option<Vec<u8>>,
    dimension: usize,
    body: String,
}

impl SqliteStore {
    /// Open or create a database at the configured path.
    pub fn open(config: &DatabaseConfig, fields: FieldMapping) -> Result<Self> {
        register_vec_extension();
        let path = config.path.as_path();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| RagError::database(format!("Failed to open database: {}", e)))?;

        conn.busy_timeout(Duration::from_millis(u64::from(config.busy_timeout_ms)))
            .map_err(|e| RagError::database(format!("Failed to set busy timeout: {}", e)))?;

        Self::init(conn, fields, path)
    }

    /// Open an in-memory database with default field names (for testing).
    pub fn open_memory() -> Result<Self> {
        Self::open_memory_with_fields(FieldMapping::default())
    }

    /// Open an in-memory database with custom field names.
    pub fn open_memory_with_fields(fields: FieldMapping) -> Result<Self> {
        register_vec_extension();
        let conn = Connection::open_in_memory()
            .map_err(|e| RagError::database(format!("Failed to open in-memory database: {}", e)))?;

        Self::init(conn, fields, Path::new(":memory:"))
    }

    fn init(conn: Connection, fields: FieldMapping, path: &Path) -> Result<Self> {
        Self::configure_connection(&conn)?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| RagError::database(format!("Failed to initialize schema: {}", e)))?;

        let vec_enabled = match conn.query_row("SELECT vec_version()", [], |row| {
            row.get::<_, String>(0)
        }) {
            Ok(version) => {
                info!("sqlite-vec {} loaded", version);
                true
            }
            Err(e) => {
                warn!("sqlite-vec not available, vector search will scan: {}", e);
                false
            }
        };

        info!("Database opened at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
            fields,
            vec_enabled,
        })
    }

    /// Check if kNN search through sqlite-vec is available.
    pub fn vec_enabled(&self) -> bool {
        self.vec_enabled
    }

    /// Configure SQLite connection for optimal performance.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| RagError::database(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Field names this store was opened with.
    pub fn fields(&self) -> &FieldMapping {
        &self.fields
    }

    /// Execute a blocking operation on the connection.
    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.conn.lock().map_err(|e| RagError::database(e.to_string()))?;
        f(&conn)
    }

    /// Split a document body into key, searchable text, vector and the
    /// remaining JSON that is stored as the source.
    fn prepare_body(&self, body: Value) -> Result<PreparedBody> {
        let Value::Object(mut map) = body else {
            return Err(RagError::malformed("document body must be a JSON object"));
        };

        let mut dimension = 0;
        let vector = match map.remove(&self.fields.vector_field) {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => {
                let floats = items
                    .iter()
                    .map(|v| v.as_f64().map(|f| f as f32))
                    .collect::<Option<Vec<f32>>>()
                    .ok_or_else(|| {
                        RagError::malformed(format!(
                            "field '{}' must be a list of numbers",
                            self.fields.vector_field
                        ))
                    })?;
                dimension = floats.len();
                Some(vec_to_bytes(&floats))
            }
            Some(_) => {
                return Err(RagError::malformed(format!(
                    "field '{}' must be a list of numbers",
                    self.fields.vector_field
                )))
            }
        };

        let key = map
            .get(&self.fields.key_field)
            .and_then(Value::as_str)
            .map(String::from);
        let search_text = map
            .get(&self.fields.text_field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(PreparedBody {
            key,
            search_text,
            vector,
            dimension,
            body: serde_json::to_string(&Value::Object(map))?,
        })
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    // Index operations

    async fn create_index(&self, index: &str, mapping: &Value) -> Result<()> {
        let mapping = serde_json::to_string(mapping)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO indices (name, mapping, created_at) VALUES (?1, ?2, ?3)",
                params![index, mapping, now_millis()],
            )
            .map_err(|e| {
                if e.to_string().contains("UNIQUE constraint") {
                    RagError::IndexExists {
                        name: index.to_string(),
                    }
                } else {
                    RagError::database(format!("Failed to create index: {}", e))
                }
            })?;

            debug!("Created index: {}", index);
            Ok(())
        })
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        self.with_conn(|conn| {
            if self.vec_enabled {
                delete_vec_rows(conn, index)?;
            }

            // Documents are deleted by CASCADE
            let deleted = conn
                .execute("DELETE FROM indices WHERE name = ?1", params![index])
                .map_err(|e| RagError::database(e.to_string()))?;

            if deleted == 0 {
                return Err(RagError::IndexNotFound {
                    name: index.to_string(),
                });
            }

            debug!("Deleted index: {}", index);
            Ok(())
        })
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        self.with_conn(|conn| index_exists(conn, index))
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        // Committed writes are already visible to readers.
        self.with_conn(|conn| require_index(conn, index))
    }

    // Document operations

    async fn index(&self, index: &str, id: &str, body: Value, refresh: bool) -> Result<IndexOutcome> {
        let prepared = self.prepare_body(body)?;

        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| RagError::database(e.to_string()))?;

            // Writing into a missing index creates it, as search engines do.
            tx.execute(
                "INSERT OR IGNORE INTO indices (name, mapping, created_at) VALUES (?1, '{}', ?2)",
                params![index, now_millis()],
            )
            .map_err(|e| RagError::database(e.to_string()))?;

            let existed = tx
                .query_row(
                    "SELECT 1 FROM documents WHERE index_name = ?1 AND doc_id = ?2",
                    params![index, id],
                    |_| Ok(()),
                )
                .optional()
                .map_err(|e| RagError::database(e.to_string()))?
                .is_some();

            tx.execute(
                r#"
                INSERT INTO documents (index_name, doc_id, doc_key, body, search_text, vector, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(index_name, doc_id) DO UPDATE SET
                    doc_key = excluded.doc_key,
                    body = excluded.body,
                    search_text = excluded.search_text,
                    vector = excluded.vector,
                    updated_at = excluded.updated_at
                "#,
                params![
                    index,
                    id,
                    prepared.key,
                    prepared.body,
                    prepared.search_text,
                    prepared.vector,
                    now_millis(),
                ],
            )
            .map_err(|e| RagError::database(format!("Failed to index document: {}", e)))?;

            if self.vec_enabled {
                let vector = prepared
                    .vector
                    .as_deref()
                    .filter(|_| prepared.dimension > 0)
                    .map(|bytes| (prepared.dimension, bytes));
                sync_vec_row(&tx, index, id, existed, vector)?;
            }

            tx.commit()
                .map_err(|e| RagError::database(e.to_string()))?;

            let outcome = if existed {
                IndexOutcome::Updated
            } else {
                IndexOutcome::Created
            };
            debug!("Indexed {}/{} ({}, refresh={})", index, id, outcome, refresh);
            Ok(outcome)
        })
    }

    async fn get(&self, index: &str, id: &str) -> Result<Option<Value>> {
        let body = self.with_conn(|conn| {
            require_index(conn, index)?;

            conn.query_row(
                "SELECT body FROM documents WHERE index_name = ?1 AND doc_id = ?2",
                params![index, id],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| RagError::database(e.to_string()))
        })?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn search(&self, index: &str, query: &TermQuery, size: usize) -> Result<Vec<Hit>> {
        let limit = i64::try_from(size).unwrap_or(i64::MAX);

        let rows: Vec<(String, f64, String)> = self.with_conn(|conn| {
            require_index(conn, index)?;

            match query {
                TermQuery::Match { field, text } => {
                    if field != &self.fields.text_field {
                        return Err(RagError::invalid_argument(format!(
                            "match queries are only supported on '{}', not '{}'",
                            self.fields.text_field, field
                        )));
                    }
                    let Some(expression) = fts_match_expression(text) else {
                        return Ok(Vec::new());
                    };

                    let mut stmt = conn
                        .prepare(
                            r#"
                            SELECT d.doc_id, bm25(documents_fts) AS score, d.body
                            FROM documents_fts f
                            JOIN documents d ON d.rowid = f.rowid
                            WHERE documents_fts MATCH ?1
                            AND d.index_name = ?2
                            ORDER BY score, d.rowid
                            LIMIT ?3
                            "#,
                        )
                        .map_err(|e| RagError::database(e.to_string()))?;

                    let rows = stmt
                        .query_map(params![expression, index, limit], |row| {
                            // bm25() is lower-is-better
                            let score: f64 = row.get(1)?;
                            Ok((row.get(0)?, -score, row.get(2)?))
                        })
                        .map_err(|e| RagError::database(e.to_string()))?
                        .collect::<std::result::Result<Vec<_>, _>>()
                        .map_err(|e| RagError::database(e.to_string()))?;

                    Ok(rows)
                }
                TermQuery::Term { field, value } => {
                    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, f64, String)> {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    };

                    let column = if field == &self.fields.key_field {
                        Some("doc_key")
                    } else if field == ID_FIELD {
                        Some("doc_id")
                    } else {
                        None
                    };

                    let rows = match column {
                        Some(column) => {
                            let sql = format!(
                                "SELECT doc_id, 1.0, body FROM documents \
                                 WHERE index_name = ?1 AND {} = ?2 ORDER BY rowid LIMIT ?3",
                                column
                            );
                            let mut stmt = conn
                                .prepare(&sql)
                                .map_err(|e| RagError::database(e.to_string()))?;
                            let rows = stmt
                                .query_map(params![index, value, limit], map_row)
                                .map_err(|e| RagError::database(e.to_string()))?
                                .collect::<std::result::Result<Vec<_>, _>>()
                                .map_err(|e| RagError::database(e.to_string()))?;
                            rows
                        }
                        None => {
                            let path = format!("$.\"{}\"", field.replace('"', ""));
                            let mut stmt = conn
                                .prepare(
                                    "SELECT doc_id, 1.0, body FROM documents \
                                     WHERE index_name = ?1 AND json_extract(body, ?4) = ?2 \
                                     ORDER BY rowid LIMIT ?3",
                                )
                                .map_err(|e| RagError::database(e.to_string()))?;
                            let rows = stmt
                                .query_map(params![index, value, limit, path], map_row)
                                .map_err(|e| RagError::database(e.to_string()))?
                                .collect::<std::result::Result<Vec<_>, _>>()
                                .map_err(|e| RagError::database(e.to_string()))?;
                            rows
                        }
                    };

                    Ok(rows)
                }
            }
        })?;

        let mut hits = Vec::with_capacity(rows.len());
        for (id, score, body) in rows {
            hits.push(Hit {
                id,
                score: score as f32,
                source: serde_json::from_str(&body)?,
            });
        }

        debug!("Search on {} returned {} hits", index, hits.len());
        Ok(hits)
    }

    // Stats

    async fn index_stats(&self) -> Result<Vec<IndexStats>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT i.name, COUNT(d.doc_id), COUNT(d.vector)
                    FROM indices i
                    LEFT JOIN documents d ON d.index_name = i.name
                    GROUP BY i.name
                    ORDER BY i.name
                    "#,
                )
                .map_err(|e| RagError::database(e.to_string()))?;

            let stats = stmt
                .query_map([], |row| {
                    Ok(IndexStats {
                        name: row.get(0)?,
                        documents: row.get::<_, i64>(1)? as u64,
                        vectors: row.get::<_, i64>(2)? as u64,
                    })
                })
                .map_err(|e| RagError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| RagError::database(e.to_string()))?;

            Ok(stats)
        })
    }
}

#[async_trait]
impl VectorIndex for SqliteStore {
    async fn vector_search(&self, index: &str, embedding: &[f32], k: usize) -> Result<Vec<Hit>> {
        if embedding.is_empty() {
            return Err(RagError::invalid_argument("query embedding is empty"));
        }

        let hits = if self.vec_enabled {
            self.knn_search(index, embedding, k)?
        } else {
            self.scan_search(index, embedding, k)?
        };

        debug!("Vector search on {} returned {} hits", index, hits.len());
        Ok(hits)
    }
}

impl SqliteStore {
    /// kNN query against the sqlite-vec table of the embedding's dimension.
    fn knn_search(&self, index: &str, embedding: &[f32], k: usize) -> Result<Vec<Hit>> {
        let k = k.min(VEC_MAX_K);
        let dimension = embedding.len();

        let rows: Vec<(String, Option<f64>, String)> = self.with_conn(|conn| {
            require_index(conn, index)?;
            if k == 0 || !vec_table_exists(conn, dimension)? {
                return Ok(Vec::new());
            }

            let sql = format!(
                r#"
                WITH knn AS (
                    SELECT rowid, distance
                    FROM {}
                    WHERE embedding MATCH ?1
                    AND k = ?2
                    AND index_name = ?3
                )
                SELECT d.doc_id, knn.distance, d.body
                FROM knn
                JOIN documents d ON d.rowid = knn.rowid
                ORDER BY knn.distance, d.rowid
                "#,
                vec_table_name(dimension)
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| RagError::database(e.to_string()))?;

            let rows = stmt
                .query_map(
                    params![vec_to_bytes(embedding), k as i64, index],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .map_err(|e| RagError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| RagError::database(e.to_string()))?;

            Ok(rows)
        })?;

        let mut hits = Vec::with_capacity(rows.len());
        for (id, distance, body) in rows {
            // A zero vector has no cosine distance.
            let score = distance.map(|d| 1.0 - d as f32).unwrap_or(0.0);
            hits.push(Hit {
                id,
                score,
                source: serde_json::from_str(&body)?,
            });
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));

        Ok(hits)
    }

    /// Cosine scan over every stored vector of the index.
    fn scan_search(&self, index: &str, embedding: &[f32], k: usize) -> Result<Vec<Hit>> {
        let rows: Vec<(String, String, Vec<u8>)> = self.with_conn(|conn| {
            require_index(conn, index)?;

            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT doc_id, body, vector
                    FROM documents
                    WHERE index_name = ?1 AND vector IS NOT NULL
                    ORDER BY rowid
                    "#,
                )
                .map_err(|e| RagError::database(e.to_string()))?;

            let rows = stmt
                .query_map(params![index], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
                .map_err(|e| RagError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| RagError::database(e.to_string()))?;

            Ok(rows)
        })?;

        let mut scored = Vec::with_capacity(rows.len());
        for (id, body, bytes) in rows {
            let vector = bytes_to_vec(&bytes);
            if vector.len() != embedding.len() {
                warn!(
                    "Skipping {}/{}: vector has {} dimensions, query has {}",
                    index,
                    id,
                    vector.len(),
                    embedding.len()
                );
                continue;
            }
            scored.push((id, cosine_similarity(embedding, &vector), body));
        }

        // Stable sort keeps insertion order among equal similarities.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        let mut hits = Vec::with_capacity(scored.len());
        for (id, score, body) in scored {
            hits.push(Hit {
                id,
                score,
                source: serde_json::from_str(&body)?,
            });
        }

        Ok(hits)
    }
}

// Helper functions

fn index_exists(conn: &Connection, index: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM indices WHERE name = ?1",
            params![index],
            |_| Ok(()),
        )
        .optional()
        .map_err(|e| RagError::database(e.to_string()))?;
    Ok(found.is_some())
}

fn require_index(conn: &Connection, index: &str) -> Result<()> {
    if index_exists(conn, index)? {
        Ok(())
    } else {
        Err(RagError::IndexNotFound {
            name: index.to_string(),
        })
    }
}

fn vec_table_exists(conn: &Connection, dimension: usize) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM vector_tables WHERE dimension = ?1",
            params![dimension as i64],
            |_| Ok(()),
        )
        .optional()
        .map_err(|e| RagError::database(e.to_string()))?;
    Ok(found.is_some())
}

fn vec_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT dimension FROM vector_tables ORDER BY dimension")
        .map_err(|e| RagError::database(e.to_string()))?;
    let tables = stmt
        .query_map([], |row| row.get::<_, i64>(0))
        .map_err(|e| RagError::database(e.to_string()))?
        .map(|dimension| dimension.map(|d| vec_table_name(d as usize)))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| RagError::database(e.to_string()))?;
    Ok(tables)
}

/// Mirror a document's vector into the sqlite-vec table of its dimension,
/// replacing whatever vector the document had before.
fn sync_vec_row(
    conn: &Connection,
    index: &str,
    id: &str,
    existed: bool,
    vector: Option<(usize, &[u8])>,
) -> Result<()> {
    let rowid: i64 = conn
        .query_row(
            "SELECT rowid FROM documents WHERE index_name = ?1 AND doc_id = ?2",
            params![index, id],
            |row| row.get(0),
        )
        .map_err(|e| RagError::database(e.to_string()))?;

    if existed {
        for table in vec_tables(conn)? {
            conn.execute(&format!("DELETE FROM {} WHERE rowid = ?1", table), params![rowid])
                .map_err(|e| RagError::database(format!("Failed to delete embedding: {}", e)))?;
        }
    }

    let Some((dimension, bytes)) = vector else {
        return Ok(());
    };

    if !vec_table_exists(conn, dimension)? {
        conn.execute_batch(&vec_schema(dimension))
            .map_err(|e| RagError::database(format!("Failed to create vec table: {}", e)))?;
        conn.execute(
            "INSERT INTO vector_tables (dimension) VALUES (?1)",
            params![dimension as i64],
        )
        .map_err(|e| RagError::database(e.to_string()))?;
        debug!("Created {}", vec_table_name(dimension));
    }

    conn.execute(
        &format!(
            "INSERT INTO {} (rowid, index_name, embedding) VALUES (?1, ?2, ?3)",
            vec_table_name(dimension)
        ),
        params![rowid, index, bytes],
    )
    .map_err(|e| RagError::database(format!("Failed to insert embedding: {}", e)))?;

    Ok(())
}

/// Remove the sqlite-vec rows of every document in `index`.
fn delete_vec_rows(conn: &Connection, index: &str) -> Result<()> {
    let mut stmt = conn
        .prepare("SELECT rowid FROM documents WHERE index_name = ?1 AND vector IS NOT NULL")
        .map_err(|e| RagError::database(e.to_string()))?;
    let rowids = stmt
        .query_map(params![index], |row| row.get::<_, i64>(0))
        .map_err(|e| RagError::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| RagError::database(e.to_string()))?;

    for table in vec_tables(conn)? {
        for rowid in &rowids {
            conn.execute(&format!("DELETE FROM {} WHERE rowid = ?1", table), params![rowid])
                .map_err(|e| RagError::database(format!("Failed to delete embedding: {}", e)))?;
        }
    }
    Ok(())
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Build an FTS5 expression matching any term of `text`.
///
/// Returns `None` when the text has no searchable terms.
fn fts_match_expression(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{}\"", term))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Convert f32 vector to bytes (little-endian).
fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert little-endian bytes back to an f32 vector.
fn bytes_to_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fragment_body(text: &str, id: &str, vector: Option<Vec<f32>>) -> Value {
        let mut body = json!({"text": text, "metadata": {"id": id}});
        if let Some(vector) = vector {
            body["vector"] = json!(vector);
        }
        body
    }

    #[tokio::test]
    async fn test_open_memory() {
        let store = SqliteStore::open_memory().unwrap();
        assert!(store.index_stats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_lifecycle() {
        let store = SqliteStore::open_memory().unwrap();

        store
            .create_index("paths", &json!({"mappings": {}}))
            .await
            .unwrap();
        assert!(store.index_exists("paths").await.unwrap());

        let err = store.create_index("paths", &json!({})).await.unwrap_err();
        assert_eq!(err.error_code(), "INDEX_EXISTS");

        store
            .index("paths", "/pets", json!({"key": "/pets", "methods": {}}), true)
            .await
            .unwrap();

        store.delete_index("paths").await.unwrap();
        assert!(!store.index_exists("paths").await.unwrap());

        let err = store.delete_index("paths").await.unwrap_err();
        assert_eq!(err.error_code(), "INDEX_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_index_and_get() {
        let store = SqliteStore::open_memory().unwrap();

        let outcome = store
            .index("paths", "/pets", json!({"key": "/pets", "methods": {"get": {}}}), true)
            .await
            .unwrap();
        assert_eq!(outcome, IndexOutcome::Created);

        let outcome = store
            .index("paths", "/pets", json!({"key": "/pets", "methods": {"post": {}}}), true)
            .await
            .unwrap();
        assert_eq!(outcome, IndexOutcome::Updated);

        let doc = store.get("paths", "/pets").await.unwrap().unwrap();
        assert!(doc["methods"].get("post").is_some());

        assert!(store.get("paths", "/users").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_index_is_an_error() {
        let store = SqliteStore::open_memory().unwrap();

        let err = store.get("nowhere", "x").await.unwrap_err();
        assert_eq!(err.error_code(), "INDEX_NOT_FOUND");

        let err = store
            .search("nowhere", &TermQuery::term("key", "x"), 10)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INDEX_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_rejects_non_object_body() {
        let store = SqliteStore::open_memory().unwrap();
        let err = store.index("paths", "x", json!([1, 2]), true).await.unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_DOCUMENT");

        let err = store
            .index("paths", "x", json!({"vector": "not numbers"}), true)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_DOCUMENT");
    }

    #[tokio::test]
    async fn test_match_search() {
        let store = SqliteStore::open_memory().unwrap();

        store
            .index("frags", "a", fragment_body("list all pets in the store", "a", None), true)
            .await
            .unwrap();
        store
            .index("frags", "b", fragment_body("create a user account", "b", None), true)
            .await
            .unwrap();
        store
            .index("other", "c", fragment_body("pets elsewhere", "c", None), true)
            .await
            .unwrap();

        let hits = store
            .search("frags", &TermQuery::matching("text", "pets"), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].score > 0.0);
        assert_eq!(hits[0].source["metadata"]["id"], "a");

        // Any term matches, punctuation is ignored.
        let hits = store
            .search("frags", &TermQuery::matching("text", "/pets/{user}"), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);

        let hits = store
            .search("frags", &TermQuery::matching("text", "  ?? "), 10)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_match_on_other_field_rejected() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .index("frags", "a", fragment_body("pets", "a", None), true)
            .await
            .unwrap();

        let err = store
            .search("frags", &TermQuery::matching("title", "pets"), 10)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_term_search() {
        let store = SqliteStore::open_memory().unwrap();

        store
            .index(
                "components",
                "schemas_Pet",
                json!({"key": "Pet", "value": {"type": "object"}, "component_type": "schemas"}),
                true,
            )
            .await
            .unwrap();
        store
            .index(
                "components",
                "responses_Pet",
                json!({"key": "Pet", "value": {"description": "a pet"}, "component_type": "responses"}),
                true,
            )
            .await
            .unwrap();

        let hits = store
            .search("components", &TermQuery::term("key", "Pet"), 100)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "schemas_Pet");

        let hits = store
            .search("components", &TermQuery::term("component_type", "responses"), 100)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "responses_Pet");

        let hits = store
            .search("components", &TermQuery::term("_id", "schemas_Pet"), 100)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let hits = store
            .search("components", &TermQuery::term("key", "pet"), 100)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_vector_search() {
        let store = SqliteStore::open_memory().unwrap();

        store
            .index("vecs", "x", fragment_body("x", "x", Some(vec![1.0, 0.0])), true)
            .await
            .unwrap();
        store
            .index("vecs", "y", fragment_body("y", "y", Some(vec![0.0, 1.0])), true)
            .await
            .unwrap();
        store
            .index("vecs", "xy", fragment_body("xy", "xy", Some(vec![0.7, 0.7])), true)
            .await
            .unwrap();
        store
            .index("vecs", "bad", fragment_body("bad", "bad", Some(vec![1.0, 0.0, 0.0])), true)
            .await
            .unwrap();
        store
            .index("vecs", "none", fragment_body("none", "none", None), true)
            .await
            .unwrap();

        let hits = store.vector_search("vecs", &[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "x");
        assert_eq!(hits[1].id, "xy");
        // The vector is kept out of the stored source.
        assert!(hits[0].source.get("vector").is_none());
    }

    #[tokio::test]
    async fn test_vec_extension_loaded() {
        let store = SqliteStore::open_memory().unwrap();
        assert!(store.vec_enabled());
    }

    #[tokio::test]
    async fn test_vector_search_is_per_index() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .index("a", "x", fragment_body("x", "x", Some(vec![1.0, 0.0])), true)
            .await
            .unwrap();
        store
            .index("b", "y", fragment_body("y", "y", Some(vec![1.0, 0.0])), true)
            .await
            .unwrap();

        let hits = store.vector_search("a", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "x");
        assert!((hits[0].score - 1.0).abs() < 1e-4);

        let err = store.vector_search("c", &[1.0, 0.0], 10).await.unwrap_err();
        assert_eq!(err.error_code(), "INDEX_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_reindex_replaces_vector() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .index("vecs", "x", fragment_body("x", "x", Some(vec![1.0, 0.0])), true)
            .await
            .unwrap();
        store
            .index("vecs", "y", fragment_body("y", "y", Some(vec![0.0, 1.0])), true)
            .await
            .unwrap();
        store
            .index("vecs", "x", fragment_body("x", "x", Some(vec![0.0, 1.0, 0.0])), true)
            .await
            .unwrap();

        let hits = store.vector_search("vecs", &[1.0, 0.0], 10).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["y"]);

        store
            .index("vecs", "y", fragment_body("y", "y", None), true)
            .await
            .unwrap();
        assert!(store.vector_search("vecs", &[1.0, 0.0], 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_index_drops_vectors() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .index("vecs", "old", fragment_body("old", "old", Some(vec![1.0, 0.0])), true)
            .await
            .unwrap();
        store.delete_index("vecs").await.unwrap();

        store
            .index("vecs", "new", fragment_body("new", "new", Some(vec![0.6, 0.8])), true)
            .await
            .unwrap();
        let hits = store.vector_search("vecs", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "new");
    }

    #[tokio::test]
    async fn test_scan_matches_knn() {
        let store = SqliteStore::open_memory().unwrap();
        for (id, vector) in [
            ("x", vec![1.0, 0.0]),
            ("y", vec![0.0, 1.0]),
            ("xy", vec![0.7, 0.7]),
        ] {
            store
                .index("vecs", id, fragment_body(id, id, Some(vector)), true)
                .await
                .unwrap();
        }

        let knn = store.knn_search("vecs", &[1.0, 0.1], 3).unwrap();
        let scan = store.scan_search("vecs", &[1.0, 0.1], 3).unwrap();

        let knn_ids: Vec<&str> = knn.iter().map(|h| h.id.as_str()).collect();
        let scan_ids: Vec<&str> = scan.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(knn_ids, vec!["x", "xy", "y"]);
        assert_eq!(knn_ids, scan_ids);
        for (a, b) in knn.iter().zip(&scan) {
            assert!((a.score - b.score).abs() < 1e-4);
        }
    }

    #[tokio::test]
    async fn test_index_stats() {
        let store = SqliteStore::open_memory().unwrap();
        store.create_index("empty", &json!({})).await.unwrap();
        store
            .index("vecs", "x", fragment_body("x", "x", Some(vec![1.0])), true)
            .await
            .unwrap();
        store
            .index("vecs", "y", fragment_body("y", "y", None), true)
            .await
            .unwrap();

        let stats = store.index_stats().await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].name, "empty");
        assert_eq!(stats[0].documents, 0);
        assert_eq!(stats[1].documents, 2);
        assert_eq!(stats[1].vectors, 1);
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("specrag.db"),
            ..Default::default()
        };

        {
            let store = SqliteStore::open(&config, FieldMapping::default()).unwrap();
            store
                .index("paths", "/pets", json!({"key": "/pets"}), true)
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&config, FieldMapping::default()).unwrap();
        assert!(store.get("paths", "/pets").await.unwrap().is_some());
    }

    #[test]
    fn test_fts_match_expression() {
        assert_eq!(
            fts_match_expression("GET /users/{id}").as_deref(),
            Some("\"GET\" OR \"users\" OR \"id\"")
        );
        assert_eq!(fts_match_expression("--"), None);
    }
}
