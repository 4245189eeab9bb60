//! Local store - SQLite file with brute-force ranking
//!
//! Dense search is exact cosine over every point of the collection. Sparse
//! search weights each shared term by its IDF over the collection, the same
//! scoring a remote collection created with `modifier: idf` applies.

use log::{debug, info, warn};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

use super::{CollectionSpec, Filter, Payload, PointRecord, QueryVector, ScoredPoint, SearchRequest, VectorStore};
use crate::embeddings::{cosine_similarity, sparse_dot, SparseVector};
use crate::error::{NotesError, Result};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS collections (
        name        TEXT PRIMARY KEY,
        dense_name  TEXT NOT NULL,
        dimension   INTEGER NOT NULL,
        sparse_name TEXT
    );
    CREATE TABLE IF NOT EXISTS points (
        collection TEXT NOT NULL,
        id         TEXT NOT NULL,
        dense      BLOB NOT NULL,
        sparse     TEXT,
        payload    TEXT NOT NULL,
        PRIMARY KEY (collection, id)
    );
";

pub struct LocalStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> NotesError {
    NotesError::unavailable(format!("local store: {}", e))
}

fn json_err(e: serde_json::Error) -> NotesError {
    NotesError::unavailable(format!("local store: corrupt row: {}", e))
}

fn encode_dense(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_dense(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// BM25 inverse document frequency
fn idf(total: usize, df: usize) -> f32 {
    let (n, df) = (total as f32, df as f32);
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

/// Decode a stored JSON column; an undecodable row is skipped with a warning
fn decode_row<T: serde::de::DeserializeOwned>(collection: &str, id: &str, column: &str, raw: &str) -> Option<T> {
    serde_json::from_str(raw)
        .inspect_err(|e| warn!("Skipping point {} in '{}': corrupt {}: {}", id, collection, column, e))
        .ok()
}

/// Best-first; equal scores keep insertion order
fn rank(mut hits: Vec<ScoredPoint>, limit: usize) -> Vec<ScoredPoint> {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(limit);
    hits
}

impl LocalStore {
    /// Open or create the store file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                NotesError::config(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;
        info!("Opened local store at {}", path.display());
        Self::init(conn)
    }

    /// Create an in-memory store for testing
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(db_err)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn layout(conn: &Connection, collection: &str) -> Result<Option<CollectionSpec>> {
        conn.query_row(
            "SELECT dense_name, dimension, sparse_name FROM collections WHERE name = ?1",
            params![collection],
            |row| {
                Ok(CollectionSpec {
                    dense_name: row.get(0)?,
                    dimension: row.get::<_, i64>(1)? as usize,
                    sparse_name: row.get(2)?,
                    payload_indexes: Vec::new(),
                })
            },
        )
        .optional()
        .map_err(db_err)
    }

    fn dense_search(
        conn: &Connection,
        collection: &str,
        query: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredPoint>> {
        let mut stmt = conn
            .prepare("SELECT id, dense, payload FROM points WHERE collection = ?1 ORDER BY rowid")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(db_err)?;

        let mut hits = Vec::new();
        for row in rows {
            let (id, dense, payload) = row.map_err(db_err)?;
            let Some(payload) = decode_row::<Payload>(collection, &id, "payload", &payload) else {
                continue;
            };
            if let Some(f) = filter {
                if !f.matches(&id, &payload)? {
                    continue;
                }
            }
            let score = cosine_similarity(query, &decode_dense(&dense));
            hits.push(ScoredPoint { id, score, payload });
        }

        Ok(rank(hits, limit))
    }

    fn sparse_search(
        conn: &Connection,
        collection: &str,
        query: &SparseVector,
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredPoint>> {
        let mut stmt = conn
            .prepare("SELECT id, sparse, payload FROM points WHERE collection = ?1 ORDER BY rowid")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(db_err)?;

        let mut points = Vec::new();
        for row in rows {
            let (id, sparse, payload) = row.map_err(db_err)?;
            let sparse: SparseVector = match sparse {
                Some(raw) => match decode_row(collection, &id, "sparse vector", &raw) {
                    Some(sparse) => sparse,
                    None => continue,
                },
                None => SparseVector::default(),
            };
            points.push((id, sparse, payload));
        }

        // Document frequency over the whole collection, before filtering
        let mut df: HashMap<u32, usize> = HashMap::new();
        for (_, sparse, _) in &points {
            for index in &sparse.indices {
                *df.entry(*index).or_insert(0) += 1;
            }
        }
        let total = points.len();

        let mut hits = Vec::new();
        for (id, sparse, payload) in points {
            let score = sparse_dot(query, &sparse, |i| idf(total, df.get(&i).copied().unwrap_or(0)));
            if score <= 0.0 {
                continue;
            }
            let Some(payload) = decode_row::<Payload>(collection, &id, "payload", &payload) else {
                continue;
            };
            if let Some(f) = filter {
                if !f.matches(&id, &payload)? {
                    continue;
                }
            }
            hits.push(ScoredPoint { id, score, payload });
        }

        Ok(rank(hits, limit))
    }
}

impl VectorStore for LocalStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    fn collection_exists(&self, collection: &str) -> Result<bool> {
        let conn = self.conn.lock();
        Ok(Self::layout(&conn, collection)?.is_some())
    }

    fn ensure_collection(&self, collection: &str, spec: &CollectionSpec) -> Result<()> {
        let conn = self.conn.lock();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO collections (name, dense_name, dimension, sparse_name)
                 VALUES (?1, ?2, ?3, ?4)",
                params![collection, spec.dense_name, spec.dimension as i64, spec.sparse_name],
            )
            .map_err(db_err)?;
        if inserted > 0 {
            info!(
                "Created collection '{}' ({} x {}, sparse: {:?})",
                collection, spec.dense_name, spec.dimension, spec.sparse_name
            );
        }
        Ok(())
    }

    fn search(&self, collection: &str, request: &SearchRequest<'_>) -> Result<Vec<ScoredPoint>> {
        let conn = self.conn.lock();
        let Some(layout) = Self::layout(&conn, collection)? else {
            debug!("Collection '{}' does not exist, no hits", collection);
            return Ok(Vec::new());
        };

        match request.vector {
            QueryVector::Dense(query) => {
                if request.using != layout.dense_name {
                    return Err(NotesError::invalid(format!(
                        "collection '{}' has no dense vector named '{}'",
                        collection, request.using
                    )));
                }
                if query.len() != layout.dimension {
                    return Err(NotesError::invalid(format!(
                        "query vector has dimension {}, collection '{}' expects {}",
                        query.len(),
                        collection,
                        layout.dimension
                    )));
                }
                Self::dense_search(&conn, collection, query, request.limit, request.filter)
            }
            QueryVector::Sparse(query) => {
                if layout.sparse_name.as_deref() != Some(request.using) {
                    return Err(NotesError::invalid(format!(
                        "collection '{}' has no sparse vector named '{}'",
                        collection, request.using
                    )));
                }
                Self::sparse_search(&conn, collection, query, request.limit, request.filter)
            }
        }
    }

    fn retrieve(&self, collection: &str, id: &str) -> Result<Option<Payload>> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT payload FROM points WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        raw.map(|p| serde_json::from_str(&p).map_err(json_err)).transpose()
    }

    fn upsert(&self, collection: &str, point: PointRecord) -> Result<()> {
        let conn = self.conn.lock();
        let layout = Self::layout(&conn, collection)?
            .ok_or_else(|| NotesError::invalid(format!("collection '{}' does not exist", collection)))?;

        if point.dense_name != layout.dense_name || point.dense.len() != layout.dimension {
            return Err(NotesError::invalid(format!(
                "point vector {} x {} does not fit collection '{}' ({} x {})",
                point.dense_name,
                point.dense.len(),
                collection,
                layout.dense_name,
                layout.dimension
            )));
        }

        // Sparse vectors are kept only when the collection reserves them
        let sparse = match (&point.sparse, &layout.sparse_name) {
            (Some(s), Some(name)) if &s.name == name => {
                Some(serde_json::to_string(&s.vector).map_err(json_err)?)
            }
            _ => None,
        };
        let payload = serde_json::to_string(&point.payload).map_err(json_err)?;

        conn.execute(
            "INSERT INTO points (collection, id, dense, sparse, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (collection, id) DO UPDATE SET
                dense = excluded.dense,
                sparse = excluded.sparse,
                payload = excluded.payload",
            params![collection, point.id, encode_dense(&point.dense), sparse, payload],
        )
        .map_err(db_err)?;

        debug!("Upserted point {} into '{}'", point.id, collection);
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let conn = self.conn.lock();
        let removed = conn
            .execute(
                "DELETE FROM points WHERE collection = ?1 AND id = ?2",
                params![collection, id],
            )
            .map_err(db_err)?;
        debug!("Deleted {} point(s) with id {} from '{}'", removed, id, collection);
        Ok(())
    }
}
