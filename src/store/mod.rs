//! Vector store clients
//!
//! Public interface:
//! - `VectorStore` trait - ranked search, retrieve, upsert, delete
//! - `QdrantClient` - remote Qdrant over its REST API
//! - `LocalStore` - on-disk SQLite store for single-machine deployments
//! - `Filter` - Qdrant filter JSON, passed through or evaluated locally

mod filter;
mod local;
mod qdrant;

pub use filter::Filter;
pub use local::LocalStore;
pub use qdrant::QdrantClient;

use std::sync::Arc;

use crate::config::{FieldType, StoreTarget};
use crate::embeddings::SparseVector;
use crate::error::Result;

/// Arbitrary metadata stored alongside a point
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Vector to rank a collection against
#[derive(Debug, Clone, Copy)]
pub enum QueryVector<'a> {
    Dense(&'a [f32]),
    Sparse(&'a SparseVector),
}

/// One ranked search against a named vector
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    /// Named vector to search (dense model name or "sparse")
    pub using: &'a str,
    pub vector: QueryVector<'a>,
    pub limit: usize,
    pub filter: Option<&'a Filter>,
}

/// Search hit, best-first within one result list
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: Payload,
}

/// Point written on add / update
#[derive(Debug, Clone)]
pub struct PointRecord {
    pub id: String,
    /// Named dense vector the point is stored under
    pub dense_name: String,
    pub dense: Vec<f32>,
    pub sparse: Option<NamedSparse>,
    pub payload: Payload,
}

#[derive(Debug, Clone)]
pub struct NamedSparse {
    pub name: String,
    pub vector: SparseVector,
}

/// Payload field indexed when a collection is created
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadIndex {
    /// Dotted payload key (`metadata.type`)
    pub key: String,
    pub field_type: FieldType,
}

/// Vector layout of a collection this server creates
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSpec {
    pub dense_name: String,
    pub dimension: usize,
    pub sparse_name: Option<String>,
    pub payload_indexes: Vec<PayloadIndex>,
}

/// Vector store interface
///
/// Implementations are shared across concurrent tool invocations.
pub trait VectorStore: Send + Sync {
    /// Backend name for logging
    fn backend_name(&self) -> &'static str;

    fn collection_exists(&self, collection: &str) -> Result<bool>;

    /// Create the collection with the given layout if it does not exist
    fn ensure_collection(&self, collection: &str, spec: &CollectionSpec) -> Result<()>;

    /// Ranked search, best-first, at most `request.limit` hits
    fn search(&self, collection: &str, request: &SearchRequest<'_>) -> Result<Vec<ScoredPoint>>;

    /// Payload of the point with exactly this id, if present
    fn retrieve(&self, collection: &str, id: &str) -> Result<Option<Payload>>;

    /// Insert or fully replace a point
    fn upsert(&self, collection: &str, point: PointRecord) -> Result<()>;

    fn delete(&self, collection: &str, id: &str) -> Result<()>;
}

/// Open the store the settings point at
pub fn open_store(target: &StoreTarget, timeout: std::time::Duration) -> Result<Arc<dyn VectorStore>> {
    match target {
        StoreTarget::Remote { url, api_key } => Ok(Arc::new(QdrantClient::new(
            url,
            api_key.clone(),
            timeout,
        )?)),
        StoreTarget::Local { path } => Ok(Arc::new(LocalStore::open(path)?)),
    }
}
