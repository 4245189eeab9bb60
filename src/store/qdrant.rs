//! Qdrant REST client
//!
//! Blocking HTTP against the Qdrant points/collections API. Every failed
//! exchange (transport error or non-success status, including 401/403 and a
//! collection dropped mid-search) is `StoreUnavailable`. Arguments are
//! validated before a request is built, so nothing the server rejects is
//! reported as the caller's fault.

use log::{debug, info};
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use super::{
    CollectionSpec, Payload, PayloadIndex, PointRecord, QueryVector, ScoredPoint, SearchRequest, VectorStore,
};
use crate::error::{NotesError, Result};

/// Qdrant response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    points: Vec<RawPoint>,
}

#[derive(Debug, Deserialize)]
struct RawPoint {
    id: Value,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    payload: Option<Payload>,
}

pub struct QdrantClient {
    base_url: Url,
    api_key: Option<String>,
    http: HttpClient,
}

impl QdrantClient {
    /// Create a new client for the given server URL
    pub fn new(url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(url.trim_end_matches('/'))
            .map_err(|e| NotesError::config(format!("QDRANT_URL '{}' is invalid: {}", url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(NotesError::config(format!("QDRANT_URL '{}' is not a base URL", url)));
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotesError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            api_key,
            http,
        })
    }

    /// URL for `/collections/{collection}/{rest...}` with escaped segments
    fn endpoint(&self, collection: &str, rest: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("collections").push(collection);
            segments.extend(rest);
        }
        url
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    /// Send and decode the `result` field of the envelope
    fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let response = self.authorized(builder).send().map_err(|e| {
            NotesError::unavailable(format!("Qdrant at {} unreachable ({}): {}", self.base_url, what, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(NotesError::unavailable(format!(
                "Qdrant {} failed ({}): {}",
                what, status, body
            )));
        }

        response
            .json::<Envelope<T>>()
            .map(|e| e.result)
            .map_err(|e| NotesError::unavailable(format!("Failed to parse Qdrant {} response: {}", what, e)))
    }
}

/// Qdrant accepts only unsigned integers and UUIDs as point ids
///
/// Any other id cannot name an existing point.
fn point_id(id: &str) -> Option<Value> {
    if let Ok(n) = id.parse::<u64>() {
        return Some(json!(n));
    }
    uuid::Uuid::parse_str(id).ok().map(|_| json!(id))
}

fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn query_body(request: &SearchRequest<'_>) -> Value {
    let query = match request.vector {
        QueryVector::Dense(v) => json!(v),
        QueryVector::Sparse(s) => json!({"indices": s.indices, "values": s.values}),
    };

    let mut body = json!({
        "query": query,
        "using": request.using,
        "limit": request.limit,
        "with_payload": true,
    });
    if let Some(filter) = request.filter {
        body["filter"] = filter.as_json().clone();
    }
    body
}

fn collection_body(spec: &CollectionSpec) -> Value {
    let mut body = json!({
        "vectors": {
            spec.dense_name.as_str(): {"size": spec.dimension, "distance": "Cosine"}
        }
    });
    if let Some(sparse) = &spec.sparse_name {
        body["sparse_vectors"] = json!({ sparse.as_str(): {"modifier": "idf"} });
    }
    body
}

fn index_body(index: &PayloadIndex) -> Value {
    json!({"field_name": index.key, "field_schema": index.field_type.index_schema()})
}

fn point_body(id: Value, point: &PointRecord) -> Value {
    let mut vector = json!({ point.dense_name.as_str(): point.dense });
    if let Some(sparse) = point.sparse.as_ref().filter(|s| !s.vector.is_empty()) {
        vector[sparse.name.as_str()] =
            json!({"indices": sparse.vector.indices, "values": sparse.vector.values});
    }
    json!({
        "points": [{
            "id": id,
            "vector": vector,
            "payload": point.payload,
        }]
    })
}

impl VectorStore for QdrantClient {
    fn backend_name(&self) -> &'static str {
        "qdrant"
    }

    fn collection_exists(&self, collection: &str) -> Result<bool> {
        let url = self.endpoint(collection, &["exists"]);
        let result: ExistsResult = self.send(self.http.get(url), "collection exists")?;
        Ok(result.exists)
    }

    fn ensure_collection(&self, collection: &str, spec: &CollectionSpec) -> Result<()> {
        if self.collection_exists(collection)? {
            return Ok(());
        }

        info!(
            "creating collection '{}' ({} dims, dense '{}', sparse {:?})",
            collection, spec.dimension, spec.dense_name, spec.sparse_name
        );
        let _: Value = self.send(
            self.http
                .put(self.endpoint(collection, &[]))
                .json(&collection_body(spec)),
            "create collection",
        )?;

        for index in &spec.payload_indexes {
            debug!("indexing '{}' as {}", index.key, index.field_type.index_schema());
            let _: Value = self.send(
                self.http
                    .put(self.endpoint(collection, &["index"]))
                    .query(&[("wait", "true")])
                    .json(&index_body(index)),
                "create payload index",
            )?;
        }
        Ok(())
    }

    fn search(&self, collection: &str, request: &SearchRequest<'_>) -> Result<Vec<ScoredPoint>> {
        debug!(
            "qdrant query '{}' using '{}' limit {}",
            collection, request.using, request.limit
        );
        let result: QueryResult = self.send(
            self.http
                .post(self.endpoint(collection, &["points", "query"]))
                .json(&query_body(request)),
            "query",
        )?;

        Ok(result
            .points
            .into_iter()
            .map(|p| ScoredPoint {
                id: id_to_string(&p.id),
                score: p.score,
                payload: p.payload.unwrap_or_default(),
            })
            .collect())
    }

    fn retrieve(&self, collection: &str, id: &str) -> Result<Option<Payload>> {
        let Some(pid) = point_id(id) else {
            return Ok(None);
        };

        let points: Vec<RawPoint> = self.send(
            self.http
                .post(self.endpoint(collection, &["points"]))
                .json(&json!({"ids": [pid], "with_payload": true, "with_vector": false})),
            "retrieve",
        )?;

        Ok(points
            .into_iter()
            .next()
            .map(|p| p.payload.unwrap_or_default()))
    }

    fn upsert(&self, collection: &str, point: PointRecord) -> Result<()> {
        let pid = point_id(&point.id).ok_or_else(|| {
            NotesError::invalid(format!(
                "point id '{}' must be a UUID or unsigned integer",
                point.id
            ))
        })?;

        let _: Value = self.send(
            self.http
                .put(self.endpoint(collection, &["points"]))
                .query(&[("wait", "true")])
                .json(&point_body(pid, &point)),
            "upsert",
        )?;
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let Some(pid) = point_id(id) else {
            return Err(NotesError::NotFound(id.to_string()));
        };

        let _: Value = self.send(
            self.http
                .post(self.endpoint(collection, &["points", "delete"]))
                .query(&[("wait", "true")])
                .json(&json!({"points": [pid]})),
            "delete",
        )?;
        Ok(())
    }
}
