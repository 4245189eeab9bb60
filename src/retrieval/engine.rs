//! HybridSearcher - parallel dense + sparse retrieval with rank fusion

use log::{debug, error, warn};
use std::sync::Arc;

use super::fusion::{fuse, passthrough, CandidateSource, FusedResult, FusionMethod, ScoredCandidate, DEFAULT_RRF_K};
use crate::embeddings::{EmbeddingProvider, SparseEncoder};
use crate::error::{NotesError, Result};
use crate::notes::{from_payload, Note};
use crate::store::{Filter, QueryVector, ScoredPoint, SearchRequest, VectorStore};

pub const DEFAULT_DENSE_LIMIT: usize = 20;
pub const DEFAULT_SPARSE_LIMIT: usize = 20;
pub const DEFAULT_FINAL_LIMIT: usize = 10;

/// One hybrid search invocation
#[derive(Debug, Clone)]
pub struct HybridQuery {
    pub query: String,
    /// Explicit collection; falls back to the configured default
    pub collection: Option<String>,
    /// "rrf" or "dbsf", parsed before any backend call
    pub fusion_method: String,
    pub dense_limit: usize,
    pub sparse_limit: usize,
    pub final_limit: usize,
    pub filter: Option<Filter>,
}

impl HybridQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            collection: None,
            fusion_method: FusionMethod::default().to_string(),
            dense_limit: DEFAULT_DENSE_LIMIT,
            sparse_limit: DEFAULT_SPARSE_LIMIT,
            final_limit: DEFAULT_FINAL_LIMIT,
            filter: None,
        }
    }
}

/// Search result mapped back into a note
#[derive(Debug, Clone, PartialEq)]
pub struct NoteHit {
    pub note: Note,
    /// Fused score, or the raw dense score when fusion was skipped
    pub score: f32,
    pub sources: Vec<CandidateSource>,
}

/// Coordinates embedding, the two ranked searches and fusion
///
/// The sparse capability is looked up once here; every search afterwards
/// either runs both lists or the dense list alone.
pub struct HybridSearcher {
    store: Arc<dyn VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    sparse: Option<Arc<dyn SparseEncoder>>,
    dense_name: String,
    default_collection: Option<String>,
    rrf_k: usize,
}

impl HybridSearcher {
    pub fn new(
        store: Arc<dyn VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        default_collection: Option<String>,
    ) -> Self {
        let sparse = provider.sparse_encoder();
        let dense_name = provider.vector_name();
        debug!(
            "Hybrid searcher on {} store: dense '{}', sparse {}",
            store.backend_name(),
            dense_name,
            sparse.as_ref().map(|s| s.vector_name()).unwrap_or("disabled")
        );

        Self {
            store,
            provider,
            sparse,
            dense_name,
            default_collection,
            rrf_k: DEFAULT_RRF_K,
        }
    }

    pub fn with_rrf_k(mut self, rrf_k: usize) -> Self {
        self.rrf_k = rrf_k;
        self
    }

    pub fn has_sparse(&self) -> bool {
        self.sparse.is_some()
    }

    pub fn default_collection(&self) -> Option<&str> {
        self.default_collection.as_deref()
    }

    /// Explicit collection, else the configured default
    pub fn resolve_collection(&self, explicit: Option<&str>) -> Result<String> {
        explicit
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .or(self.default_collection.as_deref())
            .map(str::to_string)
            .ok_or_else(|| {
                NotesError::config("no collection given and COLLECTION_NAME is not configured")
            })
    }

    /// Run one hybrid search, best-first, at most `final_limit` hits
    pub fn search(&self, query: &HybridQuery) -> Result<Vec<NoteHit>> {
        // Everything that can be rejected is rejected before the first backend call
        let method: FusionMethod = query.fusion_method.parse()?;
        for (name, value) in [
            ("dense_limit", query.dense_limit),
            ("sparse_limit", query.sparse_limit),
            ("final_limit", query.final_limit),
        ] {
            if value == 0 {
                return Err(NotesError::invalid(format!("{} must be greater than 0", name)));
            }
        }
        if query.query.trim().is_empty() {
            return Err(NotesError::invalid("query must not be empty"));
        }
        let collection = self.resolve_collection(query.collection.as_deref())?;

        if !self.store.collection_exists(&collection)? {
            debug!("Collection '{}' does not exist, no results", collection);
            return Ok(Vec::new());
        }

        let dense = self.provider.embed_query(&query.query)?;
        let sparse = self
            .sparse
            .as_ref()
            .map(|encoder| (encoder.vector_name(), encoder.encode_query(&query.query)))
            .filter(|(_, vector)| !vector.is_empty());

        let dense_request = SearchRequest {
            using: &self.dense_name,
            vector: QueryVector::Dense(&dense),
            limit: query.dense_limit,
            filter: query.filter.as_ref(),
        };

        let fused = match &sparse {
            Some((name, vector)) => {
                let sparse_request = SearchRequest {
                    using: name,
                    vector: QueryVector::Sparse(vector),
                    limit: query.sparse_limit,
                    filter: query.filter.as_ref(),
                };

                let (dense_hits, sparse_hits) = rayon::join(
                    || self.store.search(&collection, &dense_request),
                    || self.store.search(&collection, &sparse_request),
                );
                let dense_hits = dense_hits.inspect_err(|e| error!("Dense search failed: {}", e))?;
                let sparse_hits = sparse_hits.inspect_err(|e| error!("Sparse search failed: {}", e))?;
                debug!(
                    "Fusing {} dense + {} sparse hits with {}",
                    dense_hits.len(),
                    sparse_hits.len(),
                    method
                );

                fuse(
                    vec![
                        candidates(dense_hits, CandidateSource::Dense),
                        candidates(sparse_hits, CandidateSource::Sparse),
                    ],
                    method,
                    self.rrf_k,
                )
            }
            None => {
                if self.sparse.is_some() {
                    warn!("Query has no keyword terms, using dense results only");
                }
                let dense_hits = self
                    .store
                    .search(&collection, &dense_request)
                    .inspect_err(|e| error!("Dense search failed: {}", e))?;
                passthrough(candidates(dense_hits, CandidateSource::Dense))
            }
        };

        to_hits(fused, query.final_limit)
    }
}

fn candidates(points: Vec<ScoredPoint>, source: CandidateSource) -> Vec<ScoredCandidate> {
    points
        .into_iter()
        .map(|p| ScoredCandidate::from_point(p, source))
        .collect()
}

/// Truncate, then map payloads; unmappable records are skipped
fn to_hits(mut fused: Vec<FusedResult>, limit: usize) -> Result<Vec<NoteHit>> {
    fused.truncate(limit);

    let mut hits = Vec::with_capacity(fused.len());
    for result in fused {
        match from_payload(&result.id, &result.payload) {
            Ok(note) => hits.push(NoteHit {
                note,
                score: result.fused_score,
                sources: result.sources,
            }),
            Err(e) if e.is_record_error() => warn!("Skipping stored point: {}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(hits)
}
