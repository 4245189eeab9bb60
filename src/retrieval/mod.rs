//! Retrieval module - hybrid dense + sparse search with rank fusion
//!
//! Public interface:
//! - `HybridSearcher` runs both ranked searches in parallel and fuses them
//! - `HybridQuery` / `NoteHit` for one search invocation and its results
//! - `fuse`, `rrf_fuse`, `dbsf_fuse` for the fusion algorithms themselves

mod engine;
mod fusion;

pub use engine::{
    HybridQuery, HybridSearcher, NoteHit, DEFAULT_DENSE_LIMIT, DEFAULT_FINAL_LIMIT, DEFAULT_SPARSE_LIMIT,
};
pub use fusion::{
    dbsf_fuse, fuse, passthrough, rrf_fuse, CandidateSource, FusedResult, FusionMethod, ScoredCandidate,
    DEFAULT_RRF_K,
};
