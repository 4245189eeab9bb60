//! Embeddings module - turn note and query text into vectors
//!
//! Provides trait-based abstraction over the embedding backend. Dense vectors
//! come from an external service; sparse (keyword) vectors are an optional
//! capability a provider may advertise through `sparse_encoder()`.

mod bm25;
mod http;
mod similarity;

pub use bm25::{Bm25Encoder, SPARSE_VECTOR_NAME};
pub use http::HttpEmbeddingProvider;
pub use similarity::{cosine_similarity, sparse_dot};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{EmbeddingSettings, SparseEncoderKind};
use crate::error::Result;

/// Sparse term-weight vector, indices strictly increasing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }
}

/// Keyword-side encoder producing sparse vectors
pub trait SparseEncoder: Send + Sync {
    /// Named sparse vector this encoder fills in a collection
    fn vector_name(&self) -> &str;

    /// Encode query text (may be empty when the query has no terms)
    fn encode_query(&self, text: &str) -> SparseVector;

    /// Encode document text for storage
    fn encode_document(&self, text: &str) -> SparseVector;
}

/// Trait for embedding providers
///
/// Requires Send + Sync: one provider is built at startup and shared by every
/// concurrent tool invocation.
pub trait EmbeddingProvider: Send + Sync {
    /// Dense embedding for a search query
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Dense embedding for stored note text
    ///
    /// Default implementation calls embed_query() for symmetric models.
    fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_query(text)
    }

    /// Dense vector dimension (e.g., 384 for all-MiniLM-L6-v2)
    fn dimension(&self) -> usize;

    /// Model identifier
    fn model_name(&self) -> &str;

    /// Named dense vector in the collection
    fn vector_name(&self) -> String {
        dense_vector_name(self.model_name())
    }

    /// Sparse capability, queried once when search and write paths are built
    fn sparse_encoder(&self) -> Option<Arc<dyn SparseEncoder>> {
        None
    }
}

/// Dense vector name derived from the model id
///
/// Matches the naming existing collections were created with:
/// "sentence-transformers/all-MiniLM-L6-v2" -> "fast-all-minilm-l6-v2".
pub fn dense_vector_name(model_name: &str) -> String {
    let short = model_name.rsplit('/').next().unwrap_or(model_name);
    format!("fast-{}", short.to_lowercase())
}

/// Factory function to create the provider from settings
pub fn create_provider(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingProvider>> {
    let mut provider = HttpEmbeddingProvider::new(settings)?;
    if settings.sparse == SparseEncoderKind::Bm25 {
        provider = provider.with_sparse(Arc::new(Bm25Encoder::new()));
    }
    Ok(Arc::new(provider))
}
