//! HTTP embedding provider - OpenAI-compatible `/embeddings` endpoint
//!
//! Works with any server speaking the OpenAI embeddings wire format
//! (Ollama, LM Studio, text-embeddings-inference, OpenAI itself).

use log::debug;
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{EmbeddingProvider, SparseEncoder};
use crate::config::EmbeddingSettings;
use crate::error::{NotesError, Result};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct HttpEmbeddingProvider {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    http: HttpClient,
    sparse: Option<Arc<dyn SparseEncoder>>,
}

impl HttpEmbeddingProvider {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| NotesError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: format!("{}/embeddings", settings.url.trim_end_matches('/')),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            dimension: settings.dimension,
            http,
            sparse: None,
        })
    }

    /// Attach a sparse encoder, advertising the keyword-search capability
    pub fn with_sparse(mut self, encoder: Arc<dyn SparseEncoder>) -> Self {
        self.sparse = Some(encoder);
        self
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("embedding {} chars with {}", text.len(), self.model);

        let request = EmbeddingRequest {
            model: &self.model,
            input: vec![text],
        };
        let mut builder = self.http.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().map_err(|e| {
            NotesError::unavailable(format!(
                "embedding provider at {} unreachable: {}",
                self.endpoint, e
            ))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(NotesError::unavailable(format!(
                "embedding provider returned {}: {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = response.json().map_err(|e| {
            NotesError::unavailable(format!("Failed to parse embedding response: {}", e))
        })?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| NotesError::unavailable("embedding response contained no vectors"))?;

        check_dimension(embedding, self.dimension)
    }
}

/// Reject vectors that do not match the configured dimension
fn check_dimension(embedding: Vec<f32>, expected: usize) -> Result<Vec<f32>> {
    if embedding.len() != expected {
        return Err(NotesError::unavailable(format!(
            "embedding dimension mismatch: expected {}, got {}",
            expected,
            embedding.len()
        )));
    }
    Ok(embedding)
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn sparse_encoder(&self) -> Option<Arc<dyn SparseEncoder>> {
        self.sparse.clone()
    }
}
