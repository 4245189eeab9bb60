//! Shared test doubles: a deterministic embedding provider and a scripted store

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::DateTime;
use qdrant_notes::embeddings::{Bm25Encoder, EmbeddingProvider, SparseEncoder};
use qdrant_notes::notes::{to_payload, Note, NoteDraft, NoteType};
use qdrant_notes::store::{
    CollectionSpec, Payload, PointRecord, QueryVector, ScoredPoint, SearchRequest, VectorStore,
};
use qdrant_notes::{NotesError, Result};

pub const DIMENSION: usize = 8;

/// Bag-of-words embedder: each word adds 1.0 to a bucket picked by its bytes
pub struct MockProvider {
    sparse: Option<Arc<dyn SparseEncoder>>,
    fail: bool,
    pub calls: AtomicUsize,
}

impl MockProvider {
    pub fn hybrid() -> Self {
        Self {
            sparse: Some(Arc::new(Bm25Encoder::new())),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn dense_only() -> Self {
        Self {
            sparse: None,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::hybrid()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider for MockProvider {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(NotesError::StoreUnavailable("embedding service refused connection".into()));
        }

        let mut vector = vec![0.0; DIMENSION];
        for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if word.is_empty() {
                continue;
            }
            let bucket = word.bytes().map(usize::from).sum::<usize>() % DIMENSION;
            vector[bucket] += 1.0;
        }
        if vector.iter().all(|v| *v == 0.0) {
            vector[0] = 1.0;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn model_name(&self) -> &str {
        "mock/bag-of-words"
    }

    fn sparse_encoder(&self) -> Option<Arc<dyn SparseEncoder>> {
        self.sparse.clone()
    }
}

/// Store returning canned result lists and counting every call
#[derive(Default)]
pub struct MockStore {
    pub exists: bool,
    pub dense: Vec<ScoredPoint>,
    pub sparse: Vec<ScoredPoint>,
    pub fail_sparse: bool,
    pub calls: AtomicUsize,
    /// (vector name, limit, filtered) per search
    pub searches: Mutex<Vec<(String, usize, bool)>>,
}

impl MockStore {
    pub fn with_lists(dense: Vec<ScoredPoint>, sparse: Vec<ScoredPoint>) -> Self {
        Self {
            exists: true,
            dense,
            sparse,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn search_log(&self) -> Vec<(String, usize, bool)> {
        let mut log = self.searches.lock().clone();
        // The two searches run concurrently
        log.sort();
        log
    }
}

impl VectorStore for MockStore {
    fn backend_name(&self) -> &'static str {
        "mock"
    }

    fn collection_exists(&self, _collection: &str) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.exists)
    }

    fn ensure_collection(&self, _collection: &str, _spec: &CollectionSpec) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn search(&self, _collection: &str, request: &SearchRequest<'_>) -> Result<Vec<ScoredPoint>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.searches
            .lock()
            .push((request.using.to_string(), request.limit, request.filter.is_some()));

        let list = match request.vector {
            QueryVector::Dense(_) => &self.dense,
            QueryVector::Sparse(_) => {
                if self.fail_sparse {
                    return Err(NotesError::StoreUnavailable("sparse search timed out".into()));
                }
                &self.sparse
            }
        };
        Ok(list.iter().take(request.limit).cloned().collect())
    }

    fn retrieve(&self, _collection: &str, _id: &str) -> Result<Option<Payload>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    fn upsert(&self, _collection: &str, _point: PointRecord) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, _collection: &str, _id: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn note(id: &str, text: &str, note_type: NoteType) -> Note {
    Note {
        note_id: id.to_string(),
        text: text.to_string(),
        context: format!("context for {}", id),
        note_type,
        created_at: DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z").unwrap(),
        tool: None,
        tags: None,
        language: None,
        source: None,
    }
}

/// Search hit whose payload maps back to a valid note
pub fn point(id: &str, score: f32) -> ScoredPoint {
    ScoredPoint {
        id: id.to_string(),
        score,
        payload: to_payload(&note(id, &format!("note {}", id), NoteType::Learning)),
    }
}

pub fn draft(text: &str, note_type: &str) -> NoteDraft {
    NoteDraft {
        text: text.to_string(),
        context: "found while debugging".to_string(),
        note_type: note_type.to_string(),
        created_at: "2024-06-01T09:30:00Z".to_string(),
        tags: Some(vec!["test".to_string()]),
        ..NoteDraft::default()
    }
}
