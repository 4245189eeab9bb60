//! NoteService - add, update and delete notes in the default collection

use log::{debug, info};
use std::sync::Arc;
use uuid::Uuid;

use super::{embeddable_text, to_payload, Note, NoteDraft, METADATA_KEY};
use crate::config::{FieldType, FilterableField};
use crate::embeddings::{EmbeddingProvider, SparseEncoder};
use crate::error::{NotesError, Result};
use crate::store::{CollectionSpec, NamedSparse, PayloadIndex, PointRecord, VectorStore};

/// Note metadata indexed in every collection
const NOTE_KEYWORD_FIELDS: [&str; 4] = ["type", "tags", "language", "tool"];

fn metadata_key(field: &str) -> String {
    format!("{}.{}", METADATA_KEY, field)
}

pub struct NoteService {
    store: Arc<dyn VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    sparse: Option<Arc<dyn SparseEncoder>>,
    collection: Option<String>,
    read_only: bool,
    payload_indexes: Vec<PayloadIndex>,
}

impl NoteService {
    pub fn new(
        store: Arc<dyn VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        collection: Option<String>,
        read_only: bool,
    ) -> Self {
        let sparse = provider.sparse_encoder();
        Self {
            store,
            provider,
            sparse,
            collection,
            read_only,
            payload_indexes: NOTE_KEYWORD_FIELDS
                .iter()
                .map(|field| PayloadIndex {
                    key: metadata_key(field),
                    field_type: FieldType::Keyword,
                })
                .collect(),
        }
    }

    /// Index these metadata fields too; a declared type overrides the default
    pub fn with_filterable_fields(mut self, fields: &[FilterableField]) -> Self {
        for field in fields {
            let index = PayloadIndex {
                key: metadata_key(&field.name),
                field_type: field.field_type,
            };
            match self.payload_indexes.iter_mut().find(|i| i.key == index.key) {
                Some(existing) => *existing = index,
                None => self.payload_indexes.push(index),
            }
        }
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Writes always target the configured default collection
    fn writable_collection(&self) -> Result<&str> {
        if self.read_only {
            return Err(NotesError::ReadOnly);
        }
        self.collection
            .as_deref()
            .ok_or_else(|| NotesError::config("COLLECTION_NAME must be set to write notes"))
    }

    /// Vector layout new collections are created with
    pub fn collection_spec(&self) -> CollectionSpec {
        CollectionSpec {
            dense_name: self.provider.vector_name(),
            dimension: self.provider.dimension(),
            sparse_name: self.sparse.as_ref().map(|s| s.vector_name().to_string()),
            payload_indexes: self.payload_indexes.clone(),
        }
    }

    fn point(&self, note: &Note) -> Result<PointRecord> {
        let text = embeddable_text(note);
        let dense = self.provider.embed_document(text)?;
        let sparse = self.sparse.as_ref().map(|encoder| NamedSparse {
            name: encoder.vector_name().to_string(),
            vector: encoder.encode_document(text),
        });

        Ok(PointRecord {
            id: note.note_id.clone(),
            dense_name: self.provider.vector_name(),
            dense,
            sparse,
            payload: to_payload(note),
        })
    }

    /// Fails with NotFound unless the note is present
    fn require_existing(&self, collection: &str, note_id: &str) -> Result<()> {
        if !self.store.collection_exists(collection)? {
            return Err(NotesError::NotFound(note_id.to_string()));
        }
        match self.store.retrieve(collection, note_id)? {
            Some(_) => Ok(()),
            None => Err(NotesError::NotFound(note_id.to_string())),
        }
    }

    /// Store a new note under a fresh id, creating the collection if needed
    pub fn add_note(&self, draft: NoteDraft) -> Result<Note> {
        let collection = self.writable_collection()?;
        let note = draft.validate(Uuid::new_v4().to_string())?;

        self.store.ensure_collection(collection, &self.collection_spec())?;
        self.store.upsert(collection, self.point(&note)?)?;

        info!("Added {} note {} to '{}'", note.note_type, note.note_id, collection);
        Ok(note)
    }

    /// Replace every field of an existing note, keeping its id
    pub fn update_note(&self, note_id: &str, draft: NoteDraft) -> Result<Note> {
        let collection = self.writable_collection()?;
        check_note_id(note_id)?;
        let note = draft.validate(note_id)?;
        self.require_existing(collection, &note.note_id)?;

        self.store.upsert(collection, self.point(&note)?)?;

        info!("Updated note {} in '{}'", note.note_id, collection);
        Ok(note)
    }

    pub fn delete_note(&self, note_id: &str) -> Result<()> {
        let collection = self.writable_collection()?;
        check_note_id(note_id)?;
        self.require_existing(collection, note_id)?;

        self.store.delete(collection, note_id)?;

        debug!("Deleted note {} from '{}'", note_id, collection);
        Ok(())
    }
}

/// Ids match exactly; padding is rejected rather than stripped
fn check_note_id(note_id: &str) -> Result<()> {
    if note_id.trim().is_empty() {
        return Err(NotesError::invalid("note_id must not be empty"));
    }
    if note_id.trim() != note_id {
        return Err(NotesError::invalid(format!(
            "note_id '{}' has surrounding whitespace",
            note_id
        )));
    }
    Ok(())
}
