//! Note <-> store payload mapping
//!
//! Payload layout stays compatible with points written by earlier servers:
//! `{"document": <text>, "metadata": {"context", "type", "created_at", ...}}`.
//! Absent optional fields are omitted rather than written as null.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{parse_timestamp, Note, NoteType};
use crate::error::{NotesError, Result};
use crate::store::Payload;

pub const DOCUMENT_KEY: &str = "document";
pub const METADATA_KEY: &str = "metadata";

/// Metadata block of a stored note
#[derive(Debug, Serialize, Deserialize)]
struct NoteMetadata {
    context: String,
    #[serde(rename = "type")]
    note_type: String,
    created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

/// Text sent to the embedding provider for a note
///
/// Only `text` is embedded; context and tags stay payload metadata so
/// metadata edits never change the vector.
pub fn embeddable_text(note: &Note) -> &str {
    &note.text
}

/// Build the store payload for a note
pub fn to_payload(note: &Note) -> Payload {
    let metadata = NoteMetadata {
        context: note.context.clone(),
        note_type: note.note_type.as_str().to_string(),
        created_at: note.created_at_string(),
        tool: note.tool.clone(),
        tags: note.tags.clone(),
        language: note.language.clone(),
        source: note.source.clone(),
    };

    let mut payload = Payload::new();
    payload.insert(DOCUMENT_KEY.to_string(), Value::String(note.text.clone()));
    // NoteMetadata is plain strings, serialization cannot fail
    payload.insert(
        METADATA_KEY.to_string(),
        serde_json::to_value(metadata).unwrap_or(Value::Null),
    );
    payload
}

/// Rebuild a note from a stored point
///
/// Errors are per-record (`Mapping` / `InvalidNoteType`); callers that scan
/// many points skip the record and keep going.
pub fn from_payload(id: &str, payload: &Payload) -> Result<Note> {
    let mapping = |reason: String| NotesError::Mapping {
        id: id.to_string(),
        reason,
    };

    let text = payload
        .get(DOCUMENT_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| mapping(format!("missing '{}' string", DOCUMENT_KEY)))?;

    let metadata = payload
        .get(METADATA_KEY)
        .cloned()
        .ok_or_else(|| mapping(format!("missing '{}' object", METADATA_KEY)))?;
    let metadata: NoteMetadata =
        serde_json::from_value(metadata).map_err(|e| mapping(e.to_string()))?;

    let note_type: NoteType = metadata.note_type.parse()?;
    let created_at = parse_timestamp(&metadata.created_at)
        .ok_or_else(|| mapping(format!("unparsable created_at '{}'", metadata.created_at)))?;

    Ok(Note {
        note_id: id.to_string(),
        text: text.to_string(),
        context: metadata.context,
        note_type,
        created_at,
        tool: metadata.tool,
        tags: metadata.tags,
        language: metadata.language,
        source: metadata.source,
    })
}
