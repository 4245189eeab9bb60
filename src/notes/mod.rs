//! Structured notes - the records agents store and search
//!
//! Public interface:
//! - `Note` / `NoteType` - validated note model
//! - `NoteDraft` - raw tool arguments, validated into a `Note`
//! - `to_payload` / `from_payload` - store payload mapping
//! - `NoteService` - add / update / delete against the vector store

mod record;
mod service;

pub use record::{embeddable_text, from_payload, to_payload, DOCUMENT_KEY, METADATA_KEY};
pub use service::NoteService;

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{NotesError, Result};

/// Kind of knowledge a note holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteType {
    Cli,
    Api,
    Learning,
    Snippet,
    Pattern,
}

impl NoteType {
    pub const ALL: [NoteType; 5] = [
        NoteType::Cli,
        NoteType::Api,
        NoteType::Learning,
        NoteType::Snippet,
        NoteType::Pattern,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NoteType::Cli => "cli",
            NoteType::Api => "api",
            NoteType::Learning => "learning",
            NoteType::Snippet => "snippet",
            NoteType::Pattern => "pattern",
        }
    }
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteType {
    type Err = NotesError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        NoteType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| NotesError::InvalidNoteType(s.to_string()))
    }
}

/// A validated note as held in a collection
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// Point id in the store, unique within a collection
    pub note_id: String,
    /// Primary knowledge content (the only embedded field)
    pub text: String,
    /// When / why / how the text is useful
    pub context: String,
    pub note_type: NoteType,
    pub created_at: DateTime<FixedOffset>,
    pub tool: Option<String>,
    /// Ordered, duplicate-free
    pub tags: Option<Vec<String>>,
    pub language: Option<String>,
    /// Reference URL
    pub source: Option<String>,
}

impl Note {
    /// Timestamp as written to the payload
    pub fn created_at_string(&self) -> String {
        self.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
}

/// Note fields as they arrive from a tool call, before validation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteDraft {
    pub text: String,
    pub context: String,
    #[serde(rename = "type")]
    pub note_type: String,
    pub created_at: String,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl NoteDraft {
    /// Validate and normalize the draft into a note with the given id
    pub fn validate(self, note_id: impl Into<String>) -> Result<Note> {
        if self.text.trim().is_empty() {
            return Err(NotesError::invalid("note text must not be empty"));
        }

        let note_type: NoteType = self.note_type.parse()?;
        let created_at = parse_timestamp(&self.created_at).ok_or_else(|| {
            NotesError::invalid(format!(
                "created_at '{}' is not an ISO-8601 timestamp",
                self.created_at
            ))
        })?;

        let source = match non_empty(self.source) {
            Some(src) => {
                url::Url::parse(&src).map_err(|e| {
                    NotesError::invalid(format!("source '{}' is not a valid URL: {}", src, e))
                })?;
                Some(src)
            }
            None => None,
        };

        Ok(Note {
            note_id: note_id.into(),
            text: self.text,
            context: self.context,
            note_type,
            created_at,
            tool: non_empty(self.tool),
            tags: self.tags.and_then(normalize_tags),
            language: non_empty(self.language),
            source,
        })
    }
}

/// Parse an ISO-8601 timestamp; naive date-times are taken as UTC
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc().fixed_offset())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc().fixed_offset())
        })
}

/// Trim tags, drop empties and duplicates (first occurrence wins)
fn normalize_tags(tags: Vec<String>) -> Option<Vec<String>> {
    let mut seen = std::collections::HashSet::new();
    let tags: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect();

    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
