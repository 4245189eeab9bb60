//! Error taxonomy shared by the store, retrieval and note layers
//!
//! Every failure surfaced to a tool caller carries a stable `kind()` string
//! alongside the human-readable message.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NotesError>;

#[derive(Debug, Error)]
pub enum NotesError {
    /// Bad tool argument (unknown fusion method, non-positive limit, bad filter)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No resolvable collection, conflicting store target, unparsable setting
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Embedding provider or vector store unreachable or erroring
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A stored point whose payload cannot be turned back into a note
    #[error("malformed note record '{id}': {reason}")]
    Mapping { id: String, reason: String },

    #[error("invalid note type '{0}': expected one of cli, api, learning, snippet, pattern")]
    InvalidNoteType(String),

    #[error("note not found: {0}")]
    NotFound(String),

    #[error("write rejected: server is running in read-only mode")]
    ReadOnly,
}

impl NotesError {
    /// Stable error kind reported to tool callers
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::Configuration(_) => "ConfigurationError",
            Self::StoreUnavailable(_) => "StoreUnavailable",
            Self::Mapping { .. } => "MappingError",
            Self::InvalidNoteType(_) => "InvalidNoteType",
            Self::NotFound(_) => "NotFound",
            Self::ReadOnly => "ReadOnly",
        }
    }

    /// Per-record failure that search tolerates by skipping the record
    pub fn is_record_error(&self) -> bool {
        matches!(self, Self::Mapping { .. } | Self::InvalidNoteType(_))
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable(message.into())
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
