//! Server configuration, read from environment variables at startup
//!
//! Every recognized variable is a field here with its default; nothing is
//! read from the environment after `Settings::from_env()` returns.

use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{NotesError, Result};

pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:11434/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8000";

pub const DEFAULT_SEARCH_NOTES_DESCRIPTION: &str =
    "Advanced hybrid search combining semantic similarity and keyword matching. \
     Use this tool when you need: \n \
     - Best search results by combining meaning and exact word matches \n \
     - More precise results than semantic search alone \n \
     - To find content that matches both concepts and specific terms \n \
     - Superior search quality using RRF or DBSF fusion methods";
pub const DEFAULT_ADD_NOTE_DESCRIPTION: &str =
    "Add a structured note to Qdrant. Use this tool when you need to store notes with specific \
     metadata such as commands, code snippets, API references, or learning materials. \
     The note will be automatically tagged and categorized for easy retrieval.";
pub const DEFAULT_UPDATE_NOTE_DESCRIPTION: &str =
    "Update an existing structured note in Qdrant. Use this tool when you need to modify \
     a previously stored note. Requires the unique identifier (ID) of the note to update.";
pub const DEFAULT_DELETE_NOTE_DESCRIPTION: &str =
    "Delete a note from Qdrant. Use this tool when you need to remove a stored note. \
     Requires the unique identifier (ID) of the note to delete.";

/// Where notes live
#[derive(Debug, Clone, PartialEq)]
pub enum StoreTarget {
    /// Qdrant server reached over REST
    Remote { url: String, api_key: Option<String> },
    /// On-disk store file
    Local { path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparseEncoderKind {
    Bm25,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stdio,
    Http,
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    /// OpenAI-compatible base URL (the `/embeddings` path is appended)
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
    pub sparse: SparseEncoderKind,
    pub timeout: Duration,
}

/// Payload type of a filterable metadata field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Keyword,
    Integer,
    Float,
    Boolean,
}

impl FieldType {
    /// Qdrant payload index schema
    pub fn index_schema(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "bool",
        }
    }

    /// JSON schema type of one argument value
    pub fn json_type(&self) -> &'static str {
        match self {
            Self::Keyword => "string",
            Self::Integer => "integer",
            Self::Float => "number",
            Self::Boolean => "boolean",
        }
    }
}

/// Comparison a filterable field exposes as a search argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum FilterCondition {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "any")]
    Any,
    #[serde(rename = "except")]
    Except,
}

impl FilterCondition {
    fn is_range(&self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }

    /// Argument takes a list of values
    pub fn is_list(&self) -> bool {
        matches!(self, Self::Any | Self::Except)
    }
}

/// Metadata field that gets a payload index and, with a condition, a typed
/// search argument of the same name
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilterableField {
    /// Key under the note's `metadata`
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub condition: Option<FilterCondition>,
    #[serde(default)]
    pub required: bool,
}

/// Parse the `FILTERABLE_FIELDS` JSON list
fn parse_filterable_fields(raw: Option<String>) -> Result<Vec<FilterableField>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let fields: Vec<FilterableField> = serde_json::from_str(&raw)
        .map_err(|e| NotesError::config(format!("FILTERABLE_FIELDS is not a valid field list: {}", e)))?;

    let mut names = HashSet::new();
    for field in &fields {
        if field.name.trim().is_empty() {
            return Err(NotesError::config("FILTERABLE_FIELDS entries need a name"));
        }
        if !names.insert(field.name.as_str()) {
            return Err(NotesError::config(format!(
                "FILTERABLE_FIELDS names '{}' twice",
                field.name
            )));
        }

        let Some(condition) = field.condition else {
            continue;
        };
        let numeric = matches!(field.field_type, FieldType::Integer | FieldType::Float);
        let fits = match field.field_type {
            _ if condition.is_range() => numeric,
            FieldType::Keyword | FieldType::Integer => true,
            FieldType::Float | FieldType::Boolean => !condition.is_list(),
        };
        if !fits {
            return Err(NotesError::config(format!(
                "FILTERABLE_FIELDS: condition {:?} does not apply to {} field '{}'",
                condition,
                field.field_type.json_type(),
                field.name
            )));
        }
    }

    Ok(fields)
}

/// Tool description texts shown to agents
#[derive(Debug, Clone)]
pub struct ToolDescriptions {
    pub search_notes: String,
    pub add_note: String,
    pub update_note: String,
    pub delete_note: String,
}

impl Default for ToolDescriptions {
    fn default() -> Self {
        Self {
            search_notes: DEFAULT_SEARCH_NOTES_DESCRIPTION.to_string(),
            add_note: DEFAULT_ADD_NOTE_DESCRIPTION.to_string(),
            update_note: DEFAULT_UPDATE_NOTE_DESCRIPTION.to_string(),
            delete_note: DEFAULT_DELETE_NOTE_DESCRIPTION.to_string(),
        }
    }
}

/// Configuration for the notes server
#[derive(Debug, Clone)]
pub struct Settings {
    pub store: StoreTarget,
    /// Default collection; when set, tools do not expose `collection_name`
    pub collection_name: Option<String>,
    /// Default `final_limit` for searches
    pub search_limit: usize,
    pub read_only: bool,
    /// Expose the raw `query_filter` argument on search
    pub allow_arbitrary_filter: bool,
    /// Indexed metadata fields; those with a condition become search arguments
    pub filterable_fields: Vec<FilterableField>,
    /// HTTP timeout for the store client
    pub timeout: Duration,
    pub embedding: EmbeddingSettings,
    /// RRF smoothing constant (default: 60)
    pub rrf_k: usize,
    pub transport: Transport,
    pub http_addr: SocketAddr,
    pub http_token: Option<String>,
    pub tools: ToolDescriptions,
}

impl Settings {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup (tests pass a map)
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let url = get("QDRANT_URL");
        let api_key = get("QDRANT_API_KEY");
        let local_path = get("QDRANT_LOCAL_PATH");

        let store = match (local_path, url) {
            (Some(path), None) if api_key.is_none() => StoreTarget::Local {
                path: PathBuf::from(path),
            },
            (Some(_), _) => {
                return Err(NotesError::config(
                    "QDRANT_LOCAL_PATH cannot be combined with QDRANT_URL or QDRANT_API_KEY",
                ))
            }
            (None, Some(url)) => StoreTarget::Remote { url, api_key },
            (None, None) => {
                return Err(NotesError::config(
                    "either QDRANT_URL or QDRANT_LOCAL_PATH must be set",
                ))
            }
        };

        let search_limit = parse_or(&get, "QDRANT_SEARCH_LIMIT", 10usize)?;
        if search_limit == 0 {
            return Err(NotesError::config("QDRANT_SEARCH_LIMIT must be positive"));
        }

        let rrf_k = parse_or(&get, "HYBRID_RRF_K", 60usize)?;
        if rrf_k == 0 {
            return Err(NotesError::config("HYBRID_RRF_K must be positive"));
        }

        let timeout = Duration::from_secs(parse_or(&get, "QDRANT_TIMEOUT_SECS", 30u64)?);

        let sparse = match get("SPARSE_ENCODER").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("bm25") => SparseEncoderKind::Bm25,
            Some("none") => SparseEncoderKind::None,
            Some(other) => {
                return Err(NotesError::config(format!(
                    "SPARSE_ENCODER must be 'bm25' or 'none', got '{}'",
                    other
                )))
            }
        };

        let transport = match get("MCP_TRANSPORT").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("stdio") => Transport::Stdio,
            Some("http") | Some("streamable-http") => Transport::Http,
            Some(other) => {
                return Err(NotesError::config(format!(
                    "MCP_TRANSPORT must be 'stdio' or 'http', got '{}'",
                    other
                )))
            }
        };

        let http_addr = get("MCP_HTTP_ADDR").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string());
        let http_addr: SocketAddr = http_addr.parse().map_err(|_| {
            NotesError::config(format!("MCP_HTTP_ADDR '{}' is not a socket address", http_addr))
        })?;

        let embedding = EmbeddingSettings {
            url: get("EMBEDDING_URL").unwrap_or_else(|| DEFAULT_EMBEDDING_URL.to_string()),
            api_key: get("EMBEDDING_API_KEY"),
            model: get("EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            dimension: parse_or(&get, "EMBEDDING_DIMENSION", 384usize)?,
            sparse,
            timeout,
        };
        if embedding.dimension == 0 {
            return Err(NotesError::config("EMBEDDING_DIMENSION must be positive"));
        }

        let defaults = ToolDescriptions::default();
        let tools = ToolDescriptions {
            search_notes: get("TOOL_HYBRID_FIND_DESCRIPTION").unwrap_or(defaults.search_notes),
            add_note: get("TOOL_ADD_NOTE_DESCRIPTION").unwrap_or(defaults.add_note),
            update_note: get("TOOL_UPDATE_NOTE_DESCRIPTION").unwrap_or(defaults.update_note),
            delete_note: get("TOOL_DELETE_NOTE_DESCRIPTION").unwrap_or(defaults.delete_note),
        };

        Ok(Self {
            store,
            collection_name: get("COLLECTION_NAME"),
            search_limit,
            read_only: parse_bool(&get, "QDRANT_READ_ONLY")?,
            allow_arbitrary_filter: parse_bool(&get, "QDRANT_ALLOW_ARBITRARY_FILTER")?,
            filterable_fields: parse_filterable_fields(get("FILTERABLE_FIELDS"))?,
            timeout,
            embedding,
            rrf_k,
            transport,
            http_addr,
            http_token: get("MCP_HTTP_TOKEN"),
            tools,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| NotesError::config(format!("{} has invalid value '{}'", key, raw))),
    }
}

fn parse_bool<G>(get: &G, key: &str) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_lowercase()).as_deref() {
        None => Ok(false),
        Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
        Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
        Some(other) => Err(NotesError::config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}
