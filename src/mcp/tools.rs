//! Tool catalogue, argument parsing and result text

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::{FieldType, FilterCondition, FilterableField, ToolDescriptions};
use crate::error::{NotesError, Result};
use crate::notes::{to_payload, Note, NoteDraft, METADATA_KEY};
use crate::retrieval::{HybridQuery, NoteHit, DEFAULT_DENSE_LIMIT, DEFAULT_SPARSE_LIMIT};
use crate::store::Filter;

pub const SEARCH_NOTES: &str = "qdrant-search-notes";
pub const ADD_NOTE: &str = "qdrant-add-note";
pub const UPDATE_NOTE: &str = "qdrant-update-note";
pub const DELETE_NOTE: &str = "qdrant-delete-note";

/// Characters of note text echoed back in confirmations
const PREVIEW_CHARS: usize = 50;

/// Deployment switches that shape the tool surface
#[derive(Debug, Clone)]
pub struct ToolOptions {
    pub descriptions: ToolDescriptions,
    /// No default collection: callers must name one
    pub expose_collection: bool,
    pub allow_filter: bool,
    pub read_only: bool,
    /// Default `final_limit`
    pub search_limit: usize,
    /// Fields with a condition become typed search arguments
    pub filterable_fields: Vec<FilterableField>,
}

impl ToolOptions {
    fn typed_filters(&self) -> impl Iterator<Item = (&FilterableField, FilterCondition)> {
        self.filterable_fields
            .iter()
            .filter_map(|f| f.condition.map(|c| (f, c)))
    }

    /// Typed field arguments replace the raw `query_filter`
    fn accepts_query_filter(&self) -> bool {
        self.allow_filter && self.typed_filters().next().is_none()
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    collection_name: Option<String>,
    #[serde(default)]
    fusion_method: Option<String>,
    #[serde(default)]
    dense_limit: Option<i64>,
    #[serde(default)]
    sparse_limit: Option<i64>,
    #[serde(default)]
    final_limit: Option<i64>,
    #[serde(default)]
    query_filter: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    note_id: String,
    #[serde(flatten)]
    draft: NoteDraft,
}

#[derive(Debug, Deserialize)]
struct DeleteArgs {
    note_id: String,
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| NotesError::invalid(format!("{}: {}", tool, e)))
}

fn positive_limit(name: &str, value: Option<i64>, default: usize) -> Result<usize> {
    match value {
        None => Ok(default),
        Some(v) if v > 0 => Ok(v as usize),
        Some(v) => Err(NotesError::invalid(format!("{} must be greater than 0, got {}", name, v))),
    }
}

fn value_fits(field_type: FieldType, value: &Value) -> bool {
    match field_type {
        FieldType::Keyword => value.is_string(),
        FieldType::Integer => value.is_i64() || value.is_u64(),
        FieldType::Float => value.is_number(),
        FieldType::Boolean => value.is_boolean(),
    }
}

/// One `must` condition on `metadata.<field>`
fn field_condition(field: &FilterableField, condition: FilterCondition, value: Value) -> Result<Value> {
    let fits = match &value {
        Value::Array(items) if condition.is_list() => items.iter().all(|v| value_fits(field.field_type, v)),
        _ if condition.is_list() => false,
        v => value_fits(field.field_type, v),
    };
    if !fits {
        let expected = if condition.is_list() {
            format!("a list of {}", field.field_type.json_type())
        } else {
            field.field_type.json_type().to_string()
        };
        return Err(NotesError::invalid(format!("{} must be {}, got {}", field.name, expected, value)));
    }

    let key = format!("{}.{}", METADATA_KEY, field.name);
    let range = |op: &str| json!({"key": key, "range": {op: value}});
    Ok(match condition {
        FilterCondition::Eq => json!({"key": key, "match": {"value": value}}),
        FilterCondition::Ne => json!({"must_not": [{"key": key, "match": {"value": value}}]}),
        FilterCondition::Gt => range("gt"),
        FilterCondition::Gte => range("gte"),
        FilterCondition::Lt => range("lt"),
        FilterCondition::Lte => range("lte"),
        FilterCondition::Any => json!({"key": key, "match": {"any": value}}),
        FilterCondition::Except => json!({"key": key, "match": {"except": value}}),
    })
}

/// Filter built from the typed field arguments present in `args`
fn typed_filter(args: &Value, options: &ToolOptions) -> Result<Option<Filter>> {
    let mut must = Vec::new();
    for (field, condition) in options.typed_filters() {
        match args.get(&field.name) {
            None | Some(Value::Null) if field.required => {
                return Err(NotesError::invalid(format!("{} is required", field.name)))
            }
            None | Some(Value::Null) => {}
            Some(value) => must.push(field_condition(field, condition, value.clone())?),
        }
    }

    if must.is_empty() {
        return Ok(None);
    }
    Filter::from_json(json!({ "must": must })).map(Some)
}

pub fn search_query(args: Value, options: &ToolOptions) -> Result<HybridQuery> {
    let typed = typed_filter(&args, options)?;
    let args: SearchArgs = parse_args(SEARCH_NOTES, args)?;

    let filter = match args.query_filter {
        None | Some(Value::Null) => typed,
        Some(_) if !options.accepts_query_filter() => {
            return Err(NotesError::invalid(
                "query_filter is disabled; set QDRANT_ALLOW_ARBITRARY_FILTER and use no typed filter fields",
            ))
        }
        Some(raw) => Some(Filter::from_json(raw)?),
    };

    let mut query = HybridQuery::new(args.query);
    if options.expose_collection {
        query.collection = args.collection_name;
    }
    if let Some(method) = args.fusion_method {
        query.fusion_method = method;
    }
    query.dense_limit = positive_limit("dense_limit", args.dense_limit, DEFAULT_DENSE_LIMIT)?;
    query.sparse_limit = positive_limit("sparse_limit", args.sparse_limit, DEFAULT_SPARSE_LIMIT)?;
    query.final_limit = positive_limit("final_limit", args.final_limit, options.search_limit)?;
    query.filter = filter;
    Ok(query)
}

pub fn add_args(args: Value) -> Result<NoteDraft> {
    parse_args(ADD_NOTE, args)
}

pub fn update_args(args: Value) -> Result<(String, NoteDraft)> {
    let args: UpdateArgs = parse_args(UPDATE_NOTE, args)?;
    Ok((args.note_id, args.draft))
}

pub fn delete_args(args: Value) -> Result<String> {
    let args: DeleteArgs = parse_args(DELETE_NOTE, args)?;
    Ok(args.note_id)
}

/// `<entry>` block for one search hit
pub fn format_entry(note: &Note) -> String {
    let payload = to_payload(note);
    let metadata = payload
        .get(METADATA_KEY)
        .map(|m| m.to_string())
        .unwrap_or_default();
    format!(
        "<entry><id>{}</id><content>{}</content><metadata>{}</metadata></entry>",
        note.note_id, note.text, metadata
    )
}

/// Header line followed by one entry per hit
pub fn search_results(query: &HybridQuery, hits: &[NoteHit]) -> Vec<String> {
    if hits.is_empty() {
        return vec![format!("No results for '{}'", query.query)];
    }

    let mut lines = Vec::with_capacity(hits.len() + 1);
    lines.push(format!(
        "Hybrid search results for '{}' (fusion: {})",
        query.query,
        query.fusion_method.trim().to_ascii_lowercase()
    ));
    lines.extend(hits.iter().map(|hit| format_entry(&hit.note)));
    lines
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

pub fn added_message(note: &Note) -> String {
    format!(
        "Note added: {}... (type: {}, id: {})",
        preview(&note.text),
        note.note_type,
        note.note_id
    )
}

pub fn updated_message(note: &Note) -> String {
    format!(
        "Note updated: {}... (type: {}, id: {})",
        preview(&note.text),
        note.note_type,
        note.note_id
    )
}

pub fn deleted_message(note_id: &str) -> String {
    format!("Note deleted: {}", note_id)
}

fn note_properties() -> serde_json::Map<String, Value> {
    let props = json!({
        "text": {"type": "string", "description": "The primary knowledge content"},
        "context": {"type": "string", "description": "Explains when / why / how the text is useful"},
        "type": {
            "type": "string",
            "enum": ["cli", "api", "learning", "snippet", "pattern"],
            "description": "Type of note: cli | api | learning | snippet | pattern"
        },
        "created_at": {
            "type": "string",
            "description": "ISO-8601 formatted timestamp of when the knowledge was recorded"
        },
        "tool": {"type": "string", "description": "Tool or command name (optional)"},
        "tags": {
            "type": "array",
            "items": {"type": "string"},
            "description": "List of tags for categorization (optional)"
        },
        "language": {"type": "string", "description": "Programming language if applicable (optional)"},
        "source": {"type": "string", "description": "Source or reference URL (optional)"}
    });
    match props {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

const NOTE_REQUIRED: [&str; 4] = ["text", "context", "type", "created_at"];

/// `tools/list` entries for this deployment
pub fn definitions(options: &ToolOptions) -> Vec<Value> {
    let mut search_props = json!({
        "query": {"type": "string", "description": "What to search for"},
        "fusion_method": {
            "type": "string",
            "enum": ["rrf", "dbsf"],
            "default": "rrf",
            "description": "Fusion method: 'rrf' or 'dbsf'"
        },
        "dense_limit": {
            "type": "integer",
            "default": DEFAULT_DENSE_LIMIT,
            "description": "Max results from semantic search"
        },
        "sparse_limit": {
            "type": "integer",
            "default": DEFAULT_SPARSE_LIMIT,
            "description": "Max results from keyword search"
        },
        "final_limit": {
            "type": "integer",
            "default": options.search_limit,
            "description": "Final number of results after fusion"
        }
    });
    let mut search_required = vec!["query"];
    if options.expose_collection {
        search_props["collection_name"] = json!({
            "type": "string",
            "description": "The collection to search in"
        });
        search_required.push("collection_name");
    }
    if options.accepts_query_filter() {
        search_props["query_filter"] = json!({
            "type": "object",
            "description": "Qdrant filter (must / should / must_not conditions)"
        });
    }
    for (field, condition) in options.typed_filters() {
        let item = json!({"type": field.field_type.json_type()});
        let mut schema = if condition.is_list() {
            json!({"type": "array", "items": item})
        } else {
            item
        };
        schema["description"] = json!(field.description);
        search_props[field.name.as_str()] = schema;
        if field.required {
            search_required.push(field.name.as_str());
        }
    }

    let mut tools = vec![json!({
        "name": SEARCH_NOTES,
        "description": options.descriptions.search_notes,
        "inputSchema": {
            "type": "object",
            "properties": search_props,
            "required": search_required
        }
    })];

    if options.read_only {
        return tools;
    }

    tools.push(json!({
        "name": ADD_NOTE,
        "description": options.descriptions.add_note,
        "inputSchema": {
            "type": "object",
            "properties": note_properties(),
            "required": NOTE_REQUIRED
        }
    }));

    let mut update_props = note_properties();
    update_props.insert(
        "note_id".to_string(),
        json!({"type": "string", "description": "The unique identifier of the note to update"}),
    );
    let mut update_required = vec!["note_id"];
    update_required.extend(NOTE_REQUIRED);
    tools.push(json!({
        "name": UPDATE_NOTE,
        "description": options.descriptions.update_note,
        "inputSchema": {
            "type": "object",
            "properties": update_props,
            "required": update_required
        }
    }));

    tools.push(json!({
        "name": DELETE_NOTE,
        "description": options.descriptions.delete_note,
        "inputSchema": {
            "type": "object",
            "properties": {
                "note_id": {"type": "string", "description": "The unique identifier of the note to delete"}
            },
            "required": ["note_id"]
        }
    }));

    tools
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::NoteType;
    use chrono::DateTime;

    fn options() -> ToolOptions {
        ToolOptions {
            descriptions: ToolDescriptions::default(),
            expose_collection: false,
            allow_filter: false,
            read_only: false,
            search_limit: 10,
            filterable_fields: Vec::new(),
        }
    }

    fn field(name: &str, field_type: FieldType, condition: Option<FilterCondition>, required: bool) -> FilterableField {
        FilterableField {
            name: name.to_string(),
            description: format!("Filter on {}", name),
            field_type,
            condition,
            required,
        }
    }

    fn with_fields() -> ToolOptions {
        let mut opts = options();
        opts.allow_filter = true;
        opts.filterable_fields = vec![
            field("language", FieldType::Keyword, Some(FilterCondition::Eq), false),
            field("stars", FieldType::Integer, Some(FilterCondition::Gte), false),
            field("tags", FieldType::Keyword, Some(FilterCondition::Any), false),
            field("tool", FieldType::Keyword, Some(FilterCondition::Ne), false),
            field("source", FieldType::Keyword, None, false),
        ];
        opts
    }

    fn tool_names(tools: &[Value]) -> Vec<&str> {
        tools.iter().filter_map(|t| t["name"].as_str()).collect()
    }

    #[test]
    fn test_definitions_follow_options() {
        let tools = definitions(&options());
        assert_eq!(tool_names(&tools), vec![SEARCH_NOTES, ADD_NOTE, UPDATE_NOTE, DELETE_NOTE]);
        let search = &tools[0]["inputSchema"]["properties"];
        assert!(search.get("collection_name").is_none());
        assert!(search.get("query_filter").is_none());

        let mut opts = options();
        opts.read_only = true;
        opts.expose_collection = true;
        opts.allow_filter = true;
        let tools = definitions(&opts);
        assert_eq!(tool_names(&tools), vec![SEARCH_NOTES]);
        assert_eq!(tools[0]["inputSchema"]["required"], json!(["query", "collection_name"]));
        assert!(tools[0]["inputSchema"]["properties"].get("query_filter").is_some());
    }

    #[test]
    fn test_search_defaults() {
        let query = search_query(json!({"query": "rebase"}), &options()).unwrap();
        assert_eq!(query.fusion_method, "rrf");
        assert_eq!((query.dense_limit, query.sparse_limit, query.final_limit), (20, 20, 10));
        assert!(query.collection.is_none());
        assert!(query.filter.is_none());
    }

    #[test]
    fn test_search_rejects_bad_limits_and_filters() {
        let err = search_query(json!({"query": "q", "final_limit": 0}), &options()).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
        let err = search_query(json!({"query": "q", "dense_limit": -4}), &options()).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
        let err = search_query(json!({"query": "q", "query_filter": {"must": []}}), &options()).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
        let err = search_query(json!({}), &options()).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }

    #[test]
    fn test_search_collection_only_when_exposed() {
        let args = json!({"query": "q", "collection_name": "other"});
        assert!(search_query(args.clone(), &options()).unwrap().collection.is_none());

        let mut opts = options();
        opts.expose_collection = true;
        assert_eq!(search_query(args, &opts).unwrap().collection.as_deref(), Some("other"));
    }

    #[test]
    fn test_typed_field_arguments_in_schema() {
        let mut opts = with_fields();
        opts.filterable_fields[0].required = true;
        let tools = definitions(&opts);
        let schema = &tools[0]["inputSchema"];

        assert_eq!(schema["properties"]["language"]["type"], json!("string"));
        assert_eq!(schema["properties"]["stars"]["type"], json!("integer"));
        assert_eq!(schema["properties"]["tags"]["type"], json!("array"));
        assert_eq!(schema["properties"]["tags"]["items"]["type"], json!("string"));
        assert_eq!(schema["properties"]["language"]["description"], json!("Filter on language"));
        // Indexed only, no condition
        assert!(schema["properties"].get("source").is_none());
        // Typed arguments replace the raw filter
        assert!(schema["properties"].get("query_filter").is_none());
        assert_eq!(schema["required"], json!(["query", "language"]));
    }

    #[test]
    fn test_typed_field_arguments_build_filter() {
        let query = search_query(
            json!({"query": "q", "language": "rust", "stars": 3, "tags": ["git", "cli"], "tool": "cargo"}),
            &with_fields(),
        )
        .unwrap();
        let filter = query.filter.unwrap();
        assert_eq!(
            *filter.as_json(),
            json!({"must": [
                {"key": "metadata.language", "match": {"value": "rust"}},
                {"key": "metadata.stars", "range": {"gte": 3}},
                {"key": "metadata.tags", "match": {"any": ["git", "cli"]}},
                {"must_not": [{"key": "metadata.tool", "match": {"value": "cargo"}}]}
            ]})
        );

        let query = search_query(json!({"query": "q"}), &with_fields()).unwrap();
        assert!(query.filter.is_none());
    }

    #[test]
    fn test_typed_field_arguments_are_checked() {
        let opts = with_fields();
        for bad in [
            json!({"query": "q", "stars": "three"}),
            json!({"query": "q", "stars": 2.5}),
            json!({"query": "q", "tags": "git"}),
            json!({"query": "q", "tags": [1]}),
            json!({"query": "q", "query_filter": {"must": []}}),
        ] {
            let err = search_query(bad.clone(), &opts).unwrap_err();
            assert_eq!(err.kind(), "InvalidArgument", "{} should be rejected", bad);
        }

        let mut opts = with_fields();
        opts.filterable_fields[1].required = true;
        let err = search_query(json!({"query": "q"}), &opts).unwrap_err();
        assert!(err.to_string().contains("stars is required"));
    }

    #[test]
    fn test_update_args_flatten_note_fields() {
        let (id, draft) = update_args(json!({
            "note_id": "n1",
            "text": "t",
            "context": "c",
            "type": "api",
            "created_at": "2024-01-01T00:00:00Z",
            "tags": ["x"]
        }))
        .unwrap();
        assert_eq!(id, "n1");
        assert_eq!(draft.note_type, "api");
        assert_eq!(draft.tags, Some(vec!["x".to_string()]));

        assert_eq!(delete_args(json!({})).unwrap_err().kind(), "InvalidArgument");
    }

    #[test]
    fn test_entry_and_messages() {
        let note = Note {
            note_id: "n1".into(),
            text: "a".repeat(60),
            context: "ctx".into(),
            note_type: NoteType::Snippet,
            created_at: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z").unwrap(),
            tool: None,
            tags: None,
            language: Some("rust".into()),
            source: None,
        };

        let entry = format_entry(&note);
        assert!(entry.starts_with("<entry><id>n1</id><content>aaa"));
        assert!(entry.contains(r#""language":"rust""#));
        assert!(entry.ends_with("</metadata></entry>"));

        assert_eq!(
            added_message(&note),
            format!("Note added: {}... (type: snippet, id: n1)", "a".repeat(50))
        );
        assert!(updated_message(&note).starts_with("Note updated: "));
        assert_eq!(deleted_message("n1"), "Note deleted: n1");
    }
}
