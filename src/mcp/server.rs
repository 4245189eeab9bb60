//! MCP server - request dispatch and stdio transport

use anyhow::Result;
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::io::{BufRead, Write};
use std::sync::Arc;

use super::protocol::{Request, Response, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR};
use super::tools::{self, ToolOptions, ADD_NOTE, DELETE_NOTE, SEARCH_NOTES, UPDATE_NOTE};
use crate::config::Settings;
use crate::embeddings::EmbeddingProvider;
use crate::error::NotesError;
use crate::notes::NoteService;
use crate::retrieval::HybridSearcher;
use crate::store::VectorStore;

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Tool dispatcher shared by every transport
pub struct ToolServer {
    searcher: HybridSearcher,
    notes: NoteService,
    options: ToolOptions,
}

impl ToolServer {
    pub fn new(searcher: HybridSearcher, notes: NoteService, options: ToolOptions) -> Self {
        Self {
            searcher,
            notes,
            options,
        }
    }

    /// Wire the searcher and note service over one store and provider
    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let searcher = HybridSearcher::new(
            Arc::clone(&store),
            Arc::clone(&provider),
            settings.collection_name.clone(),
        )
        .with_rrf_k(settings.rrf_k);
        let notes = NoteService::new(store, provider, settings.collection_name.clone(), settings.read_only)
            .with_filterable_fields(&settings.filterable_fields);
        let options = ToolOptions {
            descriptions: settings.tools.clone(),
            expose_collection: settings.collection_name.is_none(),
            allow_filter: settings.allow_arbitrary_filter,
            read_only: settings.read_only,
            search_limit: settings.search_limit,
            filterable_fields: settings.filterable_fields.clone(),
        };

        Self::new(searcher, notes, options)
    }

    /// Handle one raw JSON-RPC message; None for notifications
    pub fn handle_message(&self, raw: &str) -> Option<Response> {
        let request: Request = match serde_json::from_str(raw) {
            Ok(r) => r,
            Err(e) => return Some(Response::error(None, PARSE_ERROR, &format!("Parse error: {}", e))),
        };

        // Validate JSON-RPC version
        if request.jsonrpc != "2.0" {
            return Some(Response::error(
                request.id.clone(),
                INVALID_REQUEST,
                &format!("Invalid JSON-RPC version: expected 2.0, got {}", request.jsonrpc),
            ));
        }

        self.dispatch(&request)
    }

    pub fn dispatch(&self, req: &Request) -> Option<Response> {
        if req.is_notification() {
            debug!("Notification {}", req.method);
            return None;
        }

        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(req),
            "ping" => Response::success(req.id.clone(), json!({})),
            "tools/list" => Response::success(
                req.id.clone(),
                json!({ "tools": tools::definitions(&self.options) }),
            ),
            "tools/call" => self.handle_tool_call(req),
            _ => Response::error(req.id.clone(), METHOD_NOT_FOUND, "Method not found"),
        };
        Some(response)
    }

    fn handle_initialize(&self, req: &Request) -> Response {
        Response::success(
            req.id.clone(),
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                    "hybrid": self.searcher.has_sparse(),
                    "readOnly": self.notes.is_read_only()
                }
            }),
        )
    }

    fn handle_tool_call(&self, req: &Request) -> Response {
        let Some(name) = req.params.get("name").and_then(Value::as_str) else {
            return Response::error(req.id.clone(), INVALID_PARAMS, "Missing tool name");
        };
        let args = req.params.get("arguments").cloned().unwrap_or(Value::Null);
        debug!("tools/call {}", name);

        let outcome = match name {
            SEARCH_NOTES => self.search_notes(args),
            ADD_NOTE => tools::add_args(args)
                .and_then(|draft| self.notes.add_note(draft))
                .map(|note| vec![tools::added_message(&note)]),
            UPDATE_NOTE => tools::update_args(args)
                .and_then(|(id, draft)| self.notes.update_note(&id, draft))
                .map(|note| vec![tools::updated_message(&note)]),
            DELETE_NOTE => tools::delete_args(args).and_then(|id| {
                self.notes.delete_note(&id)?;
                Ok(vec![tools::deleted_message(&id)])
            }),
            _ => {
                return Response::error(req.id.clone(), INVALID_PARAMS, &format!("Unknown tool: {}", name))
            }
        };

        match outcome {
            Ok(lines) => {
                let content: Vec<Value> = lines
                    .into_iter()
                    .map(|text| json!({ "type": "text", "text": text }))
                    .collect();
                Response::success(req.id.clone(), json!({ "content": content }))
            }
            Err(e) => {
                warn!("{} failed: {}", name, e);
                Response::failure(req.id.clone(), &e)
            }
        }
    }

    fn search_notes(&self, args: Value) -> Result<Vec<String>, NotesError> {
        let query = tools::search_query(args, &self.options)?;
        let hits = self.searcher.search(&query)?;
        Ok(tools::search_results(&query, &hits))
    }
}

/// Serve newline-delimited JSON-RPC until the input closes
pub fn run_stdio(server: &ToolServer, input: impl BufRead, mut output: impl Write) -> Result<()> {
    info!("MCP server ready on stdio");

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        if let Some(response) = server.handle_message(&line) {
            writeln!(output, "{}", serde_json::to_string(&response)?)?;
            output.flush()?;
        }
    }

    Ok(())
}
