//! JSON-RPC surface: tool listing, tool calls, error mapping, HTTP routing

mod common;

use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use common::MockProvider;
use qdrant_notes::config::Settings;
use qdrant_notes::mcp::http::{route, HttpRequest};
use qdrant_notes::mcp::{run_stdio, ToolServer, ADD_NOTE, DELETE_NOTE, SEARCH_NOTES, UPDATE_NOTE};
use qdrant_notes::store::LocalStore;

fn settings(extra: &[(&str, &str)]) -> Settings {
    let mut env: HashMap<String, String> = HashMap::new();
    env.insert("QDRANT_LOCAL_PATH".into(), "/tmp/unused.sqlite".into());
    env.insert("COLLECTION_NAME".into(), "notes".into());
    for (k, v) in extra {
        env.insert(k.to_string(), v.to_string());
    }
    Settings::from_lookup(|key| env.get(key).cloned()).unwrap()
}

fn server(extra: &[(&str, &str)]) -> ToolServer {
    server_with(extra, Arc::new(MockProvider::hybrid()))
}

fn server_with(extra: &[(&str, &str)], provider: Arc<MockProvider>) -> ToolServer {
    let store = Arc::new(LocalStore::open_in_memory().unwrap());
    ToolServer::from_settings(&settings(extra), store, provider)
}

fn call(server: &ToolServer, id: i64, method: &str, params: Value) -> Value {
    let request = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
    let response = server.handle_message(&request.to_string()).unwrap();
    serde_json::to_value(&response).unwrap()
}

fn call_tool(server: &ToolServer, name: &str, arguments: Value) -> Value {
    call(server, 1, "tools/call", json!({"name": name, "arguments": arguments}))
}

fn texts(response: &Value) -> Vec<String> {
    response["result"]["content"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["text"].as_str().unwrap().to_string())
        .collect()
}

fn note_args(text: &str) -> Value {
    json!({
        "text": text,
        "context": "shell history",
        "type": "cli",
        "created_at": "2024-02-10T08:00:00Z",
        "tags": ["git"]
    })
}

/// Id echoed in "Note added: ... (type: cli, id: <id>)"
fn added_id(response: &Value) -> String {
    let text = &texts(response)[0];
    let start = text.rfind("id: ").unwrap() + 4;
    text[start..text.len() - 1].to_string()
}

#[test]
fn test_initialize_and_list_tools() {
    let server = server(&[]);

    let init = call(&server, 1, "initialize", json!({}));
    assert_eq!(init["result"]["protocolVersion"], json!("2024-11-05"));
    assert_eq!(init["result"]["serverInfo"]["name"], json!("qdrant-notes"));

    let list = call(&server, 2, "tools/list", json!({}));
    let names: Vec<&str> = list["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec![SEARCH_NOTES, ADD_NOTE, UPDATE_NOTE, DELETE_NOTE]);
}

#[test]
fn test_read_only_lists_search_only_and_refuses_writes() {
    let server = server(&[("QDRANT_READ_ONLY", "true")]);

    let list = call(&server, 1, "tools/list", json!({}));
    assert_eq!(list["result"]["tools"].as_array().unwrap().len(), 1);

    let resp = call_tool(&server, ADD_NOTE, note_args("git status"));
    assert_eq!(resp["error"]["code"], json!(-32002));
    assert_eq!(resp["error"]["data"]["kind"], json!("ReadOnly"));
}

#[test]
fn test_note_round_trip_through_tools() {
    let server = server(&[]);

    let added = call_tool(&server, ADD_NOTE, note_args("git stash pop restores stashed changes"));
    assert!(texts(&added)[0].starts_with("Note added: git stash pop"));
    let id = added_id(&added);

    let found = call_tool(&server, SEARCH_NOTES, json!({"query": "stash"}));
    let lines = texts(&found);
    assert_eq!(lines[0], "Hybrid search results for 'stash' (fusion: rrf)");
    assert!(lines[1].contains(&format!("<id>{}</id>", id)));
    assert!(lines[1].contains("<content>git stash pop restores stashed changes</content>"));
    assert!(lines[1].contains(r#""tags":["git"]"#));

    let updated = call_tool(
        &server,
        UPDATE_NOTE,
        json!({
            "note_id": id,
            "text": "git stash apply keeps the stash",
            "context": "shell history",
            "type": "cli",
            "created_at": "2024-02-10T08:00:00Z"
        }),
    );
    assert!(texts(&updated)[0].starts_with("Note updated: git stash apply"));

    let deleted = call_tool(&server, DELETE_NOTE, json!({"note_id": id}));
    assert_eq!(texts(&deleted), vec![format!("Note deleted: {}", id)]);

    let empty = call_tool(&server, SEARCH_NOTES, json!({"query": "stash"}));
    assert_eq!(texts(&empty), vec!["No results for 'stash'".to_string()]);
}

#[test]
fn test_errors_are_structured() {
    let server = server(&[]);

    let resp = call_tool(&server, UPDATE_NOTE, {
        let mut args = note_args("x");
        args["note_id"] = json!("nope");
        args
    });
    assert_eq!(resp["error"]["code"], json!(-32001));
    assert_eq!(resp["error"]["data"]["kind"], json!("NotFound"));
    assert!(resp.get("result").is_none());

    let resp = call_tool(&server, SEARCH_NOTES, json!({"query": "x", "fusion_method": "unknown"}));
    assert_eq!(resp["error"]["code"], json!(-32602));
    assert_eq!(resp["error"]["data"]["kind"], json!("InvalidArgument"));

    let resp = call_tool(&server, ADD_NOTE, json!({"text": "x", "context": "y", "type": "memo", "created_at": "2024-01-01"}));
    assert_eq!(resp["error"]["data"]["kind"], json!("InvalidNoteType"));

    let resp = call_tool(&server, "qdrant-store", json!({}));
    assert_eq!(resp["error"]["code"], json!(-32602));

    let resp = call(&server, 9, "resources/list", json!({}));
    assert_eq!(resp["error"]["code"], json!(-32601));

    let resp = serde_json::to_value(server.handle_message("{not json").unwrap()).unwrap();
    assert_eq!(resp["error"]["code"], json!(-32700));
}

#[test]
fn test_malformed_filter_rejected_before_embedding() {
    let provider = Arc::new(MockProvider::hybrid());
    let server = server_with(&[("QDRANT_ALLOW_ARBITRARY_FILTER", "true")], provider.clone());
    call_tool(&server, ADD_NOTE, note_args("git status"));
    let calls_after_add = provider.call_count();

    let resp = call_tool(
        &server,
        SEARCH_NOTES,
        json!({"query": "git", "query_filter": {"must": [{"bogus": 1}]}}),
    );
    assert_eq!(resp["error"]["code"], json!(-32602));
    assert_eq!(resp["error"]["data"]["kind"], json!("InvalidArgument"));
    assert_eq!(provider.call_count(), calls_after_add);

    let resp = call_tool(
        &server,
        SEARCH_NOTES,
        json!({"query": "git", "query_filter": {"must": [{"key": "metadata.type", "match": {"value": "cli"}}]}}),
    );
    assert_eq!(texts(&resp).len(), 2);
}

#[test]
fn test_filterable_fields_narrow_search() {
    let server = server(&[(
        "FILTERABLE_FIELDS",
        r#"[{"name": "language", "description": "Language of the snippet", "field_type": "keyword", "condition": "=="}]"#,
    )]);

    let list = call(&server, 1, "tools/list", json!({}));
    let props = &list["result"]["tools"][0]["inputSchema"]["properties"];
    assert_eq!(props["language"]["type"], json!("string"));

    for (text, language) in [("iterate with map and collect", "rust"), ("iterate with map and list", "python")] {
        let mut args = note_args(text);
        args["type"] = json!("snippet");
        args["language"] = json!(language);
        call_tool(&server, ADD_NOTE, args);
    }

    let all = call_tool(&server, SEARCH_NOTES, json!({"query": "iterate map"}));
    assert_eq!(texts(&all).len(), 3);

    let rust = call_tool(&server, SEARCH_NOTES, json!({"query": "iterate map", "language": "rust"}));
    let lines = texts(&rust);
    assert_eq!(lines.len(), 2);
    assert!(lines[1].contains("<content>iterate with map and collect</content>"));

    let resp = call_tool(&server, SEARCH_NOTES, json!({"query": "iterate map", "language": 3}));
    assert_eq!(resp["error"]["data"]["kind"], json!("InvalidArgument"));
}

#[test]
fn test_padded_note_id_is_rejected() {
    let server = server(&[]);
    let id = added_id(&call_tool(&server, ADD_NOTE, note_args("git log --oneline")));

    let resp = call_tool(&server, DELETE_NOTE, json!({"note_id": format!(" {} ", id)}));
    assert_eq!(resp["error"]["data"]["kind"], json!("InvalidArgument"));

    let deleted = call_tool(&server, DELETE_NOTE, json!({"note_id": id}));
    assert_eq!(texts(&deleted), vec![format!("Note deleted: {}", id)]);
}

#[test]
fn test_notifications_get_no_response() {
    let server = server(&[]);
    let note = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
    assert!(server.handle_message(&note.to_string()).is_none());
}

#[test]
fn test_stdio_loop() {
    let server = server(&[]);
    let input = [
        json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string(),
        String::new(),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}).to_string(),
    ]
    .join("\n");

    let mut output = Vec::new();
    run_stdio(&server, Cursor::new(input), &mut output).unwrap();

    let lines: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["id"], json!(1));
    assert_eq!(lines[1]["id"], json!(2));
}

fn http_request(method: &str, path: &str, auth: Option<&str>, body: &str) -> HttpRequest {
    let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
    if let Some(token) = auth {
        headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
    }
    HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        headers,
        body: body.as_bytes().to_vec(),
    }
}

#[test]
fn test_http_routes() {
    let server = server(&[]);
    let ping = json!({"jsonrpc": "2.0", "id": 5, "method": "ping"}).to_string();

    let health = route(&http_request("GET", "/health", None, ""), &server, Some("t0k"));
    assert_eq!(health.status, 200);

    let denied = route(&http_request("POST", "/mcp", None, &ping), &server, Some("t0k"));
    assert_eq!(denied.status, 401);

    let ok = route(&http_request("POST", "/mcp", Some("t0k"), &ping), &server, Some("t0k"));
    assert_eq!(ok.status, 200);
    let body: Value = serde_json::from_slice(&ok.body).unwrap();
    assert_eq!(body["id"], json!(5));

    let notification = json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();
    let accepted = route(&http_request("POST", "/mcp", None, &notification), &server, None);
    assert_eq!(accepted.status, 202);

    let missing = route(&http_request("GET", "/nope", None, ""), &server, None);
    assert_eq!(missing.status, 404);
}
