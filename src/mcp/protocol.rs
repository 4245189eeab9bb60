//! JSON-RPC 2.0 protocol types for MCP

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::NotesError;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const NOT_FOUND: i32 = -32001;
pub const READ_ONLY: i32 = -32002;

#[derive(Debug, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    /// Requests without an id are notifications and get no response
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
}

#[derive(Debug, Serialize)]
pub struct Error {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: &str) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(Error {
                code,
                message: message.to_string(),
                data: None,
            }),
        }
    }

    /// Structured failure carrying the error kind
    pub fn failure(id: Option<Value>, err: &NotesError) -> Self {
        let code = match err {
            NotesError::InvalidArgument(_) | NotesError::InvalidNoteType(_) => INVALID_PARAMS,
            NotesError::NotFound(_) => NOT_FOUND,
            NotesError::ReadOnly => READ_ONLY,
            _ => INTERNAL_ERROR,
        };
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(Error {
                code,
                message: err.to_string(),
                data: Some(serde_json::json!({ "kind": err.kind() })),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_codes_and_kind() {
        let resp = Response::failure(Some(json!(7)), &NotesError::NotFound("abc".into()));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["id"], json!(7));
        assert_eq!(value["error"]["code"], json!(NOT_FOUND));
        assert_eq!(value["error"]["data"]["kind"], json!("NotFound"));
        assert!(value.get("result").is_none());

        let resp = Response::failure(None, &NotesError::unavailable("connection refused"));
        assert_eq!(resp.error.unwrap().code, INTERNAL_ERROR);

        let resp = Response::failure(None, &NotesError::ReadOnly);
        assert_eq!(resp.error.unwrap().code, READ_ONLY);
    }

    #[test]
    fn test_plain_error_has_no_data() {
        let value = serde_json::to_value(Response::error(None, METHOD_NOT_FOUND, "Method not found")).unwrap();
        assert!(value["error"].get("data").is_none());
        assert!(value.get("id").is_none());
    }
}
