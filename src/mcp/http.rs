//! Streamable HTTP transport - blocking microserver (no async/tokio)
//!
//! Routes:
//! - `POST /mcp` - one JSON-RPC message per request
//! - `GET /health` - liveness and server version
//!
//! One request per connection, thread per connection. Chunked bodies are
//! rejected; the body is read through `Read::take` so Content-Length is never
//! trusted for size. Header cap 32 KiB, body cap 1 MiB.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener};
use std::sync::Arc;

use super::server::ToolServer;

const MAX_HEADER_SIZE: usize = 32 * 1024;
const MAX_BODY_SIZE: usize = 1_048_576;

#[derive(Debug)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Header value by name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    fn json(status: u16, value: &impl Serialize) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: serde_json::to_vec(value).unwrap_or_default(),
        }
    }

    /// 202 for notifications, which get no JSON-RPC response
    fn accepted() -> Self {
        Self {
            status: 202,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        202 => "Accepted",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        413 => "Payload Too Large",
        _ => "Internal Server Error",
    }
}

fn json_error(status: u16, message: &str) -> HttpResponse {
    HttpResponse::json(status, &serde_json::json!({ "error": message }))
}

fn with_security_headers(response: HttpResponse) -> HttpResponse {
    response
        .with_header("X-Content-Type-Options", "nosniff")
        .with_header("X-Frame-Options", "DENY")
}

/// Read one request; None when the peer closed before sending anything
pub fn read_request(stream: &mut impl Read) -> Option<std::result::Result<HttpRequest, String>> {
    let mut head = Vec::with_capacity(1024);
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte) {
            Ok(0) if head.is_empty() => return None,
            Ok(0) => return Some(Err("Connection closed mid-request".to_string())),
            Ok(_) => {
                head.push(byte[0]);
                if head.len() > MAX_HEADER_SIZE {
                    return Some(Err("Headers too large".to_string()));
                }
            }
            Err(_) if head.is_empty() => return None,
            Err(e) => return Some(Err(format!("Read error: {}", e))),
        }
    }

    let mut slots = [httparse::EMPTY_HEADER; 64];
    let mut parsed = httparse::Request::new(&mut slots);
    match parsed.parse(&head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => return Some(Err("Incomplete HTTP request".to_string())),
        Err(e) => return Some(Err(format!("HTTP parse error: {}", e))),
    }

    let method = parsed.method.unwrap_or("").to_string();
    let path = parsed.path.unwrap_or("/").to_string();
    let headers: Vec<(String, String)> = parsed
        .headers
        .iter()
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).to_string()))
        .collect();

    let mut request = HttpRequest {
        method,
        path,
        headers,
        body: Vec::new(),
    };

    if request
        .header("Transfer-Encoding")
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false)
    {
        return Some(Err("Chunked transfer encoding not supported".to_string()));
    }

    if request.method == "POST" {
        let Some(len) = request.header("Content-Length").and_then(|v| v.trim().parse::<usize>().ok()) else {
            return Some(Err("POST requires Content-Length".to_string()));
        };
        if len > MAX_BODY_SIZE {
            return Some(Err("Request body too large".to_string()));
        }
        let mut body = Vec::with_capacity(len);
        if let Err(e) = stream.take(len as u64).read_to_end(&mut body) {
            return Some(Err(format!("Read error: {}", e)));
        }
        request.body = body;
    }

    Some(Ok(request))
}

pub fn write_response(stream: &mut impl Write, response: &HttpResponse) {
    let mut head = format!("HTTP/1.1 {} {}\r\n", response.status, reason(response.status));
    head.push_str(&format!("Content-Length: {}\r\nConnection: close\r\n", response.body.len()));
    for (name, value) in &response.headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("\r\n");

    // Client may have disconnected
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&response.body);
    let _ = stream.flush();
}

/// Bearer token check; open when no token is configured
fn authorized(request: &HttpRequest, token: Option<&str>) -> bool {
    match token {
        None => true,
        Some(token) => request
            .header("Authorization")
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|given| given.trim() == token)
            .unwrap_or(false),
    }
}

pub fn route(request: &HttpRequest, server: &ToolServer, token: Option<&str>) -> HttpResponse {
    let path = request.path.split('?').next().unwrap_or("");
    let response = match (request.method.as_str(), path) {
        ("GET", "/health") => HttpResponse::json(
            200,
            &serde_json::json!({
                "status": "ok",
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION")
            }),
        ),
        ("POST", "/mcp") if !authorized(request, token) => json_error(401, "Unauthorized"),
        ("POST", "/mcp") => match std::str::from_utf8(&request.body) {
            Ok(body) if !body.trim().is_empty() => match server.handle_message(body) {
                Some(reply) => HttpResponse::json(200, &reply),
                None => HttpResponse::accepted(),
            },
            Ok(_) => json_error(400, "Missing request body"),
            Err(_) => json_error(400, "Request body is not UTF-8"),
        },
        _ => json_error(404, "Not found"),
    };
    with_security_headers(response)
}

fn handle_connection(stream: &mut (impl Read + Write), server: &ToolServer, token: Option<&str>) {
    let response = match read_request(stream) {
        Some(Ok(request)) => {
            debug!("{} {}", request.method, request.path);
            route(&request, server, token)
        }
        Some(Err(msg)) => {
            let status = if msg.contains("too large") { 413 } else { 400 };
            with_security_headers(json_error(status, &msg))
        }
        None => return,
    };
    write_response(stream, &response);
}

/// Accept connections until the listener fails
pub fn serve(server: Arc<ToolServer>, addr: SocketAddr, token: Option<String>) -> Result<()> {
    let listener = TcpListener::bind(addr).with_context(|| format!("Failed to bind {}", addr))?;
    if token.is_none() && !addr.ip().is_loopback() {
        warn!("Listening on {} without MCP_HTTP_TOKEN; any client can write notes", addr);
    }
    info!("MCP server listening on http://{}/mcp", addr);

    let token: Arc<Option<String>> = Arc::new(token);
    for stream in listener.incoming() {
        match stream {
            Ok(mut stream) => {
                let server = Arc::clone(&server);
                let token = Arc::clone(&token);
                std::thread::spawn(move || {
                    handle_connection(&mut stream, &server, token.as_deref());
                    let _ = stream.shutdown(Shutdown::Write);
                });
            }
            Err(e) => warn!("TCP accept error: {}", e),
        }
    }
    Ok(())
}
