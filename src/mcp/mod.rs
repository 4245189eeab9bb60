//! MCP (Model Context Protocol) server
//!
//! JSON-RPC 2.0 over stdio or HTTP. No external SDK - blocking I/O.
//!
//! Public interface:
//! - `ToolServer` - tool catalogue and dispatch, shared by both transports
//! - `run_stdio` - newline-delimited messages on stdin/stdout
//! - `http::serve` - thread-per-connection HTTP microserver

pub mod http;
mod protocol;
mod server;
mod tools;

pub use protocol::{Request, Response};
pub use server::{run_stdio, ToolServer};
pub use tools::{ToolOptions, ADD_NOTE, DELETE_NOTE, SEARCH_NOTES, UPDATE_NOTE};
