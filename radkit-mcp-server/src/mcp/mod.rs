//! MCP protocol surface
//!
//! JSON-RPC 2.0 over newline-delimited stdio, or over HTTP `POST /mcp`.

mod error;
mod handlers;
pub mod http;
pub mod protocol;
mod server;
mod tools;

pub use http::run_http;
pub use server::McpServer;
