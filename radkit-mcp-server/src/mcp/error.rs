//! MCP error types

use std::io;

use super::protocol::JsonRpcError;

/// Protocol-level failures; tool execution failures travel as
/// [`super::protocol::ToolResult::error`] instead
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// IO error on the transport
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<McpError> for JsonRpcError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::MethodNotFound(method) => JsonRpcError::new(
                JsonRpcError::METHOD_NOT_FOUND,
                format!("Method not found: {}", method),
            ),
            McpError::InvalidParams(msg) => JsonRpcError::new(JsonRpcError::INVALID_PARAMS, msg),
            McpError::UnknownTool(name) => JsonRpcError::new(
                JsonRpcError::INVALID_PARAMS,
                format!("Unknown tool: {}", name),
            ),
            McpError::Io(err) => {
                JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, format!("IO error: {}", err))
            }
            McpError::Json(err) => {
                JsonRpcError::new(JsonRpcError::PARSE_ERROR, format!("JSON error: {}", err))
            }
            McpError::Internal(msg) => JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, msg),
        }
    }
}
