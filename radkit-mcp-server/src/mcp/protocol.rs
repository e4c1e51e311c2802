//! JSON-RPC and MCP protocol types
//!
//! Implements the JSON-RPC 2.0 message types used by the MCP protocol.

use serde::{Deserialize, Serialize};

/// MCP protocol revision this server speaks
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Name reported in `serverInfo`
pub const SERVER_NAME: &str = "RADKitMCP";

/// JSON-RPC 2.0 request
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID; null or absent for notifications
    #[serde(default)]
    pub id: serde_json::Value,
    /// Method to invoke, e.g. "tools/call"
    pub method: String,
    /// Method parameters; null when the client sends none
    #[serde(default)]
    pub params: serde_json::Value,
}

impl JsonRpcRequest {
    /// Notifications never get a response
    pub fn is_notification(&self) -> bool {
        self.id.is_null()
    }
}

/// JSON-RPC 2.0 response
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// ID echoed from the request being answered
    pub id: serde_json::Value,
    /// Method output; mutually exclusive with `error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Protocol-level failure; mutually exclusive with `result`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Response carrying a result
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Response carrying an error object
    pub fn error(id: serde_json::Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// One of the standard codes below
    pub code: i32,
    /// Short human-readable description
    pub message: String,
    /// Extra structured detail, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    /// Error without extra data
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Error with structured detail attached
    pub fn with_data(code: i32, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// The line was not valid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Valid JSON, but not a request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// No handler for the method
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Missing or malformed parameters, including unknown tool names
    pub const INVALID_PARAMS: i32 = -32602;
    /// Failure inside the server itself
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// MCP tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name, e.g. "get_device_inventory_names"
    pub name: String,
    /// Guidance shown to the model choosing between tools
    pub description: String,
    /// JSON Schema for the tool arguments
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// MCP tool call result
#[derive(Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Content blocks; these tools always return exactly one text block
    pub content: Vec<ToolContent>,
    /// Set only when the tool call failed
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolResult {
    /// Successful result with a single text block
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: None,
        }
    }

    /// Failed result; the message is shown to the model
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: Some(true),
        }
    }

    /// Text of the first content block
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().map(|block| match block {
            ToolContent::Text { text } => text.as_str(),
        })
    }
}

/// Content block kinds
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    /// Plain text
    #[serde(rename = "text")]
    Text {
        /// Rendered tool output or error message
        text: String,
    },
}

/// Capabilities advertised during `initialize`
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Present because this server exposes tools
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ToolsCapability {}),
        }
    }
}

/// Tools capability marker; the tool list never changes at runtime
#[derive(Debug, Serialize, Deserialize)]
pub struct ToolsCapability {}

/// Identity reported in `serverInfo`
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Always [`SERVER_NAME`]
    pub name: String,
    /// Crate version
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Initialize response
#[derive(Debug, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Negotiated protocol revision
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// What the client may call
    pub capabilities: ServerCapabilities,
    /// Who answered
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

impl Default for InitializeResult {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo::default(),
        }
    }
}

/// `tools/list` response
#[derive(Debug, Serialize, Deserialize)]
pub struct ToolsListResult {
    /// Every tool this server exposes
    pub tools: Vec<Tool>,
}
