//! MCP tool handlers
//!
//! Parses tool arguments and runs them against the [`ToolDispatcher`].

use tracing::debug;

use crate::dispatch::{render_attributes, render_names, ToolDispatcher};
use crate::fleet::{FleetConnector, FleetError};

use super::error::McpError;
use super::protocol::ToolResult;
use super::tools::{is_known_tool, DEVICE_ATTRIBUTES, EXEC_CLI_COMMANDS, INVENTORY_NAMES};

/// Parsed and validated tool parameters
#[derive(Debug, PartialEq, Eq)]
pub enum ToolParams {
    InventoryNames,
    DeviceAttributes { target_device: String },
    ExecCliCommands {
        target_device: String,
        cli_commands: Vec<String>,
    },
}

impl ToolParams {
    /// Protocol-level validation; unknown tools and malformed arguments are
    /// JSON-RPC errors, not tool results
    pub fn parse(name: &str, arguments: &serde_json::Value) -> Result<Self, McpError> {
        if !is_known_tool(name) {
            return Err(McpError::UnknownTool(name.into()));
        }

        match name {
            INVENTORY_NAMES => Ok(Self::InventoryNames),
            DEVICE_ATTRIBUTES => Ok(Self::DeviceAttributes {
                target_device: parse_string(arguments, "target_device")?,
            }),
            EXEC_CLI_COMMANDS => Ok(Self::ExecCliCommands {
                target_device: parse_string(arguments, "target_device")?,
                cli_commands: parse_string_list(arguments, "cli_commands")?,
            }),
            _ => Err(McpError::UnknownTool(name.into())),
        }
    }
}

/// Run a tool; execution failures become `isError` results
pub async fn execute<C: FleetConnector>(
    dispatcher: &ToolDispatcher<C>,
    params: ToolParams,
) -> ToolResult {
    let result = match params {
        ToolParams::InventoryNames => dispatcher
            .list_inventory_names()
            .await
            .map(|names| render_names(&names)),
        ToolParams::DeviceAttributes { target_device } => dispatcher
            .get_device_attributes(&target_device)
            .await
            .and_then(|record| render_attributes(&record)),
        ToolParams::ExecCliCommands {
            target_device,
            cli_commands,
        } => dispatcher
            .exec_commands(&target_device, cli_commands)
            .await,
    };

    match result {
        Ok(text) => ToolResult::text(text),
        Err(e) => {
            debug!(kind = e.kind(), error = %e, "Tool call failed");
            ToolResult::error(failure_text(&e))
        }
    }
}

fn failure_text(err: &FleetError) -> String {
    if err.is_retryable() {
        format!("{}. The call may be retried.", err)
    } else {
        err.to_string()
    }
}

fn parse_string(arguments: &serde_json::Value, field: &str) -> Result<String, McpError> {
    arguments[field]
        .as_str()
        .map(String::from)
        .ok_or_else(|| McpError::InvalidParams(format!("Missing '{}' parameter", field)))
}

fn parse_string_list(arguments: &serde_json::Value, field: &str) -> Result<Vec<String>, McpError> {
    let items = arguments[field]
        .as_array()
        .ok_or_else(|| McpError::InvalidParams(format!("'{}' must be a list of strings", field)))?;

    items
        .iter()
        .map(|item| {
            item.as_str().map(String::from).ok_or_else(|| {
                McpError::InvalidParams(format!("'{}' must contain only strings", field))
            })
        })
        .collect()
}
