//! MCP server
//!
//! Request handling is transport-agnostic; [`McpServer::serve`] implements
//! the newline-delimited stdio transport. Each request runs as its own task
//! so slow remote calls overlap, and a single writer task owns the output
//! stream so responses never interleave.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::dispatch::ToolDispatcher;
use crate::fleet::FleetConnector;
use crate::session::SessionState;

use super::error::McpError;
use super::handlers::{execute, ToolParams};
use super::protocol::{
    InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolsListResult,
};
use super::tools::get_tool_definitions;

pub struct McpServer<C: FleetConnector> {
    dispatcher: ToolDispatcher<C>,
    initialized: AtomicBool,
}

impl<C: FleetConnector> McpServer<C> {
    pub fn new(dispatcher: ToolDispatcher<C>) -> Self {
        Self {
            dispatcher,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Lifecycle state of the remote session, for health reporting
    pub fn session_state(&self) -> SessionState {
        self.dispatcher.sessions().state()
    }

    pub fn idle_workers(&self) -> usize {
        self.dispatcher.bridge().idle_workers()
    }

    /// Serve newline-delimited JSON-RPC until `reader` hits EOF
    ///
    /// Requests still in flight at EOF are allowed to finish and their
    /// responses are flushed before returning.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> Result<(), McpError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        info!("MCP stdio transport starting");

        let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
        let writer_task = tokio::spawn(write_responses(rx, writer));

        let mut lines = reader.lines();
        let mut in_flight = JoinSet::new();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }

            let server = Arc::clone(&self);
            let tx = tx.clone();
            in_flight.spawn(async move {
                if let Some(response) = server.handle_line(&line).await {
                    // Receiver only drops if the writer failed
                    let _ = tx.send(response);
                }
            });

            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "Request task failed");
                }
            }
        }

        debug!(pending = in_flight.len(), "Input closed, draining in-flight requests");
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Request task failed");
            }
        }

        drop(tx);
        let written = writer_task
            .await
            .map_err(|e| McpError::Internal(format!("writer task failed: {}", e)))?;

        info!("MCP stdio transport shutting down");
        written
    }

    /// Handle one raw message; `None` when no response is owed
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        debug!("Received: {}", line);

        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    serde_json::Value::Null,
                    JsonRpcError::new(JsonRpcError::PARSE_ERROR, e.to_string()),
                ));
            }
        };

        self.handle_request(request).await
    }

    /// Handle a parsed JSON-RPC request
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::with_data(
                    JsonRpcError::INVALID_REQUEST,
                    "Invalid JSON-RPC version",
                    serde_json::json!({"expected": "2.0", "got": request.jsonrpc}),
                ),
            ));
        }

        let started = Instant::now();
        let notification = request.is_notification();

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(),
            "notifications/initialized" | "initialized" => Ok(serde_json::json!({})),
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(&request.params).await,
            _ => Err(McpError::MethodNotFound(request.method.clone())),
        };

        debug!(
            method = %request.method,
            id = %request.id,
            elapsed = ?started.elapsed(),
            "Handled request"
        );

        if notification {
            if let Err(e) = result {
                warn!(method = %request.method, error = %e, "Notification failed");
            }
            return None;
        }

        Some(match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(e) => JsonRpcResponse::error(request.id, e.into()),
        })
    }

    fn handle_initialize(&self) -> Result<serde_json::Value, McpError> {
        self.initialized.store(true, Ordering::SeqCst);
        info!("MCP client initialized");

        serde_json::to_value(InitializeResult::default()).map_err(|e| McpError::Internal(e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<serde_json::Value, McpError> {
        let result = ToolsListResult {
            tools: get_tool_definitions(),
        };
        serde_json::to_value(result).map_err(|e| McpError::Internal(e.to_string()))
    }

    async fn handle_tools_call(&self, params: &serde_json::Value) -> Result<serde_json::Value, McpError> {
        let name = params["name"]
            .as_str()
            .ok_or_else(|| McpError::InvalidParams("Missing 'name' parameter".into()))?;

        let arguments = &params["arguments"];
        debug!("Tool call: {} with args: {}", name, arguments);

        let params = ToolParams::parse(name, arguments)?;
        let result = execute(&self.dispatcher, params).await;

        serde_json::to_value(result).map_err(|e| McpError::Internal(e.to_string()))
    }
}

async fn write_responses<W>(
    mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
    mut writer: W,
) -> Result<(), McpError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut json = serde_json::to_string(&response)?;
        debug!("Sending: {}", json);
        json.push('\n');
        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::AsyncReadExt;

    use crate::blocking::BlockingBridge;
    use crate::fleet::ExecOutcome;
    use crate::session::SessionManager;
    use crate::testing::{ios_xe_device, test_credentials, FakeConnector, FakeFleet};

    fn server(fleet: &FakeFleet) -> Arc<McpServer<FakeConnector>> {
        let bridge = BlockingBridge::new(4, Duration::from_secs(5));
        let sessions = Arc::new(SessionManager::new(
            fleet.connector(),
            test_credentials(),
            bridge.clone(),
        ));
        Arc::new(McpServer::new(ToolDispatcher::new(sessions, bridge)))
    }

    fn lab_fleet() -> FakeFleet {
        FakeFleet::new()
            .with_device(ios_xe_device("p0-2e", "10.48.172.59"))
            .with_device(ios_xe_device("p1-2e", "10.48.172.60"))
    }

    fn call(id: u64, name: &str, arguments: serde_json::Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: serde_json::json!(id),
            method: "tools/call".into(),
            params: serde_json::json!({"name": name, "arguments": arguments}),
        }
    }

    async fn run_transcript(server: Arc<McpServer<FakeConnector>>, input: &str) -> Vec<serde_json::Value> {
        let (writer, mut reader) = tokio::io::duplex(64 * 1024);
        server.serve(input.as_bytes(), writer).await.unwrap();

        let mut output = String::new();
        reader.read_to_string(&mut output).await.unwrap();
        output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_initialize() {
        let server = server(&lab_fleet());
        let request = JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: serde_json::json!(1),
            method: "initialize".into(),
            params: serde_json::json!({}),
        };

        let response = server.handle_request(request).await.unwrap();
        let result = response.result.unwrap();

        assert!(server.is_initialized());
        assert_eq!(result["serverInfo"]["name"], "RADKitMCP");
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_tools_list() {
        let server = server(&lab_fleet());
        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
            .await
            .unwrap();

        let result = response.result.unwrap();
        let names: Vec<&str> = result["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "get_device_inventory_names",
                "get_device_attributes",
                "exec_cli_commands_in_device"
            ]
        );
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let server = server(&lab_fleet());
        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_parse_error_and_bad_version() {
        let server = server(&lab_fleet());

        let response = server.handle_line("{not json").await.unwrap();
        assert_eq!(response.error.unwrap().code, JsonRpcError::PARSE_ERROR);

        let response = server
            .handle_line(r#"{"jsonrpc":"1.0","id":3,"method":"ping"}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, JsonRpcError::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_method_and_tool() {
        let server = server(&lab_fleet());

        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","id":4,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, JsonRpcError::METHOD_NOT_FOUND);

        let response = server
            .handle_request(call(5, "reboot_device", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, JsonRpcError::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_tool_failure_is_error_result() {
        let fleet = lab_fleet();
        let server = server(&fleet);

        let response = server
            .handle_request(call(
                6,
                "get_device_attributes",
                serde_json::json!({"target_device": "ghost"}),
            ))
            .await
            .unwrap();

        assert!(response.error.is_none());
        let result = response.result.unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"][0]["text"], "Device not found in inventory: ghost");
    }

    #[tokio::test]
    async fn test_exec_tool_call() {
        let fleet = lab_fleet().with_exec("p0-2e", ExecOutcome::Single("p0-2E#show clock".into()));
        let server = server(&fleet);

        let response = server
            .handle_request(call(
                7,
                "exec_cli_commands_in_device",
                serde_json::json!({"target_device": "p0-2e", "cli_commands": ["show clock"]}),
            ))
            .await
            .unwrap();

        let result = response.result.unwrap();
        assert!(result.get("isError").is_none());
        assert_eq!(result["content"][0]["text"], "p0-2E#show clock");
    }

    #[tokio::test]
    async fn test_serve_transcript() {
        let fleet = lab_fleet();
        let server = server(&fleet);
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"get_device_attributes","arguments":{"target_device":"p0-2e"}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"get_device_attributes","arguments":{"target_device":"p1-2e"}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":4,"method":"ping"}"#,
            "\n",
        );

        let responses = run_transcript(Arc::clone(&server), input).await;

        let mut ids: Vec<u64> = responses.iter().map(|r| r["id"].as_u64().unwrap()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4]);

        let p1 = responses.iter().find(|r| r["id"] == 3).unwrap();
        let record: serde_json::Value =
            serde_json::from_str(p1["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(record["host"], "10.48.172.60");

        assert_eq!(fleet.connects(), 1);
        assert_eq!(server.session_state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_serve_empty_input_never_connects() {
        let fleet = lab_fleet();
        let responses = run_transcript(server(&fleet), "").await;

        assert!(responses.is_empty());
        assert_eq!(fleet.connects(), 0);
    }
}
