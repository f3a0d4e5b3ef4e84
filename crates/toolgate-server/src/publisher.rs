use std::sync::Arc;

use serde_json::Value;
use tokio::net::TcpListener;

use toolgate_core::{Error, SharedTool, Toolset};
use toolgate_mcp::jsonrpc::{
    INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, TOOL_EXECUTION_ERROR,
};
use toolgate_mcp::{
    methods, CallToolParams, CallToolResult, JsonRpcRequest, JsonRpcResponse, ToolDescriptor,
    PROTOCOL_VERSION,
};

use crate::app_state::AppState;
use crate::router::create_router;

/// Publishes local tools over the tool protocol.
///
/// Answers `initialize`, `tools/list`, and `tools/call`. Failures of a tool
/// (including panics) become error envelopes and never take the server down.
pub struct ToolPublisher {
    server_name: String,
    server_version: String,
    toolset: Toolset,
}

impl ToolPublisher {
    /// Publish every tool of `toolset`, reporting the toolset name as the
    /// server name.
    #[must_use]
    pub fn new(toolset: Toolset) -> Self {
        Self {
            server_name: toolset.name().to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            toolset,
        }
    }

    #[must_use]
    pub fn with_server_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.server_name = name.into();
        self.server_version = version.into();
        self
    }

    /// Add (or replace) a published tool.
    pub fn register(&mut self, tool: SharedTool) {
        self.toolset.register_tool(tool);
    }

    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Wire descriptors of all published tools, schemas derived from each
    /// tool's contract.
    #[must_use]
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.toolset
            .tools()
            .iter()
            .map(|tool| ToolDescriptor::from_tool(tool.as_ref()))
            .collect()
    }

    /// Answer one request. Notifications get no response.
    pub async fn dispatch(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            tracing::debug!(method = %request.method, "Received notification");
            return None;
        }

        let id = request.id.clone();
        let response = match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(id),
            methods::TOOLS_LIST => {
                JsonRpcResponse::success(id, serde_json::json!({ "tools": self.descriptors() }))
            }
            methods::TOOLS_CALL => self.handle_tools_call(id, request.params).await,
            other => {
                tracing::debug!(method = other, "Unknown method");
                JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {other}"))
            }
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": self.server_name,
                    "version": self.server_version
                }
            }),
        )
    }

    async fn handle_tools_call(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing params");
        };

        let params: CallToolParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid params: {e}"))
            }
        };

        let Ok(tool) = self.toolset.get_tool(&params.name) else {
            return JsonRpcResponse::error(
                id,
                INVALID_PARAMS,
                format!("Unknown tool: {}", params.name),
            );
        };

        // Run on its own task so a panicking tool only fails this call.
        let tool = Arc::clone(tool);
        let arguments = params.arguments;
        let outcome = tokio::spawn(async move { tool.invoke(arguments).await }).await;

        match outcome {
            Ok(Ok(value)) => JsonRpcResponse::success(
                id,
                serde_json::to_value(CallToolResult::from_value(&value)).unwrap_or_default(),
            ),
            Ok(Err(Error::InvalidArguments(message))) => {
                JsonRpcResponse::error(id, INVALID_PARAMS, message)
            }
            Ok(Err(err)) => {
                tracing::warn!(tool = %params.name, "Tool failed: {err}");
                let message = match err {
                    Error::LocalExecution(message) => message,
                    other => other.to_string(),
                };
                JsonRpcResponse::error(id, TOOL_EXECUTION_ERROR, message)
            }
            Err(join_error) => {
                tracing::error!(tool = %params.name, "Tool task aborted: {join_error}");
                JsonRpcResponse::error(
                    id,
                    TOOL_EXECUTION_ERROR,
                    format!("Tool '{}' panicked", params.name),
                )
            }
        }
    }
}

/// Parse a request body into an envelope, or the error envelope to answer
/// with.
///
/// # Errors
///
/// Returns a `-32700` response for non-JSON bodies and `-32600` for JSON
/// that is not a request.
pub fn parse_request(body: &[u8]) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| JsonRpcResponse::error(Value::Null, PARSE_ERROR, format!("Parse error: {e}")))?;

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    serde_json::from_value(value)
        .map_err(|e| JsonRpcResponse::error(id, INVALID_REQUEST, format!("Invalid request: {e}")))
}

/// Serve `publisher` on an already bound listener until the server stops.
///
/// # Errors
///
/// Returns [`Error::Transport`] if the server fails.
pub async fn serve(listener: TcpListener, publisher: ToolPublisher) -> Result<(), Error> {
    let addr = listener
        .local_addr()
        .map_err(|e| Error::Transport(e.to_string()))?;
    tracing::info!(
        server = %publisher.server_name(),
        tools = publisher.descriptors().len(),
        "Tool server listening on {addr}"
    );

    let app = create_router(AppState::new(publisher));
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Transport(format!("server error: {e}")))
}

/// Publish `toolset` on `host:port`.
///
/// # Errors
///
/// Returns [`Error::Transport`] if the address cannot be bound or the
/// server fails.
pub async fn publish(toolset: Toolset, host: &str, port: u16) -> Result<(), Error> {
    let listener = TcpListener::bind((host, port))
        .await
        .map_err(|e| Error::Transport(format!("failed to bind {host}:{port}: {e}")))?;
    serve(listener, ToolPublisher::new(toolset)).await
}
