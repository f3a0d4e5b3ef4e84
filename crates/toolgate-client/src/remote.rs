use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use toolgate_core::{Arguments, Error, SharedTool, Tool, ToolContract, Toolset};
use toolgate_mcp::jsonrpc::TOOL_EXECUTION_ERROR;
use toolgate_mcp::ToolDescriptor;

use crate::client::McpClient;

/// A tool hosted by a remote server, invoked over the client's connection.
pub struct RemoteTool {
    descriptor: ToolDescriptor,
    contract: ToolContract,
    client: Arc<McpClient>,
}

impl RemoteTool {
    pub fn new(descriptor: ToolDescriptor, client: Arc<McpClient>) -> Self {
        let contract = descriptor.contract();
        Self {
            descriptor,
            contract,
            client,
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn description(&self) -> &str {
        &self.descriptor.description
    }

    fn contract(&self) -> &ToolContract {
        &self.contract
    }

    async fn invoke(&self, arguments: Arguments) -> Result<Value, Error> {
        let arguments = self.contract.validate(&arguments)?;
        let result = self
            .client
            .call_tool(&self.descriptor.name, arguments)
            .await?;
        unwrap_tool_result(result)
    }
}

/// Turn a raw `tools/call` result into the value handed to the agent.
///
/// The first content block's `text` is decoded as JSON when possible and
/// returned as a plain string otherwise. Without a usable content list the
/// result object is returned unchanged.
///
/// # Errors
///
/// Returns [`Error::Remote`] when the server flagged the result with
/// `isError`.
pub fn unwrap_tool_result(result: Value) -> Result<Value, Error> {
    let text = result
        .get("content")
        .and_then(Value::as_array)
        .and_then(|content| content.first())
        .and_then(|block| block.get("text"))
        .and_then(Value::as_str);

    let Some(text) = text else {
        return Ok(result);
    };

    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        return Err(Error::Remote {
            code: TOOL_EXECUTION_ERROR,
            message: text.to_string(),
        });
    }

    Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
}

/// Perform the handshake (once) and list the server's tool descriptors.
///
/// # Errors
///
/// Propagates the client's transport, timeout, remote, and protocol errors.
pub async fn discover(client: &McpClient) -> Result<Vec<ToolDescriptor>, Error> {
    client.list_tools().await
}

/// Build a toolset whose tools proxy to the server behind `client`.
///
/// When `description` is `None` the toolset is described by its source URL.
///
/// # Errors
///
/// Propagates discovery errors.
pub async fn build_toolset(
    name: &str,
    description: Option<&str>,
    client: Arc<McpClient>,
) -> Result<Toolset, Error> {
    let descriptors = discover(&client).await?;
    let description = description.map_or_else(
        || format!("MCP toolset sourced from {}", client.base_url()),
        ToString::to_string,
    );

    let tools: Vec<SharedTool> = descriptors
        .into_iter()
        .map(|descriptor| {
            tracing::debug!(tool = %descriptor.name, toolset = name, "Registering remote tool");
            Arc::new(RemoteTool::new(descriptor, Arc::clone(&client))) as SharedTool
        })
        .collect();

    Ok(Toolset::new(name, description, tools))
}
