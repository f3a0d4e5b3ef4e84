use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;

use toolgate_client::{build_toolset, ClientConfig, McpClient};
use toolgate_core::{Arguments, ToolsetRegistry};

/// Discover the server's tools, invoke `tool` through the registry, and
/// print the unwrapped result.
pub async fn run(
    config: ClientConfig,
    toolset: &str,
    tool: &str,
    raw_args: &str,
) -> anyhow::Result<()> {
    let arguments = parse_arguments(raw_args)?;
    let client = Arc::new(McpClient::new(config)?);

    let outcome = invoke(Arc::clone(&client), toolset, tool, arguments).await;
    client.close().await;

    let result = outcome?;
    match result {
        Value::String(text) => println!("{text}"),
        other => println!("{}", serde_json::to_string_pretty(&other)?),
    }

    Ok(())
}

async fn invoke(
    client: Arc<McpClient>,
    toolset: &str,
    tool: &str,
    arguments: Arguments,
) -> anyhow::Result<Value> {
    let mut registry = ToolsetRegistry::new();
    registry.register(build_toolset(toolset, None, client).await?);

    let tool = registry.find_tool(tool)?;
    Ok(tool.invoke(arguments).await?)
}

fn parse_arguments(raw: &str) -> anyhow::Result<Arguments> {
    let value: Value = serde_json::from_str(raw).context("--args is not valid JSON")?;
    match value {
        Value::Object(arguments) => Ok(arguments),
        other => anyhow::bail!("--args must be a JSON object, got {other}"),
    }
}
