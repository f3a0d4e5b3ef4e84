use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::contract::{Arguments, ToolContract};
use crate::error::Error;

/// A named, described, schema-typed unit of functionality invocable by
/// name with keyword arguments.
///
/// Remote tools (proxied over the wire) and local tools (published by a
/// server) both implement this trait, so the agent runtime never needs to
/// know where a tool actually runs.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name of the tool within its toolset.
    fn name(&self) -> &str;

    /// Free-text description shown to the calling agent.
    fn description(&self) -> &str;

    /// Typed call contract used to validate arguments.
    fn contract(&self) -> &ToolContract;

    /// Invoke the tool with keyword arguments.
    async fn invoke(&self, arguments: Arguments) -> Result<Value, Error>;
}

/// Shared handle to a tool of any kind.
pub type SharedTool = Arc<dyn Tool>;
