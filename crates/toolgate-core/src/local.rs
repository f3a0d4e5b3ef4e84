use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::contract::{Arguments, ToolContract};
use crate::error::Error;
use crate::traits::Tool;

/// Boxed future returned by a local tool handler.
pub type ToolFuture = Pin<Box<dyn Future<Output = Result<Value, Error>> + Send>>;

type Handler = dyn Fn(Arguments) -> ToolFuture + Send + Sync;

/// A locally implemented tool backed by a closure.
#[derive(Clone)]
pub struct FnTool {
    name: String,
    description: String,
    contract: ToolContract,
    handler: Arc<Handler>,
}

impl FnTool {
    /// Create a tool from an async handler.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        contract: ToolContract,
        handler: F,
    ) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Error>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            contract,
            handler: Arc::new(move |arguments| -> ToolFuture { Box::pin(handler(arguments)) }),
        }
    }

    /// Create a tool from a synchronous handler.
    pub fn sync<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        contract: ToolContract,
        handler: F,
    ) -> Self
    where
        F: Fn(Arguments) -> Result<Value, Error> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        Self::new(name, description, contract, move |arguments| {
            let handler = Arc::clone(&handler);
            async move { (*handler)(arguments) }
        })
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("contract", &self.contract)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn contract(&self) -> &ToolContract {
        &self.contract
    }

    async fn invoke(&self, arguments: Arguments) -> Result<Value, Error> {
        let arguments = self.contract.validate(&arguments)?;
        tracing::debug!(tool = %self.name, "invoking local tool");
        (self.handler)(arguments).await
    }
}
