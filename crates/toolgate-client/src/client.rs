use std::sync::Arc;

use serde_json::Value;
use tokio::sync::OnceCell;

use toolgate_core::{Arguments, Error};
use toolgate_mcp::{methods, CallToolParams, JsonRpcRequest, ListToolsResult, ToolDescriptor};

use crate::config::ClientConfig;
use crate::correlator::{Correlator, Outbound};
use crate::transport::SseTransport;

/// Client side of the tool protocol over one SSE connection.
///
/// The first logical call is always `initialize`; it runs at most once per
/// client no matter how often discovery is repeated. `tools/call` is
/// refused locally until the handshake has completed.
pub struct McpClient {
    config: ClientConfig,
    correlator: Arc<Correlator>,
    transport: SseTransport,
    initialized: OnceCell<Value>,
}

impl McpClient {
    /// Create a client. The stream is opened lazily by the first request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the configured base URL is invalid.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let correlator = Arc::new(Correlator::new());
        let transport = SseTransport::new(
            &config.base_url,
            Arc::clone(&correlator),
            config.request_timeout,
            config.close_timeout,
        )?;

        Ok(Self {
            config,
            correlator,
            transport,
            initialized: OnceCell::new(),
        })
    }

    /// Create a client for `base_url` with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if `base_url` is invalid.
    pub fn connect(base_url: &str) -> Result<Self, Error> {
        Self::new(ClientConfig::new(base_url))
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.transport.base_url().as_str()
    }

    /// Send one request and wait for its result, starting the event stream
    /// and waiting for the side-channel announcement if needed.
    ///
    /// # Errors
    ///
    /// Propagates transport, timeout, and remote errors.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, Error> {
        self.transport.ensure_started().await?;
        self.transport
            .wait_for_endpoint(self.config.request_timeout)
            .await?;
        self.correlator
            .call(
                &self.transport,
                method,
                params,
                self.config.request_timeout,
            )
            .await
    }

    /// Perform the `initialize` handshake once and return the server's
    /// reply. Later calls return the cached reply without a round trip.
    ///
    /// # Errors
    ///
    /// Propagates the error of the handshake request; a failed handshake
    /// may be retried.
    pub async fn initialize(&self) -> Result<&Value, Error> {
        self.initialized
            .get_or_try_init(|| async {
                let reply = self.request(methods::INITIALIZE, None).await?;
                tracing::info!(base_url = %self.base_url(), "Initialized tool server session");

                if let Err(err) = self
                    .transport
                    .send(&JsonRpcRequest::notification(methods::INITIALIZED))
                    .await
                {
                    tracing::debug!("initialized notification not delivered: {err}");
                }
                Ok(reply)
            })
            .await
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// Discover the server's tools, performing the handshake first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the `tools/list` result is malformed.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, Error> {
        self.initialize().await?;
        let result = self.request(methods::TOOLS_LIST, None).await?;
        let listed: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| Error::Protocol(format!("malformed tools/list result: {e}")))?;
        tracing::debug!(count = listed.tools.len(), "Listed remote tools");
        Ok(listed.tools)
    }

    /// Invoke a remote tool and return the raw `tools/call` result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] without touching the network if the
    /// handshake has not completed.
    pub async fn call_tool(&self, name: &str, arguments: Arguments) -> Result<Value, Error> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized(methods::TOOLS_CALL.to_string()));
        }

        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })
        .map_err(|e| Error::Protocol(e.to_string()))?;

        self.request(methods::TOOLS_CALL, Some(params)).await
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.correlator.pending_len()
    }

    /// Stop the event stream. Pending calls fail with a transport error.
    pub async fn close(&self) {
        self.transport.close().await;
    }
}
