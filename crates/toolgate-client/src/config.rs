use std::time::Duration;

/// Default base URL of a tool server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Connection settings for an [`McpClient`](crate::McpClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address; a trailing `/sse` is accepted and stripped.
    pub base_url: String,
    /// Upper bound for a single request/response exchange.
    pub request_timeout: Duration,
    /// How long `close` waits for the receive loop before aborting it.
    pub close_timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(5),
        }
    }
}
