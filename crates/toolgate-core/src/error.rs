/// Core error type for the toolgate system.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The event stream or side channel failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A request was sent before the server announced its side channel.
    #[error("side-channel endpoint not yet announced")]
    EndpointUnknown,

    #[error("timed out waiting for response to {method}")]
    Timeout { method: String },

    /// The server answered with an explicit error envelope.
    #[error("remote error ({code}): {message}")]
    Remote { code: i32, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    /// A published tool's implementation failed.
    #[error("tool execution failed: {0}")]
    LocalExecution(String),

    #[error("client not initialized: `initialize` must complete before `{0}`")]
    NotInitialized(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("toolset not found: {0}")]
    ToolsetNotFound(String),
}
