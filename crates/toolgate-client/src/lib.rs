//! Client side of the tool protocol gateway.
//!
//! [`McpClient`] owns one SSE connection to a tool server: a background
//! task reads the event stream while requests are POSTed to the side
//! channel the server announces. Responses are matched to callers by the
//! [`Correlator`]. [`build_toolset`] turns the server's tools into
//! [`RemoteTool`]s that plug into a [`toolgate_core::ToolsetRegistry`].

pub mod client;
pub mod config;
pub mod correlator;
pub mod remote;
pub mod transport;

pub use client::McpClient;
pub use config::ClientConfig;
pub use correlator::{Correlator, Outbound};
pub use remote::{build_toolset, discover, unwrap_tool_result, RemoteTool};
pub use transport::{EndpointState, SseTransport, StreamEvent};
