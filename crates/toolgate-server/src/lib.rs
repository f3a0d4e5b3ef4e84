//! Server side of the tool protocol gateway: publishes local tools over an
//! SSE event stream plus a POST side channel.

pub mod app_state;
pub mod demo;
pub mod handlers;
pub mod publisher;
pub mod router;
pub mod session;

pub use publisher::{parse_request, publish, serve, ToolPublisher};
