pub mod jsonrpc;
pub mod tools;

pub use jsonrpc::{correlation_key, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use tools::{
    methods, CallToolParams, CallToolResult, ListToolsResult, ToolContent, ToolDescriptor,
    PROTOCOL_VERSION,
};
