use serde::{Deserialize, Serialize};
use serde_json::Value;

use toolgate_core::Error;

pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC 2.0 request. A null id marks a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a request. Missing params are sent as an empty object.
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params: Some(params.unwrap_or_else(|| Value::Object(serde_json::Map::new()))),
        }
    }

    /// Create a notification (no id, no response expected).
    pub fn notification(method: impl Into<String>) -> Self {
        Self::new(Value::Null, method, None)
    }

    #[must_use]
    pub fn is_notification(&self) -> bool {
        correlation_key(&self.id).is_none()
    }
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Unwrap the response into its result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] carrying the server-supplied message when the
    /// response holds an `error` member.
    pub fn into_result(self) -> Result<Value, Error> {
        if let Some(error) = self.error {
            return Err(Error::Remote {
                code: error.code,
                message: error.message,
            });
        }
        Ok(self
            .result
            .unwrap_or_else(|| Value::Object(serde_json::Map::new())))
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    #[serde(default)]
    pub code: i32,
    #[serde(default = "unknown_error_message")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn unknown_error_message() -> String {
    "Unknown MCP error".to_string()
}

/// Key used to match a response to its pending request.
///
/// String and numeric ids are accepted; null, empty strings and any other
/// shape yield `None`.
#[must_use]
pub fn correlation_key(id: &Value) -> Option<String> {
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Standard JSON-RPC error codes.
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
/// Application-defined: a tool implementation failed.
pub const TOOL_EXECUTION_ERROR: i32 = -32000;
