//! JSON-RPC 2.0 envelope and MCP message shapes.
//!
//! The stdio transport is newline-delimited JSON: one request or response
//! per line. Everything protocol-shaped lives here so the dispatcher only
//! handles typed values.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
/// MCP: requested resource does not exist (or is disabled).
pub const RESOURCE_NOT_FOUND: i64 = -32002;

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn result(id: Value, result: Value) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Error response carrying a structured `{code, message, suggestion?}`
    /// object in the JSON-RPC `data` field.
    pub fn error_with_data(
        id: Value,
        code: i64,
        message: impl Into<String>,
        data: Value,
    ) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: Some(data),
            }),
        }
    }
}

/// A successful `tools/call` result: text content plus optional metadata and
/// the command-level error flag.
pub fn tool_result(text: String, is_error: bool, metadata: Option<Value>) -> Value {
    let mut result = json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error,
    });
    if let Some(metadata) = metadata {
        result["metadata"] = metadata;
    }
    result
}

/// A failed tool call rendered as a structured error object. The transport
/// still sees a successful response; `isError` carries the failure.
pub fn tool_error(error: Value) -> Value {
    let text = serde_json::to_string_pretty(&error).unwrap_or_else(|_| error.to_string());
    tool_result(text, true, Some(json!({ "error": error })))
}

/// A `resources/read` result with a single content item.
pub fn resource_result(uri: &str, mime_type: &str, text: String) -> Value {
    json!({
        "contents": [{ "uri": uri, "mimeType": mime_type, "text": text }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_parse_with_and_without_ids() {
        let request: JsonRpcRequest = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/list","params":{}}"#,
        )
        .unwrap();
        assert!(!request.is_notification());
        assert_eq!(request.method, "tools/list");

        let notification: JsonRpcRequest = serde_json::from_str(
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        )
        .unwrap();
        assert!(notification.is_notification());
    }

    #[test]
    fn responses_serialize_result_xor_error() {
        let ok = JsonRpcResponse::result(json!(1), json!({"x": true}));
        let ok = serde_json::to_value(&ok).unwrap();
        assert_eq!(ok["jsonrpc"], "2.0");
        assert!(ok.get("error").is_none());
        assert_eq!(ok["result"]["x"], true);

        let err = JsonRpcResponse::error(json!(2), METHOD_NOT_FOUND, "no such method");
        let err = serde_json::to_value(&err).unwrap();
        assert!(err.get("result").is_none());
        assert_eq!(err["error"]["code"], METHOD_NOT_FOUND);
    }

    #[test]
    fn tool_error_embeds_the_structured_object() {
        let result = tool_error(json!({"code": "BLOCKED_COMMAND", "message": "rm is blocked"}));
        assert_eq!(result["isError"], true);
        assert_eq!(result["metadata"]["error"]["code"], "BLOCKED_COMMAND");
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("BLOCKED_COMMAND"));
    }

    #[test]
    fn resource_result_shape() {
        let result = resource_result("cli://logs/list", "application/json", "{}".to_string());
        assert_eq!(result["contents"][0]["uri"], "cli://logs/list");
        assert_eq!(result["contents"][0]["mimeType"], "application/json");
    }
}
