//! JSON-RPC 2.0 message types for the Model Context Protocol.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::Error;

pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revision announced when the client does not name one.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 request or notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

impl McpRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Notifications carry no id and never get a reply.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// String parameter by name.
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params.as_ref()?.get(name)?.as_str()
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl McpResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::new(Self::PARSE_ERROR, msg)
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(Self::INVALID_REQUEST, msg)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(Self::METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PARAMS, msg)
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL_ERROR, msg)
    }
}

// =============================================================================
// Tool results
// =============================================================================

/// Payload of a `tools/call` response.
///
/// The record travels twice: as `structuredContent` and as pretty JSON text
/// for clients that only render `content`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub content: Vec<TextContent>,
    pub structured_content: Value,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl TextContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            kind: "text",
            text: text.into(),
        }
    }
}

impl ToolResult {
    pub fn success(record: Value) -> Self {
        Self::build(record, false)
    }

    /// Tool-level failure. `error.kind` tells a client whether to retry
    /// (`connectivity`) or reformulate (`validation`, `not_found`).
    pub fn failure(err: &Error) -> Self {
        let mut error = json!({
            "kind": err.kind(),
            "message": err.to_string(),
            "retryable": err.is_retryable(),
        });
        if let Some(stage) = err.stage() {
            error["stage"] = json!(stage);
        }
        if let Error::Filter(filter) = err {
            error["field"] = json!(filter.field());
            error["code"] = json!(filter.code());
        }
        Self::build(json!({ "error": error }), true)
    }

    fn build(record: Value, is_error: bool) -> Self {
        let text = serde_json::to_string_pretty(&record).unwrap_or_else(|_| record.to_string());
        Self {
            content: vec![TextContent::new(text)],
            structured_content: record,
            is_error,
        }
    }

    pub fn into_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterError;

    #[test]
    fn test_request_parses_with_and_without_id() {
        let req: McpRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#).unwrap();
        assert_eq!(req.id, Some(json!(7)));
        assert!(!req.is_notification());

        let note: McpRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .unwrap();
        assert!(note.is_notification());
        assert!(note.params.is_none());
    }

    #[test]
    fn test_response_serialization() {
        let ok = McpResponse::success(Some(json!(1)), json!({"tools": []}));
        assert!(ok.is_success());
        let text = serde_json::to_string(&ok).unwrap();
        assert!(!text.contains("error"));

        let err = McpResponse::error(None, JsonRpcError::parse_error("bad json"));
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], -32700);
    }

    #[test]
    fn test_method_not_found_message() {
        let err = JsonRpcError::method_not_found("tools/run");
        assert_eq!(err.code, JsonRpcError::METHOD_NOT_FOUND);
        assert_eq!(err.message, "Method not found: tools/run");
    }

    #[test]
    fn test_tool_result_shape() {
        let value = ToolResult::success(json!({"name": "Ava"})).into_value();
        assert_eq!(value["isError"], false);
        assert_eq!(value["structuredContent"]["name"], "Ava");
        assert_eq!(value["content"][0]["type"], "text");
        let echoed: Value =
            serde_json::from_str(value["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(echoed, json!({"name": "Ava"}));
    }

    #[test]
    fn test_failure_carries_kind_and_field() {
        let err = Error::from(FilterError::InvalidField {
            field: "hair_length".to_string(),
        });
        let value = ToolResult::failure(&err).into_value();
        assert_eq!(value["isError"], true);
        let error = &value["structuredContent"]["error"];
        assert_eq!(error["kind"], "validation");
        assert_eq!(error["field"], "hair_length");
        assert_eq!(error["retryable"], false);

        let conn = Error::sub_fetch("similar_performers", Error::connectivity("timeout"));
        let value = ToolResult::failure(&conn).into_value();
        let error = &value["structuredContent"]["error"];
        assert_eq!(error["kind"], "connectivity");
        assert_eq!(error["stage"], "similar_performers");
        assert_eq!(error["retryable"], true);
    }
}
