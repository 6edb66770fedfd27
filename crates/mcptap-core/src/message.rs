//! JSON-RPC message envelope - the generic wire shape mcptap observes
//!
//! mcptap does not interpret protocol semantics beyond the envelope:
//! a message is a request, a response, or a notification, and may carry
//! a correlation id. Everything else is opaque payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// JSON-RPC protocol version carried by every message
pub const JSONRPC_VERSION: &str = "2.0";

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_string()
}

/// Correlation id of a request/response exchange
///
/// JSON-RPC permits numeric and string ids; both are kept verbatim so
/// the store can index on them without normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<i32> for RequestId {
    fn from(n: i32) -> Self {
        RequestId::Number(i64::from(n))
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

/// Which way a message was travelling when captured, relative to the
/// observed endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Arriving from the endpoint
    Inbound,
    /// Leaving toward the endpoint
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// A method call expecting a response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,

    pub id: RequestId,

    pub method: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A fire-and-forget method call (no id, no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,

    pub method: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// The answer to a request; carries exactly one of `result` / `error`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,

    /// Null when the far end could not determine the request id
    pub id: Option<RequestId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// Error object on a failed response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Any JSON-RPC message mcptap can observe
///
/// Untagged: the variant is recovered from shape. Requests carry both
/// `id` and `method`, notifications only `method`, responses neither.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    /// Build a request message
    pub fn request(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        JsonRpcMessage::Request(JsonRpcRequest {
            jsonrpc: default_jsonrpc(),
            id: id.into(),
            method: method.into(),
            params,
        })
    }

    /// Build a notification message
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        JsonRpcMessage::Notification(JsonRpcNotification {
            jsonrpc: default_jsonrpc(),
            method: method.into(),
            params,
        })
    }

    /// Build a successful response
    pub fn response_ok(id: impl Into<RequestId>, result: Value) -> Self {
        JsonRpcMessage::Response(JsonRpcResponse {
            jsonrpc: default_jsonrpc(),
            id: Some(id.into()),
            result: Some(result),
            error: None,
        })
    }

    /// Build an error response
    pub fn response_err(id: Option<RequestId>, error: JsonRpcError) -> Self {
        JsonRpcMessage::Response(JsonRpcResponse {
            jsonrpc: default_jsonrpc(),
            id,
            result: None,
            error: Some(error),
        })
    }

    /// Method name, if this message carries one
    pub fn method(&self) -> Option<&str> {
        match self {
            JsonRpcMessage::Request(r) => Some(&r.method),
            JsonRpcMessage::Notification(n) => Some(&n.method),
            JsonRpcMessage::Response(_) => None,
        }
    }

    /// Non-null correlation id, if this message carries one
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            JsonRpcMessage::Request(r) => Some(&r.id),
            JsonRpcMessage::Notification(_) => None,
            JsonRpcMessage::Response(r) => r.id.as_ref(),
        }
    }

    /// Whether this message carries an error object
    pub fn has_error(&self) -> bool {
        matches!(self, JsonRpcMessage::Response(r) if r.error.is_some())
    }

    /// Message kind as a string, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            JsonRpcMessage::Request(_) => "request",
            JsonRpcMessage::Notification(_) => "notification",
            JsonRpcMessage::Response(_) => "response",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_roundtrip() {
        let msg: JsonRpcMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
                .unwrap();
        assert!(matches!(msg, JsonRpcMessage::Request(_)));
        assert_eq!(msg.method(), Some("tools/list"));
        assert_eq!(msg.request_id(), Some(&RequestId::Number(1)));
        assert!(!msg.has_error());
    }

    #[test]
    fn test_notification_has_no_id() {
        let msg: JsonRpcMessage = serde_json::from_value(
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .unwrap();
        assert!(matches!(msg, JsonRpcMessage::Notification(_)));
        assert_eq!(msg.request_id(), None);
    }

    #[test]
    fn test_response_discrimination() {
        let ok: JsonRpcMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": "a-1", "result": []})).unwrap();
        assert!(matches!(ok, JsonRpcMessage::Response(_)));
        assert_eq!(ok.request_id(), Some(&RequestId::String("a-1".into())));

        let err: JsonRpcMessage = serde_json::from_value(
            json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32700, "message": "parse error"}}),
        )
        .unwrap();
        assert!(err.has_error());
        assert_eq!(err.request_id(), None);
    }

    #[test]
    fn test_string_and_numeric_ids_serialize_verbatim() {
        assert_eq!(
            serde_json::to_string(&RequestId::Number(42)).unwrap(),
            "42"
        );
        assert_eq!(
            serde_json::to_string(&RequestId::String("req-7".into())).unwrap(),
            "\"req-7\""
        );
    }

    #[test]
    fn test_direction_wire_format() {
        assert_eq!(
            serde_json::to_string(&Direction::Outbound).unwrap(),
            "\"outbound\""
        );
        assert_eq!(Direction::Inbound.as_str(), "inbound");
    }
}
