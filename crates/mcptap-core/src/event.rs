//! Trace events - immutable records of observed messages

use crate::message::{Direction, JsonRpcMessage, RequestId};
use crate::session::Session;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One observed message, frozen at capture time
///
/// `method`, `request_id`, and `size` are derived from the payload when
/// the event is built and never recomputed. Events are owned by the
/// store once appended; nothing mutates them afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Unique event identifier (ULID)
    pub id: String,

    /// Owning session
    pub session_id: String,

    /// Capture time
    pub timestamp: DateTime<Utc>,

    /// Which way the message was travelling
    pub direction: Direction,

    /// Message dialect tag (e.g. "mcp")
    pub protocol: String,

    /// The observed message
    pub payload: JsonRpcMessage,

    /// Method name, when the payload carries one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Non-null correlation id, when the payload carries one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,

    /// Byte length of the serialized payload
    pub size: usize,
}

impl TraceEvent {
    /// Capture a payload observed on a session, deriving the
    /// correlation fields and timestamping the event now
    pub fn capture(session: &Session, direction: Direction, payload: JsonRpcMessage) -> Self {
        Self::build(
            session.id.clone(),
            session.protocol.clone(),
            direction,
            payload,
        )
    }

    /// Same derivation for adapters that only hold a session id
    pub fn build(
        session_id: String,
        protocol: String,
        direction: Direction,
        payload: JsonRpcMessage,
    ) -> Self {
        let method = payload.method().map(str::to_string);
        let request_id = payload.request_id().cloned();
        let size = serde_json::to_vec(&payload).map_or(0, |bytes| bytes.len());

        Self {
            id: ulid::Ulid::new().to_string(),
            session_id,
            timestamp: Utc::now(),
            direction,
            protocol,
            payload,
            method,
            request_id,
            size,
        }
    }

    /// Whether the payload carries an error object
    pub fn has_error(&self) -> bool {
        self.payload.has_error()
    }
}

/// A correlated request/response exchange, computed on demand
///
/// `latency_ms` is the raw timestamp difference and may be negative when
/// the inbound event was captured out of order; it is reported as
/// observed, not corrected.
#[derive(Debug, Clone, Serialize)]
pub struct RequestResponsePair {
    pub request: Arc<TraceEvent>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Arc<TraceEvent>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<i64>,
}

impl RequestResponsePair {
    pub fn new(request: Arc<TraceEvent>, response: Option<Arc<TraceEvent>>) -> Self {
        let latency_ms = response.as_ref().map(|resp| {
            resp.timestamp
                .signed_duration_since(request.timestamp)
                .num_milliseconds()
        });
        Self {
            request,
            response,
            latency_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ServerConfig, Session};
    use serde_json::json;

    fn test_session() -> Session {
        Session::new(ServerConfig::stdio("srv", "node"))
    }

    #[test]
    fn test_capture_derives_correlation_fields() {
        let session = test_session();
        let payload = JsonRpcMessage::request(1, "tools/list", None);
        let expected_size = serde_json::to_vec(&payload).unwrap().len();

        let event = TraceEvent::capture(&session, Direction::Outbound, payload);

        assert_eq!(event.session_id, session.id);
        assert_eq!(event.protocol, "mcp");
        assert_eq!(event.method.as_deref(), Some("tools/list"));
        assert_eq!(event.request_id, Some(RequestId::Number(1)));
        assert_eq!(event.size, expected_size);
        assert!(event.size > 0);
    }

    #[test]
    fn test_capture_notification_has_no_request_id() {
        let session = test_session();
        let event = TraceEvent::capture(
            &session,
            Direction::Outbound,
            JsonRpcMessage::notification("notifications/initialized", None),
        );
        assert_eq!(event.request_id, None);
        assert_eq!(event.method.as_deref(), Some("notifications/initialized"));
    }

    #[test]
    fn test_capture_null_response_id_is_not_derived() {
        let session = test_session();
        let event = TraceEvent::capture(
            &session,
            Direction::Inbound,
            JsonRpcMessage::response_err(
                None,
                crate::message::JsonRpcError {
                    code: -32700,
                    message: "parse error".into(),
                    data: None,
                },
            ),
        );
        assert_eq!(event.request_id, None);
        assert_eq!(event.method, None);
        assert!(event.has_error());
    }

    #[test]
    fn test_event_ids_are_unique() {
        let session = test_session();
        let a = TraceEvent::capture(
            &session,
            Direction::Outbound,
            JsonRpcMessage::request(1, "ping", None),
        );
        let b = TraceEvent::capture(
            &session,
            Direction::Outbound,
            JsonRpcMessage::request(1, "ping", None),
        );
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_pair_latency_sign() {
        let session = test_session();
        let mut request = TraceEvent::capture(
            &session,
            Direction::Outbound,
            JsonRpcMessage::request(1, "tools/list", None),
        );
        let mut response = TraceEvent::capture(
            &session,
            Direction::Inbound,
            JsonRpcMessage::response_ok(1, json!([])),
        );
        request.timestamp = Utc::now();
        response.timestamp = request.timestamp + chrono::Duration::milliseconds(25);

        let pair = RequestResponsePair::new(Arc::new(request.clone()), Some(Arc::new(response.clone())));
        assert_eq!(pair.latency_ms, Some(25));

        // Out-of-order capture is reported, not corrected
        response.timestamp = request.timestamp - chrono::Duration::milliseconds(3);
        let pair = RequestResponsePair::new(Arc::new(request), Some(Arc::new(response)));
        assert_eq!(pair.latency_ms, Some(-3));
    }

    #[test]
    fn test_pair_without_response_has_no_latency() {
        let session = test_session();
        let request = TraceEvent::capture(
            &session,
            Direction::Outbound,
            JsonRpcMessage::request(1, "tools/list", None),
        );
        let pair = RequestResponsePair::new(Arc::new(request), None);
        assert!(pair.response.is_none());
        assert_eq!(pair.latency_ms, None);
    }
}
