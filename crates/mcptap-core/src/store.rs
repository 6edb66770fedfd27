//! Append-only trace event store with correlation and query support

use crate::event::{RequestResponsePair, TraceEvent};
use crate::message::{Direction, RequestId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Conjunctive filter over stored events
///
/// Every set field must match; unset fields are unconstrained. Both
/// time bounds are inclusive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_error: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl EventFilter {
    fn matches(&self, event: &TraceEvent) -> bool {
        if let Some(direction) = self.direction {
            if event.direction != direction {
                return false;
            }
        }
        if let Some(method) = &self.method {
            if event.method.as_deref() != Some(method.as_str()) {
                return false;
            }
        }
        if let Some(has_error) = self.has_error {
            if event.has_error() != has_error {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if event.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if event.timestamp > end {
                return false;
            }
        }
        true
    }
}

/// Store counters, maintained on append and clear
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StoreStats {
    /// Events currently stored
    pub events_stored: u64,

    /// Serialized payload bytes currently stored
    pub bytes_stored: u64,

    /// Sessions with at least one event
    pub sessions: usize,
}

/// In-memory record of trace events
///
/// Per-session logs are created lazily on first append and preserve
/// insertion order. A `(session_id, request_id)` secondary index backs
/// O(1) correlation lookups; later events overwrite earlier index
/// entries for the same key. No internal locking: concurrent appends to
/// the same session must be serialized by the caller.
#[derive(Debug, Default)]
pub struct EventStore {
    logs: HashMap<String, Vec<Arc<TraceEvent>>>,
    request_index: HashMap<(String, RequestId), Arc<TraceEvent>>,
    events_stored: u64,
    bytes_stored: u64,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to its session's log
    ///
    /// The payload is assumed to have been validated upstream; the
    /// store never inspects it beyond the derived fields.
    pub fn store(&mut self, event: impl Into<Arc<TraceEvent>>) {
        let event = event.into();
        debug!(
            session_id = %event.session_id,
            direction = event.direction.as_str(),
            method = event.method.as_deref().unwrap_or("-"),
            size = event.size,
            "event stored"
        );

        if let Some(request_id) = &event.request_id {
            self.request_index.insert(
                (event.session_id.clone(), request_id.clone()),
                event.clone(),
            );
        }

        self.events_stored += 1;
        self.bytes_stored += event.size as u64;
        self.logs
            .entry(event.session_id.clone())
            .or_default()
            .push(event);
    }

    /// Session log in insertion order; empty when the session has no
    /// events, never absent
    pub fn get_by_session(&self, session_id: &str) -> Vec<Arc<TraceEvent>> {
        self.logs.get(session_id).cloned().unwrap_or_default()
    }

    /// Most recently stored event carrying this correlation id
    pub fn get_by_request_id(
        &self,
        session_id: &str,
        request_id: &RequestId,
    ) -> Option<Arc<TraceEvent>> {
        self.request_index
            .get(&(session_id.to_string(), request_id.clone()))
            .cloned()
    }

    /// Events matching every set filter field
    ///
    /// Order is preserved within a session; across sessions it is
    /// undefined.
    pub fn query(&self, filter: &EventFilter) -> Vec<Arc<TraceEvent>> {
        match &filter.session_id {
            Some(session_id) => self
                .logs
                .get(session_id)
                .into_iter()
                .flatten()
                .filter(|event| filter.matches(event))
                .cloned()
                .collect(),
            None => self
                .logs
                .values()
                .flatten()
                .filter(|event| filter.matches(event))
                .cloned()
                .collect(),
        }
    }

    /// Pair an outbound request with its inbound response
    ///
    /// Direction is a hard filter on each side: the request is the
    /// first outbound event with the id, the response the first inbound
    /// one. No request means no pair; a missing response yields a pair
    /// with `response` and `latency_ms` absent.
    pub fn correlate(
        &self,
        session_id: &str,
        request_id: &RequestId,
    ) -> Option<RequestResponsePair> {
        let log = self.logs.get(session_id)?;

        let side = |direction: Direction| {
            log.iter()
                .find(|event| {
                    event.direction == direction && event.request_id.as_ref() == Some(request_id)
                })
                .cloned()
        };

        let request = side(Direction::Outbound)?;
        let response = side(Direction::Inbound);
        Some(RequestResponsePair::new(request, response))
    }

    pub fn count_by_session(&self, session_id: &str) -> usize {
        self.logs.get(session_id).map_or(0, Vec::len)
    }

    /// Total events across all sessions
    pub fn count(&self) -> usize {
        self.logs.values().map(Vec::len).sum()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            events_stored: self.events_stored,
            bytes_stored: self.bytes_stored,
            sessions: self.logs.len(),
        }
    }

    /// Drop one session's log and its index entries
    pub fn clear_session(&mut self, session_id: &str) {
        if let Some(log) = self.logs.remove(session_id) {
            self.events_stored -= log.len() as u64;
            self.bytes_stored -= log.iter().map(|e| e.size as u64).sum::<u64>();
        }
        self.request_index.retain(|(sid, _), _| sid != session_id);
    }

    /// Wipe everything
    pub fn clear(&mut self) {
        self.logs.clear();
        self.request_index.clear();
        self.events_stored = 0;
        self.bytes_stored = 0;
    }
}
