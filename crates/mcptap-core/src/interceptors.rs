//! Stock interceptors - recording, logging, and negotiation tracking
//!
//! Collaborators are free to bring their own terminal handler; these
//! cover the common wiring so an adapter can tap a session with two
//! lines of setup.

use crate::message::{JsonRpcMessage, RequestId};
use crate::pipeline::{InterceptContext, InterceptResult, Interceptor, Next};
use crate::session::{Capabilities, SessionRegistry, SessionState};
use crate::store::EventStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Emits one debug line per observed event on the way in
#[derive(Default)]
pub struct LogInterceptor;

#[async_trait]
impl Interceptor for LogInterceptor {
    fn name(&self) -> &str {
        "log"
    }

    async fn handle(&self, ctx: &mut InterceptContext, next: Next<'_>) -> InterceptResult<()> {
        debug!(
            session_id = %ctx.event.session_id,
            direction = ctx.event.direction.as_str(),
            kind = ctx.event.payload.kind(),
            method = ctx.event.method.as_deref().unwrap_or("-"),
            size = ctx.event.size,
            "observed message"
        );
        next.run(ctx).await
    }
}

/// Appends every event that reaches it into a shared store, then
/// continues the chain
pub struct RecordInterceptor {
    store: Arc<RwLock<EventStore>>,
}

impl RecordInterceptor {
    pub fn new(store: Arc<RwLock<EventStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Interceptor for RecordInterceptor {
    fn name(&self) -> &str {
        "record"
    }

    async fn handle(&self, ctx: &mut InterceptContext, next: Next<'_>) -> InterceptResult<()> {
        self.store.write().await.store(ctx.event.clone());
        next.run(ctx).await
    }
}

/// Tracks MCP capability negotiation and mirrors it into the registry
///
/// An outbound `initialize` request moves the session to
/// `Initializing` and records the client capabilities; the matching
/// inbound response records the server capabilities and negotiated
/// protocol version and moves the session to `Active`.
pub struct NegotiationInterceptor {
    registry: Arc<RwLock<SessionRegistry>>,

    /// Outstanding initialize request id per session
    pending: Mutex<HashMap<String, RequestId>>,
}

impl NegotiationInterceptor {
    pub fn new(registry: Arc<RwLock<SessionRegistry>>) -> Self {
        Self {
            registry,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn capabilities_field(value: Option<&Value>) -> Option<Capabilities> {
        value?.get("capabilities")?.as_object().cloned()
    }

    fn version_field(value: Option<&Value>) -> Option<String> {
        Some(value?.get("protocolVersion")?.as_str()?.to_string())
    }
}

#[async_trait]
impl Interceptor for NegotiationInterceptor {
    fn name(&self) -> &str {
        "negotiation"
    }

    async fn handle(&self, ctx: &mut InterceptContext, next: Next<'_>) -> InterceptResult<()> {
        let session_id = ctx.event.session_id.clone();

        match &ctx.event.payload {
            JsonRpcMessage::Request(req) if req.method == "initialize" => {
                self.pending
                    .lock()
                    .await
                    .insert(session_id.clone(), req.id.clone());

                let mut registry = self.registry.write().await;
                registry.update_state(&session_id, SessionState::Initializing);
                if let Some(client) = Self::capabilities_field(req.params.as_ref()) {
                    registry.update_capabilities(&session_id, Some(client), None);
                }
            }
            JsonRpcMessage::Response(resp) => {
                let mut pending = self.pending.lock().await;
                let is_initialize_reply = resp.id.is_some()
                    && pending.get(&session_id) == resp.id.as_ref();
                if is_initialize_reply {
                    pending.remove(&session_id);
                    drop(pending);

                    if resp.error.is_none() {
                        let mut registry = self.registry.write().await;
                        if let Some(server) = Self::capabilities_field(resp.result.as_ref()) {
                            registry.update_capabilities(&session_id, None, Some(server));
                        }
                        if let Some(version) = Self::version_field(resp.result.as_ref()) {
                            registry.set_protocol_version(&session_id, version);
                        }
                        registry.update_state(&session_id, SessionState::Active);
                    }
                }
            }
            _ => {}
        }

        next.run(ctx).await
    }
}
