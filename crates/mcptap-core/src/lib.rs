//! mcptap core - session tracking, trace storage, and interception
//!
//! This crate is the in-process trace engine behind mcptap: it records
//! and correlates JSON-RPC traffic between an AI-agent client and a
//! tool endpoint, one logical session at a time.
//!
//! - **Messages**: generic JSON-RPC envelope shapes
//! - **Events**: immutable trace events with derived correlation fields
//! - **Sessions**: lifecycle registry with config validation
//! - **Store**: append-only per-session logs with indexed correlation
//! - **Pipeline**: ordered interceptor chain with nested before/after
//!   semantics and short-circuiting
//!
//! Transports, query APIs, and UI surfaces live in collaborator crates;
//! this core never opens a socket or spawns a process.

pub mod event;
pub mod interceptors;
pub mod message;
pub mod pipeline;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use event::{RequestResponsePair, TraceEvent};
pub use interceptors::{LogInterceptor, NegotiationInterceptor, RecordInterceptor};
pub use message::{Direction, JsonRpcError, JsonRpcMessage, RequestId};
pub use pipeline::{
    ContextKey, InterceptContext, InterceptError, InterceptPipeline, InterceptResult, Interceptor,
    Next,
};
pub use session::{
    Capabilities, ServerConfig, Session, SessionRegistry, SessionState, TransportConfig,
    ValidationError, DEFAULT_PROTOCOL,
};
pub use store::{EventFilter, EventStore, StoreStats};

/// Core version
pub const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");
