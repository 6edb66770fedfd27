//! Interception pipeline - ordered observer chain with nested
//! before/after semantics
//!
//! Each interceptor wraps the rest of the chain: code before its
//! `next.run(ctx)` call executes in registration order, code after it
//! in reverse registration order. Not calling the continuation is the
//! short-circuit mechanism, not an error.

use crate::event::TraceEvent;
use crate::session::Session;
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Interceptor failure, propagated verbatim to the `run`/`process`
/// caller; the pipeline adds no wrapping and performs no rollback
#[derive(Error, Debug)]
pub enum InterceptError {
    #[error("interceptor failed: {0}")]
    Failed(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type InterceptResult<T> = Result<T, InterceptError>;

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique typed handle into a context's extension map
///
/// Identity is the interned token, never a name, so independently
/// developed interceptors cannot collide. An optional default is
/// returned by [`InterceptContext::get`] when nothing was stored.
pub struct ContextKey<T> {
    id: u64,
    default: Option<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> ContextKey<T> {
    pub fn new() -> Self {
        Self {
            id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed),
            default: None,
            _marker: PhantomData,
        }
    }

    pub fn with_default(value: T) -> Self {
        Self {
            default: Some(value),
            ..Self::new()
        }
    }
}

impl<T: Send + Sync + 'static> Default for ContextKey<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-run scope binding one event to its session
///
/// Extension values set during a run are visible to all subsequently
/// invoked interceptors of that run and discarded afterwards.
pub struct InterceptContext {
    pub event: Arc<TraceEvent>,

    /// Snapshot of the owning session at context construction
    pub session: Session,

    extensions: HashMap<u64, Box<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for InterceptContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptContext")
            .field("event", &self.event)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl InterceptContext {
    pub fn new(event: impl Into<Arc<TraceEvent>>, session: Session) -> Self {
        Self {
            event: event.into(),
            session,
            extensions: HashMap::new(),
        }
    }

    /// Stored value for the key, else the key's declared default,
    /// else absent
    pub fn get<'a, T: Send + Sync + 'static>(&'a self, key: &'a ContextKey<T>) -> Option<&'a T> {
        self.extensions
            .get(&key.id)
            .and_then(|value| value.downcast_ref::<T>())
            .or(key.default.as_ref())
    }

    pub fn set<T: Send + Sync + 'static>(&mut self, key: &ContextKey<T>, value: T) {
        self.extensions.insert(key.id, Box::new(value));
    }
}

/// One link in the interception chain
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Name for log lines
    fn name(&self) -> &str {
        "interceptor"
    }

    /// Observe or annotate the context, calling `next.run(ctx)` to
    /// continue the chain; returning without calling it terminates the
    /// chain early
    async fn handle(&self, ctx: &mut InterceptContext, next: Next<'_>) -> InterceptResult<()>;
}

/// Continuation handed to an interceptor: the rest of the chain
pub struct Next<'a> {
    chain: &'a [Arc<dyn Interceptor>],
}

impl Next<'_> {
    /// Run the remaining interceptors against the context
    pub async fn run(self, ctx: &mut InterceptContext) -> InterceptResult<()> {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(ctx, Next { chain: rest }).await,
            None => Ok(()),
        }
    }
}

/// Ordered interceptor chain, run once per trace event
#[derive(Default)]
pub struct InterceptPipeline {
    chain: Vec<Arc<dyn Interceptor>>,
}

impl InterceptPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor; chainable
    pub fn use_interceptor(&mut self, interceptor: impl Interceptor + 'static) -> &mut Self {
        self.chain.push(Arc::new(interceptor));
        self
    }

    /// Run the full chain against an existing context
    pub async fn run(&self, ctx: &mut InterceptContext) -> InterceptResult<()> {
        let outcome = Next { chain: &self.chain }.run(ctx).await;
        if let Err(err) = &outcome {
            debug!(
                session_id = %ctx.session.id,
                event_id = %ctx.event.id,
                error = %err,
                "interceptor chain failed"
            );
        }
        outcome
    }

    /// Build a fresh context for `(event, session)` and run the chain,
    /// returning the context for inspection
    pub async fn process(
        &self,
        event: impl Into<Arc<TraceEvent>>,
        session: Session,
    ) -> InterceptResult<InterceptContext> {
        let mut ctx = InterceptContext::new(event, session);
        self.run(&mut ctx).await?;
        Ok(ctx)
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn clear(&mut self) {
        self.chain.clear();
    }
}
