//! Transport seam between client-side stubs and server-side dispatchers.
//!
//! The wire protocol is a collaborator concern; the dispatch core only
//! assumes a reliable request/response channel plus a cheap liveness probe.
//! `LoopbackChannel` is the in-process implementation, used in tests and
//! wherever caller and dispatcher share a process.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cluster::LoadMetric;
use crate::context::{InvocationContext, Value};
use crate::dispatch::Dispatcher;
use crate::invoker::Result;

/// A channel to a remote dispatcher.
#[async_trait]
pub trait CallChannel: Send + Sync {
    /// Forward one invocation and await its result.
    async fn call(&self, ctx: InvocationContext) -> Result<Value>;

    /// Cheap liveness probe. Returns the peer's last-known load metric when
    /// it reports one; `None` means the peer is alive but unranked.
    async fn ping(&self) -> Result<Option<u64>>;
}

/// In-process channel wrapping a dispatcher directly.
///
/// No network, no serialization; contexts cross the "boundary" as wire
/// clones. Ideal for single-process deployments and tests.
pub struct LoopbackChannel {
    dispatcher: Arc<Dispatcher>,
    load: Option<Arc<dyn LoadMetric>>,
}

impl LoopbackChannel {
    /// Wrap a dispatcher with no load reporting.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            load: None,
        }
    }

    /// Wrap a dispatcher that reports load through a metric provider.
    pub fn with_load(dispatcher: Arc<Dispatcher>, load: Arc<dyn LoadMetric>) -> Self {
        Self {
            dispatcher,
            load: Some(load),
        }
    }
}

#[async_trait]
impl CallChannel for LoopbackChannel {
    async fn call(&self, mut ctx: InvocationContext) -> Result<Value> {
        self.dispatcher.dispatch(&mut ctx).await
    }

    async fn ping(&self) -> Result<Option<u64>> {
        Ok(self.load.as_ref().and_then(|m| m.current_load()))
    }
}
