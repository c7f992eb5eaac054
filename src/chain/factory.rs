//! Chain construction and caching keyed by (target, operation).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::{Interceptor, InterceptorChain};
use crate::context::{OperationId, ServiceId};
use crate::invoker::Invoker;

/// Cache key: one chain per (target, operation) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainKey {
    pub target: ServiceId,
    pub operation: OperationId,
}

impl ChainKey {
    pub fn new(target: impl Into<ServiceId>, operation: impl Into<OperationId>) -> Self {
        Self {
            target: target.into(),
            operation: operation.into(),
        }
    }
}

/// Selects the interceptor stack for a key. The same key must always yield
/// the same composition for the lifetime of the factory.
pub type StackFn = dyn Fn(&ChainKey) -> Vec<Arc<dyn Interceptor>> + Send + Sync;

/// Builds and caches interceptor chains per (target, operation) key.
///
/// Chains are built lazily on first request and cached; a cached chain keeps
/// its handler composition and terminal invoker for the factory's lifetime.
pub struct ChainFactory {
    stack_for: Box<StackFn>,
    terminal: Arc<dyn Invoker>,
    cache: RwLock<HashMap<ChainKey, Arc<InterceptorChain>>>,
}

impl ChainFactory {
    /// Create a factory with a per-key interceptor stack selector.
    pub fn new<F>(stack_for: F, terminal: Arc<dyn Invoker>) -> Self
    where
        F: Fn(&ChainKey) -> Vec<Arc<dyn Interceptor>> + Send + Sync + 'static,
    {
        Self {
            stack_for: Box::new(stack_for),
            terminal,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Create a factory that composes the same stack for every key.
    pub fn uniform(interceptors: Vec<Arc<dyn Interceptor>>, terminal: Arc<dyn Invoker>) -> Self {
        Self::new(move |_| interceptors.clone(), terminal)
    }

    /// Build a fresh, uncached chain for a key.
    pub fn build(&self, key: &ChainKey) -> InterceptorChain {
        InterceptorChain::new((self.stack_for)(key), Arc::clone(&self.terminal))
    }

    /// Get the cached chain for a key, building it on first request.
    pub async fn chain_for(&self, key: &ChainKey) -> Arc<InterceptorChain> {
        if let Some(chain) = self.cache.read().await.get(key) {
            return Arc::clone(chain);
        }

        let mut cache = self.cache.write().await;
        // Double-checked: another writer may have built it meanwhile.
        if let Some(chain) = cache.get(key) {
            return Arc::clone(chain);
        }

        debug!(service = %key.target, operation = %key.operation, "Building interceptor chain");
        let chain = Arc::new(self.build(key));
        cache.insert(key.clone(), Arc::clone(&chain));
        chain
    }
}

/// Where callers obtain their chains from, and with what reuse semantics.
///
/// `Fixed` and `Cached` share chain instances across sequential calls and
/// rely on the cursor-reset discipline; `PerCall` builds a fresh chain for
/// every invocation and is the mode safe under concurrent calls.
#[derive(Clone)]
pub enum ChainProvider {
    /// One chain, built up front, shared across calls.
    Fixed(Arc<InterceptorChain>),
    /// Factory-cached chain per (target, operation).
    Cached(Arc<ChainFactory>),
    /// Fresh chain per call, composed by the factory.
    PerCall(Arc<ChainFactory>),
}

impl ChainProvider {
    /// Obtain the chain to drive one invocation with.
    pub async fn chain_for(&self, key: &ChainKey) -> Arc<InterceptorChain> {
        match self {
            ChainProvider::Fixed(chain) => Arc::clone(chain),
            ChainProvider::Cached(factory) => factory.chain_for(key).await,
            ChainProvider::PerCall(factory) => Arc::new(factory.build(key)),
        }
    }

    /// Construct a provider from a factory, honoring the per-call option.
    pub fn from_factory(factory: Arc<ChainFactory>, per_call: bool) -> Self {
        if per_call {
            ChainProvider::PerCall(factory)
        } else {
            ChainProvider::Cached(factory)
        }
    }
}
