//! Test utilities and mock implementations.
//!
//! Mock implementations of the core traits for testing chains, dispatchers,
//! and cluster behavior without real services or transports.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::chain::{Interceptor, InterceptorChain};
use crate::context::{InvocationContext, OperationId, Value};
use crate::invoker::{InvokeError, Invoker, Result};
use crate::transport::CallChannel;

/// Factory producing the error a mock should fail with.
type ErrorFactory = Box<dyn Fn() -> InvokeError + Send + Sync>;

/// Mock terminal invoker that records the contexts it is driven with.
#[derive(Default)]
pub struct MockInvoker {
    result: RwLock<Value>,
    failure: RwLock<Option<ErrorFactory>>,
    invocations: RwLock<Vec<InvocationContext>>,
}

impl MockInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that returns a fixed value.
    pub fn returning(value: Value) -> Self {
        Self {
            result: RwLock::new(value),
            ..Self::default()
        }
    }

    /// Make every subsequent invocation fail with the produced error.
    pub async fn set_failure<F>(&self, factory: F)
    where
        F: Fn() -> InvokeError + Send + Sync + 'static,
    {
        *self.failure.write().await = Some(Box::new(factory));
    }

    /// Revert to returning the configured value.
    pub async fn clear_failure(&self) {
        *self.failure.write().await = None;
    }

    /// How many times `invoke` ran.
    pub async fn invocation_count(&self) -> usize {
        self.invocations.read().await.len()
    }

    /// Operations seen, in invocation order.
    pub async fn invoked_operations(&self) -> Vec<OperationId> {
        self.invocations
            .read()
            .await
            .iter()
            .map(|ctx| ctx.operation.clone())
            .collect()
    }

    /// The most recently recorded context.
    pub async fn last_context(&self) -> Option<InvocationContext> {
        self.invocations.read().await.last().cloned()
    }
}

#[async_trait]
impl Invoker for MockInvoker {
    async fn invoke(&self, ctx: &mut InvocationContext) -> Result<Value> {
        self.invocations.write().await.push(ctx.clone());

        if let Some(factory) = self.failure.read().await.as_ref() {
            return Err(factory());
        }
        Ok(self.result.read().await.clone())
    }
}

/// Interceptor that appends its name to a shared log, then calls through.
pub struct RecordingInterceptor {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingInterceptor {
    pub fn new(name: impl Into<String>, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.into(),
            log,
        }
    }
}

#[async_trait]
impl Interceptor for RecordingInterceptor {
    async fn intercept(
        &self,
        ctx: &mut InvocationContext,
        chain: &InterceptorChain,
    ) -> Result<Value> {
        self.log.lock().unwrap().push(self.name.clone());
        chain.invoke_next(ctx).await
    }
}

/// Interceptor that returns a fixed value without calling through.
pub struct ShortCircuitInterceptor {
    value: Value,
}

impl ShortCircuitInterceptor {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

#[async_trait]
impl Interceptor for ShortCircuitInterceptor {
    async fn intercept(
        &self,
        _ctx: &mut InvocationContext,
        _chain: &InterceptorChain,
    ) -> Result<Value> {
        Ok(self.value.clone())
    }
}

/// Interceptor that fails without calling through.
pub struct FailingInterceptor {
    message: String,
}

impl FailingInterceptor {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Interceptor for FailingInterceptor {
    async fn intercept(
        &self,
        _ctx: &mut InvocationContext,
        _chain: &InterceptorChain,
    ) -> Result<Value> {
        Err(InvokeError::Invocation(self.message.clone()))
    }
}

/// Transport stub with switchable liveness, for keep-alive and selection
/// tests.
pub struct FlakyChannel {
    alive: RwLock<bool>,
    load: RwLock<Option<u64>>,
    call_result: RwLock<Value>,
    calls: AtomicUsize,
    pings: AtomicUsize,
}

impl FlakyChannel {
    pub fn new() -> Self {
        Self {
            alive: RwLock::new(true),
            load: RwLock::new(None),
            call_result: RwLock::new(Value::Null),
            calls: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
        }
    }

    pub fn with_load(load: u64) -> Self {
        let channel = Self::new();
        *channel.load.try_write().unwrap() = Some(load);
        channel
    }

    pub async fn set_alive(&self, alive: bool) {
        *self.alive.write().await = alive;
    }

    pub async fn set_load(&self, load: Option<u64>) {
        *self.load.write().await = load;
    }

    pub async fn set_call_result(&self, value: Value) {
        *self.call_result.write().await = value;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

impl Default for FlakyChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallChannel for FlakyChannel {
    async fn call(&self, _ctx: InvocationContext) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.alive.read().await {
            Ok(self.call_result.read().await.clone())
        } else {
            Err(InvokeError::Transport("connection refused".into()))
        }
    }

    async fn ping(&self) -> Result<Option<u64>> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if *self.alive.read().await {
            Ok(*self.load.read().await)
        } else {
            Err(InvokeError::Transport("ping timed out".into()))
        }
    }
}

/// Build a context targeting a named service.
pub fn make_context(
    target: Option<&str>,
    operation: &str,
    parameters: Vec<Value>,
) -> InvocationContext {
    InvocationContext::new(target.map(Into::into), operation, parameters)
}
