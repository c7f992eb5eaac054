//! Stock interceptors for cross-cutting concerns.
//!
//! These add orthogonal behavior (timing, caller metadata) without touching
//! service logic. Compose them into chains at construction time.

use std::time::Instant;

use async_trait::async_trait;

use crate::chain::{Interceptor, InterceptorChain};
use crate::context::{InvocationContext, Value, CALLER_ADDRESS_ATTR};
use crate::invoker::Result;

/// Logs each invocation's operation, outcome, and elapsed time.
#[derive(Debug, Default)]
pub struct Instrumented;

impl Instrumented {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Interceptor for Instrumented {
    async fn intercept(
        &self,
        ctx: &mut InvocationContext,
        chain: &InterceptorChain,
    ) -> Result<Value> {
        let start = Instant::now();
        let operation = ctx.operation.clone();

        let result = chain.invoke_next(ctx).await;

        tracing::debug!(
            operation = %operation,
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Invocation completed"
        );
        result
    }
}

/// Stamps the caller's network address attribute if the context does not
/// already carry one. Useful on transport edges where the peer address is
/// known to the endpoint but not to the application.
pub struct CallerAddress {
    address: String,
}

impl CallerAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl Interceptor for CallerAddress {
    async fn intercept(
        &self,
        ctx: &mut InvocationContext,
        chain: &InterceptorChain,
    ) -> Result<Value> {
        if ctx.attribute(CALLER_ADDRESS_ATTR).is_none() {
            ctx.set_attribute(CALLER_ADDRESS_ATTR, Value::String(self.address.clone()));
        }
        chain.invoke_next(ctx).await
    }
}
