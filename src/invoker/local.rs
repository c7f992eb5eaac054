//! Local terminal invoker backed by an explicit method registration table.
//!
//! Services register their operations as async callables at startup; the
//! invoker looks the operation up by identity and executes it. No runtime
//! reflection is involved.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::{InvokeError, Invoker, Result};
use crate::context::{InvocationContext, OperationId, ServiceId, TargetRef, Value};

/// A registered operation: takes the call arguments, returns the result.
pub type Method = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Registration table mapping operation identities to callables for one
/// service instance. Built once at startup, immutable afterwards.
pub struct MethodTable {
    service: ServiceId,
    methods: HashMap<OperationId, Method>,
}

impl MethodTable {
    /// Create an empty table for a service.
    pub fn new(service: impl Into<ServiceId>) -> Self {
        Self {
            service: service.into(),
            methods: HashMap::new(),
        }
    }

    /// Register an operation. Builder-style; later registrations under the
    /// same identity replace earlier ones.
    pub fn register<F, Fut>(mut self, operation: impl Into<OperationId>, method: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        self.methods.insert(
            operation.into(),
            Arc::new(move |params| Box::pin(method(params))),
        );
        self
    }

    /// The service this table belongs to.
    pub fn service(&self) -> &ServiceId {
        &self.service
    }

    /// Look up a registered operation.
    pub fn method(&self, operation: &OperationId) -> Option<&Method> {
        self.methods.get(operation)
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("service", &self.service)
            .field("operations", &self.methods.len())
            .finish()
    }
}

/// Terminal invoker that executes against a resolved method table.
///
/// Requires the dispatcher (or caller) to have replaced the context target
/// with a resolved instance; a still-named or absent target is a resolution
/// failure, not an execution failure.
#[derive(Debug, Default)]
pub struct LocalInvoker;

impl LocalInvoker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Invoker for LocalInvoker {
    async fn invoke(&self, ctx: &mut InvocationContext) -> Result<Value> {
        let table = match &ctx.target {
            Some(TargetRef::Resolved(table)) => Arc::clone(table),
            Some(TargetRef::Named(id)) => {
                return Err(InvokeError::TargetNotFound(id.to_string()))
            }
            None => return Err(InvokeError::TargetNotFound("no target in context".into())),
        };

        let method = table
            .method(&ctx.operation)
            .ok_or_else(|| InvokeError::OperationNotFound(ctx.operation.clone()))?;

        method(ctx.parameters.clone()).await
    }
}
