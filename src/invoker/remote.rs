//! Remote-forwarding invoker.
//!
//! Forwards an invocation through a transport stub to a dispatcher in
//! another process. The wire format belongs to the transport; this invoker
//! only reduces the context to its transportable form.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Invoker, Result};
use crate::context::{InvocationContext, Value};
use crate::transport::CallChannel;

/// Invoker that forwards through a `CallChannel` stub.
pub struct RemoteInvoker {
    channel: Arc<dyn CallChannel>,
}

impl RemoteInvoker {
    /// Wrap a transport stub.
    pub fn new(channel: Arc<dyn CallChannel>) -> Self {
        Self { channel }
    }

    /// The underlying stub.
    pub fn channel(&self) -> &Arc<dyn CallChannel> {
        &self.channel
    }
}

#[async_trait]
impl Invoker for RemoteInvoker {
    async fn invoke(&self, ctx: &mut InvocationContext) -> Result<Value> {
        self.channel.call(ctx.to_wire()).await
    }
}
