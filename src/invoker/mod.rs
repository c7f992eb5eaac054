//! Invoker contract: the terminal capability that executes a resolved call.
//!
//! This module contains:
//! - `Invoker` trait: executes one invocation against a concrete target
//! - `InvokeError`: the error taxonomy shared by chains and dispatchers
//! - Implementations: local (registration-table) and remote (stub-forwarding)

use async_trait::async_trait;

use crate::context::{InvocationContext, OperationId, Value};

mod local;
mod remote;

pub use local::{LocalInvoker, Method, MethodTable};
pub use remote::RemoteInvoker;

/// Result type for invocation operations.
pub type Result<T> = std::result::Result<T, InvokeError>;

/// Errors that can occur while driving an invocation.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("Access denied: target '{target}' does not match allowed target '{allowed}'")]
    AccessDenied { target: String, allowed: String },

    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Operation not found: {0}")]
    OperationNotFound(OperationId),

    #[error("Invocation failed: {0}")]
    Invocation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("No alive cluster member available")]
    NoAvailableMember,
}

impl InvokeError {
    /// Whether a queued invocation that failed with this error is worth
    /// retrying. Access control and target resolution failures will not
    /// succeed on retry; everything else might.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            InvokeError::AccessDenied { .. } | InvokeError::TargetNotFound(_)
        )
    }
}

/// Terminal executor for one invocation.
///
/// Implementations:
/// - `LocalInvoker`: executes against a registered method table
/// - `RemoteInvoker`: forwards through a transport stub
/// - `cluster::ClusterInvoker`: forwards to a selected cluster member
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Execute the call described by the context and return its result.
    async fn invoke(&self, ctx: &mut InvocationContext) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(!InvokeError::AccessDenied {
            target: "a".into(),
            allowed: "b".into()
        }
        .is_retryable());
        assert!(!InvokeError::TargetNotFound("a".into()).is_retryable());

        assert!(InvokeError::Invocation("boom".into()).is_retryable());
        assert!(InvokeError::Transport("reset".into()).is_retryable());
        assert!(InvokeError::NoAvailableMember.is_retryable());
    }
}
