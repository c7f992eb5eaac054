//! Invocation context: the data carrier for one call.
//!
//! A context is created once per call by a client proxy (or a transport
//! endpoint on the server side), flows through zero or more interceptors and
//! exactly one terminal invoker, and is discarded when the call completes.
//! Contexts are never shared between concurrent calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::invoker::MethodTable;

pub use serde_json::Value;

/// Attribute key for the caller's network address.
pub const CALLER_ADDRESS_ATTR: &str = "caller.address";

/// Logical identity of a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId(String);

impl ServiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ServiceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identity of an operation on a service (e.g. a method name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for OperationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The call target: a logical identity to be resolved later, or a concrete
/// method table resolved by the server dispatcher.
#[derive(Clone)]
pub enum TargetRef {
    /// Logical identity; resolution happens on the server side.
    Named(ServiceId),
    /// Concrete local instance, ready for the terminal invoker.
    Resolved(Arc<MethodTable>),
}

impl fmt::Debug for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetRef::Named(id) => write!(f, "Named({})", id),
            TargetRef::Resolved(table) => write!(f, "Resolved({})", table.service()),
        }
    }
}

/// Carrier for one invocation: target, operation, parameters, and a bag of
/// out-of-band attributes that interceptors may read and write.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    /// Object to invoke. May be absent; the dispatcher falls back to its
    /// configured default target.
    pub target: Option<TargetRef>,
    /// Operation to invoke on the target.
    pub operation: OperationId,
    /// Ordered call arguments. A dispatcher may replace the whole list in
    /// place, e.g. after decoding a wire-encoded parameter block.
    pub parameters: Vec<Value>,
    /// String-keyed metadata (e.g. caller network address).
    pub attributes: HashMap<String, Value>,
}

impl InvocationContext {
    /// Create a context for a named (or anonymous) target.
    pub fn new(
        target: Option<ServiceId>,
        operation: impl Into<OperationId>,
        parameters: Vec<Value>,
    ) -> Self {
        Self {
            target: target.map(TargetRef::Named),
            operation: operation.into(),
            parameters,
            attributes: HashMap::new(),
        }
    }

    /// Read an attribute.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Write an attribute, replacing any previous value.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    /// The target's logical identity, if it carries one.
    pub fn target_id(&self) -> Option<&ServiceId> {
        match &self.target {
            Some(TargetRef::Named(id)) => Some(id),
            Some(TargetRef::Resolved(table)) => Some(table.service()),
            None => None,
        }
    }

    /// The resolved method table, if the dispatcher has resolved one.
    pub fn resolved_target(&self) -> Option<&Arc<MethodTable>> {
        match &self.target {
            Some(TargetRef::Resolved(table)) => Some(table),
            _ => None,
        }
    }

    /// Clone for transport: an independent context whose target is reduced
    /// to its logical identity. Resolved instances never cross a process
    /// boundary; the receiving side resolves its own.
    pub fn to_wire(&self) -> Self {
        let mut wire = self.clone();
        wire.target = self.target_id().cloned().map(TargetRef::Named);
        wire
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_round_trip() {
        let mut ctx = InvocationContext::new(Some("billing".into()), "charge", vec![]);
        assert!(ctx.attribute(CALLER_ADDRESS_ATTR).is_none());

        ctx.set_attribute(CALLER_ADDRESS_ATTR, Value::String("10.0.0.7".into()));
        assert_eq!(
            ctx.attribute(CALLER_ADDRESS_ATTR),
            Some(&Value::String("10.0.0.7".into()))
        );
    }

    #[test]
    fn test_target_id_for_named_target() {
        let ctx = InvocationContext::new(Some("billing".into()), "charge", vec![]);
        assert_eq!(ctx.target_id(), Some(&ServiceId::from("billing")));
    }

    #[test]
    fn test_wire_clone_is_independent() {
        let mut ctx = InvocationContext::new(Some("billing".into()), "charge", vec![Value::from(1)]);
        let mut wire = ctx.to_wire();

        wire.parameters.push(Value::from(2));
        wire.set_attribute("k", Value::from("v"));

        assert_eq!(ctx.parameters.len(), 1);
        assert!(ctx.attribute("k").is_none());
        ctx.parameters.clear();
        assert_eq!(wire.parameters.len(), 2);
    }
}
