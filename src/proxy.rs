//! Client-side proxy: invoke a remote service as if it were local.
//!
//! The proxy is generic over operations: callers name the operation and
//! supply the argument list, the proxy builds the invocation context and
//! drives the configured chain. Per-interface typed wrappers, where wanted,
//! are thin shims over `call`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::chain::{ChainFactory, ChainKey, ChainProvider, InterceptorChain};
use crate::config::ConfigError;
use crate::context::{InvocationContext, OperationId, ServiceId, Value};
use crate::invoker::Result;

/// Generic client proxy bound to one target service.
///
/// Calls are synchronous from the caller's point of view: `call` returns the
/// invocation's result or propagates its error. With a shared chain source
/// (`Fixed`/`Cached`), callers must not overlap invocations through the same
/// proxy; configure `per_call_chains` for concurrency-safe use.
pub struct ServiceProxy {
    target: ServiceId,
    chains: ChainProvider,
    base_attributes: HashMap<String, Value>,
}

impl std::fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("target", &self.target)
            .field("base_attributes", &self.base_attributes)
            .finish_non_exhaustive()
    }
}

impl ServiceProxy {
    pub fn builder() -> ProxyBuilder {
        ProxyBuilder::default()
    }

    /// The target service this proxy addresses.
    pub fn target(&self) -> &ServiceId {
        &self.target
    }

    /// Invoke an operation.
    ///
    /// Builds a fresh context (target, operation, parameters, the proxy's
    /// base attributes), obtains a chain, and drives it to completion.
    pub async fn call(
        &self,
        operation: impl Into<OperationId>,
        parameters: Vec<Value>,
    ) -> Result<Value> {
        let operation = operation.into();
        let mut ctx = InvocationContext::new(
            Some(self.target.clone()),
            operation.clone(),
            parameters,
        );
        for (key, value) in &self.base_attributes {
            ctx.set_attribute(key.clone(), value.clone());
        }

        let key = ChainKey {
            target: self.target.clone(),
            operation,
        };
        let chain = self.chains.chain_for(&key).await;
        chain.invoke(&mut ctx).await
    }
}

/// Builder for `ServiceProxy`.
///
/// Construction validates the configuration: a proxy without a target or a
/// chain source is a startup error, not a per-call one.
#[derive(Default)]
pub struct ProxyBuilder {
    target: Option<ServiceId>,
    fixed_chain: Option<Arc<InterceptorChain>>,
    factory: Option<Arc<ChainFactory>>,
    per_call_chains: bool,
    attributes: HashMap<String, Value>,
}

impl ProxyBuilder {
    /// Target service identity. Required.
    pub fn target(mut self, target: impl Into<ServiceId>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Use one chain, built up front, for every call.
    pub fn fixed_chain(mut self, chain: Arc<InterceptorChain>) -> Self {
        self.fixed_chain = Some(chain);
        self
    }

    /// Obtain chains from a factory keyed by (target, operation).
    pub fn chain_factory(mut self, factory: Arc<ChainFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Build a fresh chain per call. Requires a chain factory; makes
    /// concurrent calls through the proxy safe.
    pub fn per_call_chains(mut self, per_call: bool) -> Self {
        self.per_call_chains = per_call;
        self
    }

    /// Attribute stamped on every outgoing context (e.g. caller address).
    pub fn attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn build(self) -> std::result::Result<ServiceProxy, ConfigError> {
        let target = self.target.ok_or(ConfigError::MissingTarget)?;

        let chains = match (self.fixed_chain, self.factory) {
            (Some(_), _) if self.per_call_chains => {
                return Err(ConfigError::InvalidOption(
                    "per-call chains require a chain factory, not a fixed chain".into(),
                ))
            }
            (Some(chain), _) => ChainProvider::Fixed(chain),
            (None, Some(factory)) => ChainProvider::from_factory(factory, self.per_call_chains),
            (None, None) => return Err(ConfigError::MissingChain),
        };

        Ok(ServiceProxy {
            target,
            chains,
            base_attributes: self.attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InterceptorChain;
    use crate::test_utils::MockInvoker;

    fn mock_chain(invoker: Arc<MockInvoker>) -> Arc<InterceptorChain> {
        Arc::new(InterceptorChain::new(vec![], invoker))
    }

    #[tokio::test]
    async fn test_call_builds_context_and_returns_result() {
        let invoker = Arc::new(MockInvoker::returning(Value::from("pong")));
        let proxy = ServiceProxy::builder()
            .target("echo")
            .fixed_chain(mock_chain(Arc::clone(&invoker)))
            .build()
            .unwrap();

        let result = proxy.call("ping", vec![Value::from(1)]).await.unwrap();

        assert_eq!(result, Value::from("pong"));
        assert_eq!(
            invoker.invoked_operations().await,
            vec![OperationId::from("ping")]
        );
    }

    #[tokio::test]
    async fn test_missing_target_is_config_error() {
        let invoker = Arc::new(MockInvoker::new());
        let err = ServiceProxy::builder()
            .fixed_chain(mock_chain(invoker))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingTarget));
    }

    #[tokio::test]
    async fn test_missing_chain_source_is_config_error() {
        let err = ServiceProxy::builder().target("echo").build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingChain));
    }

    #[tokio::test]
    async fn test_base_attributes_stamped_on_context() {
        let invoker = Arc::new(MockInvoker::new());
        let proxy = ServiceProxy::builder()
            .target("echo")
            .fixed_chain(mock_chain(Arc::clone(&invoker)))
            .attribute("caller.address", Value::from("10.1.1.1"))
            .build()
            .unwrap();

        proxy.call("ping", vec![]).await.unwrap();

        let seen = invoker.last_context().await.unwrap();
        assert_eq!(seen.attribute("caller.address"), Some(&Value::from("10.1.1.1")));
    }
}
