//! Server-side dispatch.
//!
//! This module contains:
//! - `Dispatcher`: the synchronous entry point a transport endpoint calls
//! - `queue`: the queue-mediated, fire-and-forget delivery path

use std::sync::Arc;

use tracing::{error, warn};

use crate::chain::{ChainFactory, ChainKey, ChainProvider, InterceptorChain};
use crate::codec::{self, WireCodec};
use crate::config::{ConfigError, DispatchConfig};
use crate::context::{InvocationContext, ServiceId, TargetRef, Value};
use crate::invoker::{InvokeError, Result};
use crate::registry::ServiceRegistry;

pub mod queue;

pub use queue::{DispatchQueue, QueueConfig, QueueWorker};


/// Terminal server-side dispatcher.
///
/// Resolves the real target from the context, authorizes it against the
/// configured allow-list, optionally decodes wire-encoded parameters, and
/// drives the chain to completion.
pub struct Dispatcher {
    allowed_target: Option<ServiceId>,
    default_target: Option<ServiceId>,
    registry: Arc<dyn ServiceRegistry>,
    chains: ChainProvider,
    codec: Option<Arc<dyn WireCodec>>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Dispatch one invocation.
    ///
    /// Access and resolution failures surface typed; chain and terminal
    /// failures propagate unchanged after being logged. Nothing is retried
    /// here - retry policy belongs to callers such as the queue consumer.
    pub async fn dispatch(&self, ctx: &mut InvocationContext) -> Result<Value> {
        let result = self.dispatch_inner(ctx).await;

        if let Err(e) = &result {
            match e {
                InvokeError::AccessDenied { .. } | InvokeError::TargetNotFound(_) => {
                    warn!(operation = %ctx.operation, error = %e, "Dispatch rejected");
                }
                _ => {
                    error!(operation = %ctx.operation, error = %e, "Dispatch failed");
                }
            }
        }
        result
    }

    async fn dispatch_inner(&self, ctx: &mut InvocationContext) -> Result<Value> {
        let service = self.authorize(ctx)?;

        let table = self
            .registry
            .resolve(&service)
            .await
            .ok_or_else(|| InvokeError::TargetNotFound(service.to_string()))?;
        ctx.target = Some(TargetRef::Resolved(table));

        if let Some(wire_codec) = &self.codec {
            decode_parameters_in_place(wire_codec.as_ref(), ctx)?;
        }

        let key = ChainKey {
            target: service,
            operation: ctx.operation.clone(),
        };
        let chain = self.chains.chain_for(&key).await;
        let value = chain.invoke(ctx).await?;

        // Encoding applies to successful results only.
        match &self.codec {
            Some(wire_codec) => {
                let bytes = wire_codec.encode(&value)?;
                Ok(codec::to_wire_block(&bytes))
            }
            None => Ok(value),
        }
    }

    /// Decide which service identity this call may execute against.
    ///
    /// A context target matching the allow-list (or any target when no
    /// allow-list is configured) wins; an absent target falls back to the
    /// default identity; a mismatch is denied without executing anything.
    fn authorize(&self, ctx: &InvocationContext) -> Result<ServiceId> {
        match ctx.target_id() {
            Some(named) => {
                if let Some(allowed) = &self.allowed_target {
                    if named != allowed {
                        return Err(InvokeError::AccessDenied {
                            target: named.to_string(),
                            allowed: allowed.to_string(),
                        });
                    }
                }
                Ok(named.clone())
            }
            None => self
                .default_target
                .clone()
                .ok_or_else(|| {
                    InvokeError::TargetNotFound(
                        "context carries no target and no default target is configured".into(),
                    )
                }),
        }
    }
}

fn decode_parameters_in_place(wire_codec: &dyn WireCodec, ctx: &mut InvocationContext) -> Result<()> {
    // Wire-encoded calls carry the whole argument list as one block.
    let block = match ctx.parameters.as_slice() {
        [single] => codec::from_wire_block(single)?,
        _ => {
            return Err(InvokeError::Codec(format!(
                "expected a single wire parameter block, got {} parameters",
                ctx.parameters.len()
            )))
        }
    };
    ctx.parameters = wire_codec.decode_parameters(&block)?;
    Ok(())
}

/// Builder for `Dispatcher`.
#[derive(Default)]
pub struct DispatcherBuilder {
    allowed_target: Option<ServiceId>,
    default_target: Option<ServiceId>,
    registry: Option<Arc<dyn ServiceRegistry>>,
    fixed_chain: Option<Arc<InterceptorChain>>,
    factory: Option<Arc<ChainFactory>>,
    per_call_chains: bool,
    codec: Option<Arc<dyn WireCodec>>,
}

impl DispatcherBuilder {
    /// Apply target and chain options from a config.
    pub fn with_config(mut self, config: &DispatchConfig) -> Self {
        self.allowed_target = config.allowed_target.clone().map(ServiceId::from);
        self.default_target = config.default_target.clone().map(ServiceId::from);
        self.per_call_chains = config.create_chain_per_call;
        self
    }

    /// Restrict explicit targets to this identity.
    pub fn allowed_target(mut self, target: impl Into<ServiceId>) -> Self {
        self.allowed_target = Some(target.into());
        self
    }

    /// Fallback identity for contexts without a target.
    pub fn default_target(mut self, target: impl Into<ServiceId>) -> Self {
        self.default_target = Some(target.into());
        self
    }

    /// Registry used to resolve identities to instances. Required.
    pub fn registry(mut self, registry: Arc<dyn ServiceRegistry>) -> Self {
        self.registry = Some(registry);
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

    /// Build a fresh chain per dispatched call.
    pub fn per_call_chains(mut self, per_call: bool) -> Self {
        self.per_call_chains = per_call;
        self
    }

    /// Wire codec applied at this process boundary.
    pub fn codec(mut self, codec: Arc<dyn WireCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn build(self) -> std::result::Result<Dispatcher, ConfigError> {
        let registry = self.registry.ok_or(ConfigError::MissingRegistry)?;

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

        Ok(Dispatcher {
            allowed_target: self.allowed_target,
            default_target: self.default_target,
            registry,
            chains,
            codec: self.codec,
        })
    }
}
