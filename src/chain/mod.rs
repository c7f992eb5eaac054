//! Chain-of-responsibility dispatch.
//!
//! This module contains:
//! - `Interceptor` trait: a handler that may observe, mutate, or
//!   short-circuit a call
//! - `InterceptorChain`: ordered interceptors plus one terminal invoker,
//!   with a reusable traversal cursor
//! - `ChainFactory`: lazily built chains keyed by (target, operation)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{InvocationContext, Value};
use crate::invoker::{Invoker, Result};

mod factory;

pub use factory::{ChainFactory, ChainKey, ChainProvider};

#[cfg(test)]
mod tests;

/// Cursor value meaning "before the first interceptor".
const CURSOR_SENTINEL: usize = usize::MAX;

/// A handler in the chain.
///
/// An interceptor may:
/// - pass through: call `chain.invoke_next(ctx)` and return its result
/// - short-circuit: return without calling through, aborting the rest of
///   the chain and the terminal invoker
/// - wrap: mutate the context before and/or the result after calling through
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(
        &self,
        ctx: &mut InvocationContext,
        chain: &InterceptorChain,
    ) -> Result<Value>;
}

/// Ordered interceptors plus exactly one terminal invoker.
///
/// A single chain instance is reusable across sequential calls: `invoke`
/// resets the cursor before and after every top-level traversal, success or
/// failure. The cursor is not safe under concurrent traversals; overlapping
/// callers need one chain per call (see `ChainProvider::PerCall`) or
/// serialized access.
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
    terminal: Arc<dyn Invoker>,
    cursor: AtomicUsize,
}

impl InterceptorChain {
    /// Build a chain from ordered interceptors and a terminal invoker.
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>, terminal: Arc<dyn Invoker>) -> Self {
        Self {
            interceptors,
            terminal,
            cursor: AtomicUsize::new(CURSOR_SENTINEL),
        }
    }

    /// Number of interceptors ahead of the terminal invoker.
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Move the cursor back to its sentinel position.
    pub fn reset(&self) {
        self.cursor.store(CURSOR_SENTINEL, Ordering::Release);
    }

    /// Whether the cursor sits at its sentinel position (no traversal in
    /// flight).
    pub fn is_reset(&self) -> bool {
        self.cursor.load(Ordering::Acquire) == CURSOR_SENTINEL
    }

    /// Drive one top-level invocation through the whole chain.
    ///
    /// Resets the cursor before the traversal and again after it returns,
    /// whether it succeeded or failed, so the chain is immediately reusable
    /// for the next non-overlapping call.
    pub async fn invoke(&self, ctx: &mut InvocationContext) -> Result<Value> {
        self.reset();
        let result = self.invoke_next(ctx).await;
        self.reset();
        result
    }

    /// Advance to the next link: the interceptor at the new cursor position,
    /// or the terminal invoker once the interceptors are exhausted.
    ///
    /// Interceptors call this to continue the traversal they sit in. Errors
    /// from inner links propagate unchanged; the chain neither swallows nor
    /// retries.
    pub async fn invoke_next(&self, ctx: &mut InvocationContext) -> Result<Value> {
        // Sentinel wraps to position zero on the first advance.
        let position = self
            .cursor
            .fetch_add(1, Ordering::AcqRel)
            .wrapping_add(1);

        match self.interceptors.get(position) {
            Some(interceptor) => interceptor.intercept(ctx, self).await,
            None => self.terminal.invoke(ctx).await,
        }
    }
}
