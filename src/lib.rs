//! Trestle - remote invocation dispatch.
//!
//! A proxy-based RPC layer: callers invoke a service interface as if it were
//! local while execution happens in another process. Calls flow through an
//! ordered interceptor chain to a terminal invoker, optionally decoupled
//! through a fire-and-forget queue with bounded retries, and optionally
//! routed to a cluster member selected by liveness and load.
//!
//! The wire protocol, registry backend, and load metric computation are
//! collaborator seams (`transport::CallChannel`, `registry::ServiceRegistry`,
//! `cluster::LoadMetric`); in-memory implementations of each ship with the
//! crate.

pub mod bootstrap;
pub mod chain;
pub mod cluster;
pub mod codec;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod interceptors;
pub mod invoker;
pub mod proxy;
pub mod registry;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
