//! Cluster membership and member selection.
//!
//! Servers publish a membership record: connection parameters for a callable
//! stub, a host identity, a load metric, and a liveness flag. Consumers keep
//! the records fresh with a periodic keep-alive sweep and route calls to a
//! live, least-loaded member.
//!
//! Membership state is eventually consistent: a selection may briefly target
//! a member that has just become unreachable, in which case the caller sees
//! the transport failure and may retry after the next sweep.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::{InvocationContext, ServiceId, Value};
use crate::dispatch::Dispatcher;
use crate::invoker::{InvokeError, Invoker, RemoteInvoker, Result};
use crate::transport::{CallChannel, LoopbackChannel};

mod keepalive;

pub use keepalive::{spawn_keep_alive, KeepAliveConfig, KeepAliveWorker};


/// Identity of a cluster member.
pub type MemberId = Uuid;

/// Reports this process's current load. Lower is less loaded; `None` means
/// unknown, which excludes the member from load ranking without excluding it
/// from selection.
pub trait LoadMetric: Send + Sync {
    fn current_load(&self) -> Option<u64>;
}

/// Builds a callable stub from published connection parameters.
///
/// Membership gossip carries endpoints, never live stubs; each consumer
/// constructs its own channel on the receiving side.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &MemberEndpoint) -> Result<Arc<dyn CallChannel>>;
}

/// Connection parameters a member publishes when joining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberEndpoint {
    /// Host address, for connecting and diagnostics.
    pub address: String,
    pub port: u16,
    /// Service identity this member advertises.
    pub service: ServiceId,
}

impl MemberEndpoint {
    pub fn new(address: impl Into<String>, port: u16, service: impl Into<ServiceId>) -> Self {
        Self {
            address: address.into(),
            port,
            service: service.into(),
        }
    }
}

impl fmt::Display for MemberEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// One member's record in the membership table.
struct MemberRecord {
    endpoint: MemberEndpoint,
    channel: Arc<dyn CallChannel>,
    load: Option<u64>,
    alive: bool,
    ping_failures: u32,
}

/// Read-only view of a member, for diagnostics and tests.
#[derive(Debug, Clone)]
pub struct MemberView {
    pub id: MemberId,
    pub endpoint: MemberEndpoint,
    pub load: Option<u64>,
    pub alive: bool,
}

/// Shared membership table.
///
/// Read-mostly: selection takes the read lock, the keep-alive sweep is the
/// only writer besides join/leave.
#[derive(Default)]
pub struct Membership {
    members: RwLock<HashMap<MemberId, MemberRecord>>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member from its published endpoint, constructing the stub
    /// through the connector. New members start alive and unranked.
    pub async fn join(
        &self,
        endpoint: MemberEndpoint,
        connector: &dyn Connector,
    ) -> Result<MemberId> {
        let channel = connector.connect(&endpoint).await?;
        Ok(self.join_with_channel(endpoint, channel).await)
    }

    /// Add a member with an already-built stub.
    pub async fn join_with_channel(
        &self,
        endpoint: MemberEndpoint,
        channel: Arc<dyn CallChannel>,
    ) -> MemberId {
        let id = Uuid::new_v4();
        info!(member = %id, endpoint = %endpoint, "Member joined cluster");

        self.members.write().await.insert(
            id,
            MemberRecord {
                endpoint,
                channel,
                load: None,
                alive: true,
                ping_failures: 0,
            },
        );
        id
    }

    /// Publish this process as a member: a loopback stub over its own
    /// dispatcher plus a load metric provider.
    pub async fn join_local(
        &self,
        endpoint: MemberEndpoint,
        dispatcher: Arc<Dispatcher>,
        load: Arc<dyn LoadMetric>,
    ) -> MemberId {
        self.join_with_channel(endpoint, Arc::new(LoopbackChannel::with_load(dispatcher, load)))
            .await
    }

    /// Remove a member that left the cluster.
    pub async fn leave(&self, id: MemberId) {
        if self.members.write().await.remove(&id).is_some() {
            info!(member = %id, "Member left cluster");
        }
    }

    /// Number of known members, alive or not.
    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }

    /// Snapshot of all member records.
    pub async fn snapshot(&self) -> Vec<MemberView> {
        self.members
            .read()
            .await
            .iter()
            .map(|(id, m)| MemberView {
                id: *id,
                endpoint: m.endpoint.clone(),
                load: m.load,
                alive: m.alive,
            })
            .collect()
    }

    /// Pick a member to call: alive, preferring the lowest known load.
    ///
    /// Members without a load metric are acceptable only when no alive
    /// member reports one. An empty alive set is an error distinct from
    /// target resolution failure: the cluster has nobody to ask at all.
    pub async fn select(&self) -> Result<SelectedMember> {
        let members = self.members.read().await;

        let mut best: Option<(&MemberId, &MemberRecord)> = None;
        for (id, member) in members.iter().filter(|(_, m)| m.alive) {
            best = match best {
                None => Some((id, member)),
                Some((_, current)) => {
                    if prefer(member, current) {
                        Some((id, member))
                    } else {
                        best
                    }
                }
            };
        }

        match best {
            Some((id, member)) => {
                debug!(member = %id, endpoint = %member.endpoint, load = ?member.load, "Selected cluster member");
                Ok(SelectedMember {
                    id: *id,
                    endpoint: member.endpoint.clone(),
                    channel: Arc::clone(&member.channel),
                })
            }
            None => Err(InvokeError::NoAvailableMember),
        }
    }

    /// Record a successful liveness probe: the member is reachable again and
    /// its load metric is current.
    pub(crate) async fn record_ping_success(&self, id: MemberId, load: Option<u64>) {
        if let Some(member) = self.members.write().await.get_mut(&id) {
            if !member.alive {
                info!(member = %id, endpoint = %member.endpoint, "Member reachable again");
            }
            member.alive = true;
            member.ping_failures = 0;
            member.load = load;
        }
    }

    /// Record a failed liveness probe; past the threshold the member is
    /// excluded from selection until a probe succeeds.
    pub(crate) async fn record_ping_failure(&self, id: MemberId, failure_threshold: u32) {
        if let Some(member) = self.members.write().await.get_mut(&id) {
            member.ping_failures = member.ping_failures.saturating_add(1);
            if member.alive && member.ping_failures >= failure_threshold {
                warn!(
                    member = %id,
                    endpoint = %member.endpoint,
                    failures = member.ping_failures,
                    "Member unreachable, excluding from selection"
                );
                member.alive = false;
            }
        }
    }

    /// Channels to probe, collected under the read lock.
    pub(crate) async fn probe_targets(&self) -> Vec<(MemberId, Arc<dyn CallChannel>)> {
        self.members
            .read()
            .await
            .iter()
            .map(|(id, m)| (*id, Arc::clone(&m.channel)))
            .collect()
    }
}

/// Lower known load beats higher; any known load beats unknown.
fn prefer(candidate: &MemberRecord, current: &MemberRecord) -> bool {
    match (candidate.load, current.load) {
        (Some(a), Some(b)) => a < b,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Outcome of a selection: enough to call the member and to report which
/// member failed if the call does.
#[derive(Clone)]
pub struct SelectedMember {
    pub id: MemberId,
    pub endpoint: MemberEndpoint,
    pub channel: Arc<dyn CallChannel>,
}

impl std::fmt::Debug for SelectedMember {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedMember")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Invoker that routes each call to a freshly selected cluster member.
///
/// No automatic failover: a member that dies between selection and call
/// surfaces as a transport error, and the next call selects from the
/// refreshed alive set.
pub struct ClusterInvoker {
    membership: Arc<Membership>,
}

impl ClusterInvoker {
    pub fn new(membership: Arc<Membership>) -> Self {
        Self { membership }
    }
}

#[async_trait]
impl Invoker for ClusterInvoker {
    async fn invoke(&self, ctx: &mut InvocationContext) -> Result<Value> {
        let selected = self.membership.select().await?;
        RemoteInvoker::new(selected.channel).invoke(ctx).await
    }
}
