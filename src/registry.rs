//! Service registry - resolves logical service identities to live local
//! instances.
//!
//! The registry backend (static table, discovery system, orchestrator
//! labels) is a collaborator; the dispatcher only needs `resolve`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::context::ServiceId;
use crate::invoker::MethodTable;

/// Resolves a logical service identity to a registered instance.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Look up a service. `None` means the identity is unknown here.
    async fn resolve(&self, service: &ServiceId) -> Option<Arc<MethodTable>>;
}

/// Thread-safe in-memory registry.
///
/// Services register their method tables at startup; the dispatcher resolves
/// against the map on every call.
#[derive(Default)]
pub struct InMemoryRegistry {
    services: RwLock<HashMap<ServiceId, Arc<MethodTable>>>,
}

impl InMemoryRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service's method table, replacing any previous entry.
    pub async fn register(&self, table: MethodTable) {
        let service = table.service().clone();
        info!(service = %service, operations = table.len(), "Registering service");
        self.services
            .write()
            .await
            .insert(service, Arc::new(table));
    }

    /// Remove a service.
    pub async fn remove(&self, service: &ServiceId) {
        if self.services.write().await.remove(service).is_some() {
            info!(service = %service, "Removed service");
        }
    }
}

#[async_trait]
impl ServiceRegistry for InMemoryRegistry {
    async fn resolve(&self, service: &ServiceId) -> Option<Arc<MethodTable>> {
        self.services.read().await.get(service).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Value;

    #[tokio::test]
    async fn test_resolve_registered_service() {
        let registry = InMemoryRegistry::new();
        registry
            .register(
                MethodTable::new("ledger")
                    .register("balance", |_| async { Ok(Value::from(0)) }),
            )
            .await;

        let table = registry.resolve(&"ledger".into()).await.unwrap();
        assert_eq!(table.service(), &ServiceId::from("ledger"));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_unknown_service() {
        let registry = InMemoryRegistry::new();
        assert!(registry.resolve(&"ghost".into()).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_service() {
        let registry = InMemoryRegistry::new();
        registry.register(MethodTable::new("ledger")).await;
        registry.remove(&"ledger".into()).await;
        assert!(registry.resolve(&"ledger".into()).await.is_none());
    }
}
