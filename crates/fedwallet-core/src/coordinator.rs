use crate::error::MembershipError;
use crate::registry::FederationRegistry;
use fedwallet_sync::{BackendError, WalletBackend};
use fedwallet_types::{FederationId, FederationIdentity};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Whether funds can leave a federation, and where to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEligibility {
    /// Other registered federations, in registry order
    Eligible { destinations: Vec<FederationIdentity> },
    /// The wallet belongs to fewer than two federations
    NeedsAnotherFederation,
    /// The source federation is not registered
    UnknownFederation,
}

impl TransferEligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, TransferEligibility::Eligible { .. })
    }
}

/// Gates transfers and carries out membership removal.
///
/// Removals of the same federation are serialized; removals of different
/// federations proceed independently.
pub struct TransferRemovalCoordinator {
    backend: Arc<dyn WalletBackend>,
    registry: Arc<FederationRegistry>,
    removal_locks: Mutex<HashMap<FederationId, Arc<Mutex<()>>>>,
}

impl TransferRemovalCoordinator {
    pub fn new(backend: Arc<dyn WalletBackend>, registry: Arc<FederationRegistry>) -> Self {
        Self {
            backend,
            registry,
            removal_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn transfer_check(&self, id: &FederationId) -> TransferEligibility {
        let members = self.registry.list().await;
        if members.len() < 2 {
            return TransferEligibility::NeedsAnotherFederation;
        }
        if !members.iter().any(|identity| &identity.id == id) {
            return TransferEligibility::UnknownFederation;
        }

        TransferEligibility::Eligible {
            destinations: members.into_iter().filter(|identity| &identity.id != id).collect(),
        }
    }

    pub async fn can_transfer(&self, id: &FederationId) -> bool {
        self.transfer_check(id).await.is_eligible()
    }

    /// Leave a federation.
    ///
    /// The backend is asked first; the registry only changes once it
    /// agrees. Failures are returned as-is and never retried.
    pub async fn remove(&self, id: &FederationId) -> Result<FederationIdentity, MembershipError> {
        let lock = self.lock_for(id).await;
        let result = {
            let _guard = lock.lock().await;
            self.remove_locked(id).await
        };
        drop(lock);
        self.release_lock(id).await;
        result
    }

    async fn remove_locked(&self, id: &FederationId) -> Result<FederationIdentity, MembershipError> {
        if !self.registry.contains(id).await {
            return Err(MembershipError::NotFound(id.clone()));
        }

        debug!(federation_id = %id, "Removing federation from wallet backend");
        match self.backend.remove_federation(id).await {
            Ok(()) => {}
            Err(BackendError::NotFound(message)) => {
                warn!(federation_id = %id, "Backend no longer knows federation: {}", message);
                if let Err(e) = self.registry.refresh(self.backend.as_ref()).await {
                    warn!(kind = %e.kind(), "Registry refresh failed: {}", e);
                }
                return Err(MembershipError::NotFound(id.clone()));
            }
            Err(e) => {
                warn!(federation_id = %id, kind = %e.kind(), "Failed to remove federation: {}", e);
                return Err(MembershipError::Backend(e));
            }
        }

        let removed = self.registry.remove(id).await?;
        info!(federation_id = %id, "Left federation");

        if let Err(e) = self.registry.refresh(self.backend.as_ref()).await {
            warn!(kind = %e.kind(), "Registry refresh after removal failed: {}", e);
        }
        Ok(removed)
    }

    async fn lock_for(&self, id: &FederationId) -> Arc<Mutex<()>> {
        let mut locks = self.removal_locks.lock().await;
        Arc::clone(locks.entry(id.clone()).or_default())
    }

    async fn release_lock(&self, id: &FederationId) {
        let mut locks = self.removal_locks.lock().await;
        if locks.get(id).map_or(false, |lock| Arc::strong_count(lock) == 1) {
            locks.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedwallet_sync::{BackendCall, MemoryBackend};

    async fn setup(ids: &[&str]) -> (Arc<MemoryBackend>, Arc<FederationRegistry>, Arc<TransferRemovalCoordinator>) {
        let backend = Arc::new(MemoryBackend::new());
        let registry = Arc::new(FederationRegistry::new());
        for id in ids {
            let identity = FederationIdentity::new(*id, id.to_uppercase(), format!("fed1{}", id));
            backend.insert_federation(identity.clone()).await;
            registry.add(identity).await.unwrap();
        }
        let coordinator = Arc::new(TransferRemovalCoordinator::new(backend.clone(), registry.clone()));
        (backend, registry, coordinator)
    }

    #[tokio::test]
    async fn test_transfer_needs_two_federations() {
        let (_backend, _registry, coordinator) = setup(&["f1"]).await;
        assert_eq!(
            coordinator.transfer_check(&"f1".into()).await,
            TransferEligibility::NeedsAnotherFederation
        );
        assert!(!coordinator.can_transfer(&"nope".into()).await);
    }

    #[tokio::test]
    async fn test_transfer_destinations() {
        let (_backend, _registry, coordinator) = setup(&["f1", "f2", "f3"]).await;

        match coordinator.transfer_check(&"f2".into()).await {
            TransferEligibility::Eligible { destinations } => {
                let ids: Vec<&str> = destinations.iter().map(|identity| identity.id.as_str()).collect();
                assert_eq!(ids, vec!["f1", "f3"]);
            }
            other => panic!("expected eligible, got {:?}", other),
        }
        assert_eq!(
            coordinator.transfer_check(&"ghost".into()).await,
            TransferEligibility::UnknownFederation
        );
    }

    #[tokio::test]
    async fn test_remove_then_refresh() {
        let (backend, registry, coordinator) = setup(&["f1", "f2"]).await;

        let removed = coordinator.remove(&"f1".into()).await.unwrap();
        assert_eq!(removed.id.as_str(), "f1");
        assert!(!registry.contains(&"f1".into()).await);
        assert_eq!(
            backend.calls().await,
            vec![BackendCall::Remove("f1".into()), BackendCall::List]
        );
        assert!(coordinator.removal_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_leaves_registry() {
        let (backend, registry, coordinator) = setup(&["f1"]).await;
        backend.fail_writes(Some(BackendError::Unavailable("offline".into()))).await;

        let err = coordinator.remove(&"f1".into()).await.unwrap_err();
        assert_eq!(err, MembershipError::Backend(BackendError::Unavailable("offline".into())));
        assert!(registry.contains(&"f1".into()).await);
        assert_eq!(backend.calls().await, vec![BackendCall::Remove("f1".into())]);
    }

    #[tokio::test]
    async fn test_unknown_federation_skips_backend() {
        let (backend, _registry, coordinator) = setup(&["f1"]).await;
        let err = coordinator.remove(&"ghost".into()).await.unwrap_err();
        assert_eq!(err, MembershipError::NotFound("ghost".into()));
        assert!(backend.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_removals_of_same_id() {
        let (_backend, registry, coordinator) = setup(&["f1", "f2"]).await;
        let id = FederationId::from("f1");

        let (first, second) = tokio::join!(coordinator.remove(&id), coordinator.remove(&id));
        let outcomes = [first.is_ok(), second.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);

        let failure = if first.is_err() { first } else { second };
        assert_eq!(failure.unwrap_err(), MembershipError::NotFound(id.clone()));
        assert_eq!(registry.len().await, 1);
    }
}
