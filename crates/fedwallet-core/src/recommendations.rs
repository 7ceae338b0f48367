use crate::error::MembershipError;
use crate::registry::{FederationRegistry, MembershipObserver};
use async_trait::async_trait;
use fedwallet_sync::WalletBackend;
use fedwallet_types::{AttestationId, FederationId, RecommendationState};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
struct LedgerEntry {
    state: RecommendationState,
    /// False while `state` is a fail-open guess
    confirmed: bool,
    attestation: Option<AttestationId>,
}

/// Whether the local user recommends each federation.
///
/// Publishing and revoking update the local state as soon as the backend
/// accepts them. Reads fall back to "not recommended" when the backend
/// cannot answer. Callers serialize recommend/revoke for one federation.
///
/// Entries only exist for registered federations. Every write re-checks
/// membership under the entries lock, so a removal that lands while a
/// backend call is in flight is never undone.
pub struct RecommendationLedger {
    backend: Arc<dyn WalletBackend>,
    registry: Arc<FederationRegistry>,
    entries: RwLock<HashMap<FederationId, LedgerEntry>>,
}

impl RecommendationLedger {
    pub fn new(backend: Arc<dyn WalletBackend>, registry: Arc<FederationRegistry>) -> Self {
        Self {
            backend,
            registry,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Ask the backend; `false` if it cannot answer or `id` is not registered
    pub async fn has_recommended(&self, id: &FederationId) -> bool {
        if !self.registry.contains(id).await {
            return false;
        }

        match self.query(id).await {
            Some(recommended) => {
                self.settle(id, RecommendationState::from_recommended(recommended)).await;
                recommended
            }
            None => false,
        }
    }

    /// Re-read the state of one federation from the backend
    pub async fn refresh(&self, id: &FederationId) -> RecommendationState {
        if !self.registry.contains(id).await {
            return RecommendationState::Unknown;
        }

        match self.query(id).await {
            Some(recommended) => {
                let state = RecommendationState::from_recommended(recommended);
                if self.settle(id, state).await {
                    state
                } else {
                    RecommendationState::Unknown
                }
            }
            None => {
                let Some(mut entries) = self.write_for(id).await else {
                    return RecommendationState::Unknown;
                };
                let entry = entries.entry(id.clone()).or_default();
                if entry.state == RecommendationState::Unknown {
                    entry.state = RecommendationState::NotRecommended;
                }
                entry.state
            }
        }
    }

    /// Refresh every registered federation concurrently
    pub async fn refresh_all(&self) -> Vec<(FederationId, RecommendationState)> {
        let ids: Vec<FederationId> = self.registry.list().await.into_iter().map(|identity| identity.id).collect();
        let states = join_all(ids.iter().map(|id| self.refresh(id))).await;
        ids.into_iter().zip(states).collect()
    }

    /// Current local state, `Unknown` for federations outside the registry
    pub async fn state(&self, id: &FederationId) -> RecommendationState {
        if !self.registry.contains(id).await {
            return RecommendationState::Unknown;
        }
        self.entries
            .read()
            .await
            .get(id)
            .map(|entry| entry.state)
            .unwrap_or_default()
    }

    /// State last reported by the backend or set by a successful publish.
    ///
    /// `None` while the state is unknown or only a fail-open guess.
    pub async fn confirmed_state(&self, id: &FederationId) -> Option<RecommendationState> {
        if !self.registry.contains(id).await {
            return None;
        }
        self.entries
            .read()
            .await
            .get(id)
            .filter(|entry| entry.confirmed)
            .map(|entry| entry.state)
    }

    /// Attestation returned by the last successful publish
    pub async fn attestation(&self, id: &FederationId) -> Option<AttestationId> {
        self.entries.read().await.get(id).and_then(|entry| entry.attestation.clone())
    }

    /// Publish a recommendation for `id` using its invite code
    pub async fn recommend(&self, id: &FederationId, invite_code: &str) -> Result<AttestationId, MembershipError> {
        if !self.registry.contains(id).await {
            return Err(MembershipError::NotFound(id.clone()));
        }

        let attestation = self.backend.recommend_federation(invite_code).await.map_err(|e| {
            warn!(federation_id = %id, kind = %e.kind(), "Failed to publish recommendation: {}", e);
            MembershipError::Publish(e)
        })?;

        info!(federation_id = %id, attestation = %attestation, "Published recommendation");
        self.record(
            id,
            LedgerEntry {
                state: RecommendationState::Recommended,
                confirmed: true,
                attestation: Some(attestation.clone()),
            },
        )
        .await;
        Ok(attestation)
    }

    /// Withdraw a previously published recommendation
    pub async fn revoke(&self, id: &FederationId) -> Result<(), MembershipError> {
        if !self.registry.contains(id).await {
            return Err(MembershipError::NotFound(id.clone()));
        }

        self.backend.delete_federation_recommendation(id).await.map_err(|e| {
            warn!(federation_id = %id, kind = %e.kind(), "Failed to revoke recommendation: {}", e);
            MembershipError::Publish(e)
        })?;

        info!(federation_id = %id, "Revoked recommendation");
        self.record(
            id,
            LedgerEntry {
                state: RecommendationState::NotRecommended,
                confirmed: true,
                attestation: None,
            },
        )
        .await;
        Ok(())
    }

    async fn query(&self, id: &FederationId) -> Option<bool> {
        match self.backend.has_recommended_federation(id).await {
            Ok(recommended) => Some(recommended),
            Err(e) => {
                warn!(federation_id = %id, kind = %e.kind(), "Failed to query recommendation: {}", e);
                None
            }
        }
    }

    /// Entries lock, or `None` once `id` has left the registry
    async fn write_for(&self, id: &FederationId) -> Option<RwLockWriteGuard<'_, HashMap<FederationId, LedgerEntry>>> {
        let entries = self.entries.write().await;
        if self.registry.contains(id).await {
            Some(entries)
        } else {
            debug!(federation_id = %id, "Federation left the registry, dropping recommendation update");
            None
        }
    }

    async fn record(&self, id: &FederationId, entry: LedgerEntry) {
        if let Some(mut entries) = self.write_for(id).await {
            entries.insert(id.clone(), entry);
        }
    }

    /// Store backend truth for `id`; false if `id` is no longer registered
    async fn settle(&self, id: &FederationId, state: RecommendationState) -> bool {
        let Some(mut entries) = self.write_for(id).await else {
            return false;
        };
        let entry = entries.entry(id.clone()).or_default();
        if entry.state != state {
            debug!(federation_id = %id, %state, "Recommendation state settled from backend");
        }
        entry.state = state;
        entry.confirmed = true;
        if !state.is_recommended() {
            entry.attestation = None;
        }
        true
    }
}

#[async_trait]
impl MembershipObserver for RecommendationLedger {
    async fn federation_removed(&self, id: &FederationId) {
        self.entries.write().await.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedwallet_sync::{BackendCall, BackendError, MemoryBackend};
    use fedwallet_types::FederationIdentity;
    use std::time::Duration;

    async fn setup() -> (Arc<MemoryBackend>, Arc<FederationRegistry>, Arc<RecommendationLedger>) {
        let backend = Arc::new(MemoryBackend::new());
        let registry = Arc::new(FederationRegistry::new());
        let ledger = Arc::new(RecommendationLedger::new(backend.clone(), registry.clone()));
        registry.register_observer(&ledger).await;

        let identity = FederationIdentity::new("alpha", "Alpha", "fed1alpha");
        backend.insert_federation(identity.clone()).await;
        registry.add(identity).await.unwrap();
        (backend, registry, ledger)
    }

    #[tokio::test]
    async fn test_state_machine() {
        let (_backend, _registry, ledger) = setup().await;
        let id = FederationId::from("alpha");

        assert_eq!(ledger.state(&id).await, RecommendationState::Unknown);
        assert_eq!(ledger.refresh(&id).await, RecommendationState::NotRecommended);

        let attestation = ledger.recommend(&id, "fed1alpha").await.unwrap();
        assert_eq!(ledger.state(&id).await, RecommendationState::Recommended);
        assert_eq!(ledger.attestation(&id).await, Some(attestation));

        ledger.revoke(&id).await.unwrap();
        assert_eq!(ledger.state(&id).await, RecommendationState::NotRecommended);
        assert_eq!(ledger.attestation(&id).await, None);
    }

    #[tokio::test]
    async fn test_query_failure_fails_open() {
        let (backend, _registry, ledger) = setup().await;
        let id = FederationId::from("alpha");
        backend.fail_reads(Some(BackendError::Unavailable("offline".into()))).await;

        assert!(!ledger.has_recommended(&id).await);
        assert_eq!(ledger.refresh(&id).await, RecommendationState::NotRecommended);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_known_state() {
        let (backend, _registry, ledger) = setup().await;
        let id = FederationId::from("alpha");
        ledger.recommend(&id, "fed1alpha").await.unwrap();

        backend.fail_reads(Some(BackendError::Unavailable("offline".into()))).await;
        assert_eq!(ledger.refresh(&id).await, RecommendationState::Recommended);
    }

    #[tokio::test]
    async fn test_publish_failure_leaves_state() {
        let (backend, _registry, ledger) = setup().await;
        let id = FederationId::from("alpha");
        backend.fail_writes(Some(BackendError::Unauthorized("locked".into()))).await;

        let err = ledger.recommend(&id, "fed1alpha").await.unwrap_err();
        assert_eq!(err, MembershipError::Publish(BackendError::Unauthorized("locked".into())));
        assert_eq!(ledger.state(&id).await, RecommendationState::Unknown);
        assert!(matches!(ledger.revoke(&id).await, Err(MembershipError::Publish(_))));
    }

    #[tokio::test]
    async fn test_unregistered_federation() {
        let (backend, _registry, ledger) = setup().await;
        let ghost = FederationId::from("ghost");

        assert_eq!(ledger.refresh(&ghost).await, RecommendationState::Unknown);
        assert_eq!(
            ledger.recommend(&ghost, "fed1ghost").await.unwrap_err(),
            MembershipError::NotFound(ghost.clone())
        );
        assert!(!backend.calls().await.iter().any(|call| matches!(call, BackendCall::Recommend(_))));
    }

    #[tokio::test]
    async fn test_removal_prunes_entry() {
        let (_backend, registry, ledger) = setup().await;
        let id = FederationId::from("alpha");
        ledger.recommend(&id, "fed1alpha").await.unwrap();

        registry.remove(&id).await.unwrap();
        assert_eq!(ledger.state(&id).await, RecommendationState::Unknown);
        assert_eq!(ledger.attestation(&id).await, None);
    }

    #[tokio::test]
    async fn test_refresh_all() {
        let (backend, registry, ledger) = setup().await;
        let beta = FederationIdentity::new("beta", "Beta", "fed1beta");
        backend.insert_federation(beta.clone()).await;
        registry.add(beta).await.unwrap();
        backend.recommend_federation("fed1beta").await.unwrap();

        let states = ledger.refresh_all().await;
        assert_eq!(
            states,
            vec![
                (FederationId::from("alpha"), RecommendationState::NotRecommended),
                (FederationId::from("beta"), RecommendationState::Recommended),
            ]
        );
    }

    #[tokio::test]
    async fn test_queries_for_unregistered_ids_leave_no_entries() {
        let (backend, _registry, ledger) = setup().await;
        for n in 0..100 {
            assert!(!ledger.has_recommended(&FederationId::new(format!("ghost{}", n))).await);
        }

        assert_eq!(ledger.entries.read().await.len(), 0);
        assert!(!backend
            .calls()
            .await
            .iter()
            .any(|call| matches!(call, BackendCall::HasRecommended(_))));
    }

    #[tokio::test]
    async fn test_publish_racing_removal_is_dropped() {
        let backend = Arc::new(MemoryBackend::new().with_write_latency(Duration::from_millis(100)));
        let registry = Arc::new(FederationRegistry::new());
        let ledger = Arc::new(RecommendationLedger::new(backend.clone(), registry.clone()));
        registry.register_observer(&ledger).await;
        let alpha = FederationIdentity::new("alpha", "Alpha", "fed1alpha");
        backend.insert_federation(alpha.clone()).await;
        registry.add(alpha.clone()).await.unwrap();

        let publish = tokio::spawn({
            let ledger = ledger.clone();
            async move { ledger.recommend(&"alpha".into(), "fed1alpha").await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.remove(&alpha.id).await.unwrap();
        publish.await.unwrap().unwrap();

        assert!(ledger.entries.read().await.get(&alpha.id).is_none());
        registry.add(alpha.clone()).await.unwrap();
        assert_eq!(ledger.state(&alpha.id).await, RecommendationState::Unknown);
        assert_eq!(ledger.attestation(&alpha.id).await, None);
    }

    #[tokio::test]
    async fn test_query_racing_removal_is_dropped() {
        let backend = Arc::new(MemoryBackend::new().with_read_latency(Duration::from_millis(100)));
        let registry = Arc::new(FederationRegistry::new());
        let ledger = Arc::new(RecommendationLedger::new(backend.clone(), registry.clone()));
        registry.register_observer(&ledger).await;
        let alpha = FederationIdentity::new("alpha", "Alpha", "fed1alpha");
        backend.insert_federation(alpha.clone()).await;
        registry.add(alpha.clone()).await.unwrap();

        let refresh = tokio::spawn({
            let ledger = ledger.clone();
            async move { ledger.refresh(&"alpha".into()).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.remove(&alpha.id).await.unwrap();

        assert_eq!(refresh.await.unwrap(), RecommendationState::Unknown);
        assert!(ledger.entries.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_fail_open_guess_is_not_confirmed() {
        let (backend, _registry, ledger) = setup().await;
        let id = FederationId::from("alpha");
        assert_eq!(ledger.confirmed_state(&id).await, None);

        backend.fail_reads(Some(BackendError::Unavailable("offline".into()))).await;
        assert_eq!(ledger.refresh(&id).await, RecommendationState::NotRecommended);
        assert_eq!(ledger.confirmed_state(&id).await, None);

        backend.fail_reads(None).await;
        ledger.refresh(&id).await;
        assert_eq!(
            ledger.confirmed_state(&id).await,
            Some(RecommendationState::NotRecommended)
        );
    }
}
