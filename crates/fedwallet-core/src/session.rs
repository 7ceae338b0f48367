use crate::balances::BalanceAggregator;
use crate::config::MembershipConfig;
use crate::connector::FederationConnector;
use crate::coordinator::{TransferEligibility, TransferRemovalCoordinator};
use crate::error::{EnrollmentError, MembershipError};
use crate::recommendations::RecommendationLedger;
use crate::registry::{ExpirationWarning, FederationRegistry, MembershipEvent, RefreshSummary};
use chrono::{DateTime, Utc};
use fedwallet_sync::WalletBackend;
use fedwallet_types::{
    Amount, DiscoveredFederation, FederationBalances, FederationId, FederationIdentity, RecommendationState,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// A discovered federation and whether the wallet already belongs to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryEntry {
    pub federation: DiscoveredFederation,
    pub already_member: bool,
}

/// Membership state for one wallet session.
///
/// Owns the registry and everything derived from it, and is the surface
/// presentation code talks to. Nothing here is global; build one per
/// session and share it by reference.
pub struct MembershipSession {
    backend: Arc<dyn WalletBackend>,
    config: MembershipConfig,
    registry: Arc<FederationRegistry>,
    connector: FederationConnector,
    balances: Arc<BalanceAggregator>,
    recommendations: Arc<RecommendationLedger>,
    coordinator: TransferRemovalCoordinator,
}

impl MembershipSession {
    pub async fn new(backend: Arc<dyn WalletBackend>, config: MembershipConfig) -> Self {
        let registry = Arc::new(FederationRegistry::new());
        let balances = Arc::new(BalanceAggregator::new(backend.clone(), registry.clone()));
        let recommendations = Arc::new(RecommendationLedger::new(backend.clone(), registry.clone()));
        registry.register_observer(&balances).await;
        registry.register_observer(&recommendations).await;

        Self {
            connector: FederationConnector::new(backend.clone(), registry.clone()),
            coordinator: TransferRemovalCoordinator::new(backend.clone(), registry.clone()),
            backend,
            config,
            registry,
            balances,
            recommendations,
        }
    }

    /// Join a federation from candidate invite codes, tried in order
    pub async fn enroll<S: AsRef<str>>(&self, candidates: &[S]) -> Result<FederationIdentity, EnrollmentError> {
        let identity = self.connector.connect(candidates).await?;
        self.refresh_best_effort().await;
        Ok(identity)
    }

    /// Join a federation found through discovery
    pub async fn enroll_discovered(
        &self,
        federation: &DiscoveredFederation,
    ) -> Result<FederationIdentity, EnrollmentError> {
        if self.registry.contains(&federation.id).await {
            return Err(EnrollmentError::DuplicateFederation(federation.id.clone()));
        }
        info!(
            federation_id = %federation.id,
            candidates = federation.invite_codes.len(),
            "Joining discovered federation"
        );
        self.enroll(federation.invite_codes.as_slice()).await
    }

    pub async fn list_membership(&self) -> Vec<FederationIdentity> {
        self.registry.list().await
    }

    pub async fn federation(&self, id: &FederationId) -> Option<FederationIdentity> {
        self.registry.get(id).await
    }

    pub async fn remove_membership(&self, id: &FederationId) -> Result<FederationIdentity, MembershipError> {
        self.coordinator.remove(id).await
    }

    /// Fresh balances; empty when the backend cannot answer
    pub async fn aggregated_balances(&self) -> FederationBalances {
        self.balances.fetch_all().await
    }

    /// Last known balance, `None` when unknown
    pub async fn balance_of(&self, id: &FederationId) -> Option<Amount> {
        self.balances.balance_of(id).await
    }

    pub async fn recommendation_state(&self, id: &FederationId) -> RecommendationState {
        self.recommendations.state(id).await
    }

    /// Publish or withdraw a recommendation.
    ///
    /// Does nothing when the backend has already confirmed `desired`. A
    /// fail-open guess never suppresses the write.
    pub async fn set_recommendation(
        &self,
        id: &FederationId,
        invite_code: &str,
        desired: bool,
    ) -> Result<(), MembershipError> {
        let target = RecommendationState::from_recommended(desired);
        if self.recommendations.confirmed_state(id).await == Some(target) {
            return Ok(());
        }

        if desired {
            self.recommendations.recommend(id, invite_code).await?;
        } else {
            self.recommendations.revoke(id).await?;
        }
        Ok(())
    }

    pub async fn refresh_recommendations(&self) -> Vec<(FederationId, RecommendationState)> {
        self.recommendations.refresh_all().await
    }

    pub async fn transfer_eligibility(&self, id: &FederationId) -> bool {
        self.coordinator.can_transfer(id).await
    }

    pub async fn transfer_check(&self, id: &FederationId) -> TransferEligibility {
        self.coordinator.transfer_check(id).await
    }

    /// Reconcile the registry with the backend's membership list
    pub async fn refresh(&self) -> Result<RefreshSummary, MembershipError> {
        Ok(self.registry.refresh(self.backend.as_ref()).await?)
    }

    /// Federations announced by contacts; empty when the backend cannot answer
    pub async fn discover_federations(&self) -> Vec<DiscoveryEntry> {
        let discovered = match self.backend.discover_federations().await {
            Ok(discovered) => discovered,
            Err(e) => {
                warn!(kind = %e.kind(), "Federation discovery failed: {}", e);
                return Vec::new();
            }
        };

        let members = self.registry.ids().await;
        discovered
            .into_iter()
            .map(|federation| DiscoveryEntry {
                already_member: members.contains(&federation.id),
                federation,
            })
            .collect()
    }

    /// Banner to show for a federation that is winding down, if any
    pub async fn expiration_warning(&self, now: DateTime<Utc>) -> Option<ExpirationWarning> {
        self.registry
            .expiration_warning(now, self.config.expiry_warning_window())
            .await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.registry.subscribe()
    }

    pub fn registry(&self) -> &Arc<FederationRegistry> {
        &self.registry
    }

    async fn refresh_best_effort(&self) {
        if let Err(e) = self.registry.refresh(self.backend.as_ref()).await {
            warn!(kind = %e.kind(), "Registry refresh after join failed: {}", e);
        }
    }
}
