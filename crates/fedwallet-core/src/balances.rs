use crate::registry::{FederationRegistry, MembershipObserver};
use async_trait::async_trait;
use fedwallet_sync::WalletBackend;
use fedwallet_types::{Amount, FederationBalances, FederationId};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Per-federation balances, fetched in one backend round trip.
///
/// Balances are advisory: a failed fetch yields an empty mapping and never
/// an error.
pub struct BalanceAggregator {
    backend: Arc<dyn WalletBackend>,
    registry: Arc<FederationRegistry>,
    cache: RwLock<FederationBalances>,
}

impl BalanceAggregator {
    pub fn new(backend: Arc<dyn WalletBackend>, registry: Arc<FederationRegistry>) -> Self {
        Self {
            backend,
            registry,
            cache: RwLock::new(FederationBalances::new()),
        }
    }

    /// Fetch balances for every registered federation.
    ///
    /// Entries for federations outside the registry are dropped. On failure
    /// the cached mapping is left as it was.
    pub async fn fetch_all(&self) -> FederationBalances {
        let entries = match self.backend.get_federation_balances().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(kind = %e.kind(), "Failed to fetch federation balances: {}", e);
                return FederationBalances::new();
            }
        };

        let mut balances: FederationBalances = entries.into_iter().collect();

        // Filter under the cache lock; removals either land first or prune after
        let mut cache = self.cache.write().await;
        let members = self.registry.ids().await;
        balances.retain(|id| members.contains(id));

        debug!(count = balances.len(), "Fetched federation balances");
        *cache = balances.clone();
        balances
    }

    /// Balances from the last successful fetch
    pub async fn cached(&self) -> FederationBalances {
        self.cache.read().await.clone()
    }

    /// `None` when the balance is unknown
    pub async fn balance_of(&self, id: &FederationId) -> Option<Amount> {
        if !self.registry.contains(id).await {
            return None;
        }
        self.cache.read().await.get(id)
    }
}

#[async_trait]
impl MembershipObserver for BalanceAggregator {
    async fn federation_removed(&self, id: &FederationId) {
        if self.cache.write().await.remove(id).is_some() {
            debug!(federation_id = %id, "Dropped cached balance");
        }
    }
}
