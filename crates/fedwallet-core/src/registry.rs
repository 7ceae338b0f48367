use crate::error::RegistryError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use fedwallet_sync::{BackendResult, WalletBackend};
use fedwallet_types::{FederationId, FederationIdentity};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// Membership change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    Joined(FederationId),
    Removed(FederationId),
    Resynced {
        added: Vec<FederationId>,
        removed: Vec<FederationId>,
    },
}

/// Holder of per-federation data that must be dropped with the membership.
///
/// Observers are notified before the mutating registry call returns.
#[async_trait]
pub trait MembershipObserver: Send + Sync {
    async fn federation_removed(&self, id: &FederationId);
}

/// Outcome of reconciling with the backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub added: Vec<FederationId>,
    pub removed: Vec<FederationId>,
}

impl RefreshSummary {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// What the expiration banner should say
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    Popup {
        message: String,
        ends_at: DateTime<Utc>,
    },
    Expiring {
        expires_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationWarning {
    pub federation_id: FederationId,
    pub federation_name: String,
    pub kind: WarningKind,
}

/// The set of federations the wallet belongs to, in insertion order.
///
/// This is the only component that adds or removes memberships.
pub struct FederationRegistry {
    entries: RwLock<Vec<FederationIdentity>>,
    observers: RwLock<Vec<Weak<dyn MembershipObserver>>>,
    events: broadcast::Sender<MembershipEvent>,
}

impl Default for FederationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FederationRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            entries: RwLock::new(Vec::new()),
            observers: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Subscribe to membership changes
    pub fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.events.subscribe()
    }

    /// Register a dependent to be pruned on removal. Held weakly.
    pub async fn register_observer<O: MembershipObserver + 'static>(&self, observer: &Arc<O>) {
        let weak: Weak<dyn MembershipObserver> = Arc::downgrade(observer) as Weak<dyn MembershipObserver>;
        let mut observers = self.observers.write().await;
        observers.retain(|existing| existing.strong_count() > 0);
        observers.push(weak);
    }

    pub async fn add(&self, identity: FederationIdentity) -> Result<(), RegistryError> {
        let id = identity.id.clone();
        {
            let mut entries = self.entries.write().await;
            if entries.iter().any(|existing| existing.id == id) {
                return Err(RegistryError::DuplicateFederation(id));
            }
            entries.push(identity);
        }

        info!(federation_id = %id, "Federation added to registry");
        let _ = self.events.send(MembershipEvent::Joined(id));
        Ok(())
    }

    /// Remove a membership and prune every dependent cache for it
    pub async fn remove(&self, id: &FederationId) -> Result<FederationIdentity, RegistryError> {
        let removed = {
            let mut entries = self.entries.write().await;
            let position = entries
                .iter()
                .position(|existing| &existing.id == id)
                .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
            entries.remove(position)
        };

        self.notify_removed(std::slice::from_ref(id)).await;
        info!(federation_id = %id, "Federation removed from registry");
        let _ = self.events.send(MembershipEvent::Removed(id.clone()));
        Ok(removed)
    }

    pub async fn list(&self) -> Vec<FederationIdentity> {
        self.entries.read().await.clone()
    }

    pub async fn ids(&self) -> HashSet<FederationId> {
        self.entries.read().await.iter().map(|entry| entry.id.clone()).collect()
    }

    pub async fn get(&self, id: &FederationId) -> Option<FederationIdentity> {
        self.entries.read().await.iter().find(|entry| &entry.id == id).cloned()
    }

    pub async fn contains(&self, id: &FederationId) -> bool {
        self.entries.read().await.iter().any(|entry| &entry.id == id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Replace the membership set with the backend's view.
    ///
    /// On failure the registry is left untouched.
    pub async fn refresh(&self, backend: &dyn WalletBackend) -> BackendResult<RefreshSummary> {
        let listed = backend.list_federations().await?;

        let mut seen = HashSet::new();
        let mut fresh = Vec::with_capacity(listed.len());
        for identity in listed {
            if seen.insert(identity.id.clone()) {
                fresh.push(identity);
            } else {
                warn!(federation_id = %identity.id, "Backend listed federation twice, keeping first");
            }
        }

        let summary = {
            let mut entries = self.entries.write().await;
            let old: HashSet<FederationId> = entries.iter().map(|entry| entry.id.clone()).collect();
            let summary = RefreshSummary {
                added: fresh
                    .iter()
                    .filter(|entry| !old.contains(&entry.id))
                    .map(|entry| entry.id.clone())
                    .collect(),
                removed: entries
                    .iter()
                    .filter(|entry| !seen.contains(&entry.id))
                    .map(|entry| entry.id.clone())
                    .collect(),
            };
            *entries = fresh;
            summary
        };

        if !summary.removed.is_empty() {
            self.notify_removed(&summary.removed).await;
        }

        debug!(
            added = summary.added.len(),
            removed = summary.removed.len(),
            "Registry resynchronized with backend"
        );
        let _ = self.events.send(MembershipEvent::Resynced {
            added: summary.added.clone(),
            removed: summary.removed.clone(),
        });
        Ok(summary)
    }

    /// First federation that warrants a banner: an open popup window wins
    /// over an approaching expiry.
    pub async fn expiration_warning(&self, now: DateTime<Utc>, window: Duration) -> Option<ExpirationWarning> {
        let entries = self.entries.read().await;

        let popup = entries.iter().find(|entry| entry.popup_active(now)).and_then(|entry| {
            match (&entry.popup_message, entry.popup_end_timestamp) {
                (Some(message), Some(ends_at)) => Some(ExpirationWarning {
                    federation_id: entry.id.clone(),
                    federation_name: entry.name.clone(),
                    kind: WarningKind::Popup {
                        message: message.clone(),
                        ends_at,
                    },
                }),
                _ => None,
            }
        });
        if popup.is_some() {
            return popup;
        }

        entries
            .iter()
            .find(|entry| entry.expires_within(now, window))
            .and_then(|entry| {
                entry.expiry.map(|expires_at| ExpirationWarning {
                    federation_id: entry.id.clone(),
                    federation_name: entry.name.clone(),
                    kind: WarningKind::Expiring { expires_at },
                })
            })
    }

    async fn notify_removed(&self, ids: &[FederationId]) {
        let observers: Vec<Arc<dyn MembershipObserver>> = self
            .observers
            .read()
            .await
            .iter()
            .filter_map(Weak::upgrade)
            .collect();

        for observer in observers {
            for id in ids {
                observer.federation_removed(id).await;
            }
        }
    }
}
