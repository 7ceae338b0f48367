//! Wallet backend access for federation membership.
//!
//! [`WalletBackend`] is the seam between the membership core and whatever
//! actually holds the federation clients. [`HttpBackend`] talks to a wallet
//! daemon over its JSON API; [`MemoryBackend`] keeps everything in process
//! and can be scripted to fail.

use async_trait::async_trait;
use fedwallet_types::{
    AttestationId, DiscoveredFederation, FederationBalance, FederationId, FederationIdentity,
};
use std::sync::Arc;

// Sub-modules
pub mod error;
pub mod http;
pub mod memory;

// Re-export key types
pub use error::{BackendError, BackendErrorKind, BackendResult};
pub use http::HttpBackend;
pub use memory::{BackendCall, MemoryBackend};

/// Operations the membership core needs from the wallet backend
#[async_trait]
pub trait WalletBackend: Send + Sync {
    /// Join the federation behind `invite_code` and return its identity
    async fn join_federation(&self, invite_code: &str) -> BackendResult<FederationIdentity>;

    /// Federations the wallet currently belongs to, in backend order
    async fn list_federations(&self) -> BackendResult<Vec<FederationIdentity>>;

    async fn remove_federation(&self, id: &FederationId) -> BackendResult<()>;

    async fn get_federation_balances(&self) -> BackendResult<Vec<FederationBalance>>;

    async fn has_recommended_federation(&self, id: &FederationId) -> BackendResult<bool>;

    /// Publish a recommendation for the federation behind `invite_code`
    async fn recommend_federation(&self, invite_code: &str) -> BackendResult<AttestationId>;

    async fn delete_federation_recommendation(&self, id: &FederationId) -> BackendResult<()>;

    /// Federations announced by the user's contacts
    async fn discover_federations(&self) -> BackendResult<Vec<DiscoveredFederation>>;
}

#[async_trait]
impl<T: WalletBackend + ?Sized> WalletBackend for Arc<T> {
    async fn join_federation(&self, invite_code: &str) -> BackendResult<FederationIdentity> {
        (**self).join_federation(invite_code).await
    }

    async fn list_federations(&self) -> BackendResult<Vec<FederationIdentity>> {
        (**self).list_federations().await
    }

    async fn remove_federation(&self, id: &FederationId) -> BackendResult<()> {
        (**self).remove_federation(id).await
    }

    async fn get_federation_balances(&self) -> BackendResult<Vec<FederationBalance>> {
        (**self).get_federation_balances().await
    }

    async fn has_recommended_federation(&self, id: &FederationId) -> BackendResult<bool> {
        (**self).has_recommended_federation(id).await
    }

    async fn recommend_federation(&self, invite_code: &str) -> BackendResult<AttestationId> {
        (**self).recommend_federation(invite_code).await
    }

    async fn delete_federation_recommendation(&self, id: &FederationId) -> BackendResult<()> {
        (**self).delete_federation_recommendation(id).await
    }

    async fn discover_federations(&self) -> BackendResult<Vec<DiscoveredFederation>> {
        (**self).discover_federations().await
    }
}
