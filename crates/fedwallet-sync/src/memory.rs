use crate::error::{BackendError, BackendResult};
use crate::WalletBackend;
use async_trait::async_trait;
use fedwallet_types::{
    Amount, AttestationId, DiscoveredFederation, FederationBalance, FederationId, FederationIdentity,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// A call received by [`MemoryBackend`], in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Join(String),
    List,
    Remove(FederationId),
    Balances,
    HasRecommended(FederationId),
    Recommend(String),
    DeleteRecommendation(FederationId),
    Discover,
}

#[derive(Default)]
struct MemoryState {
    federations: Vec<FederationIdentity>,
    balances: HashMap<FederationId, Amount>,
    recommendations: HashMap<FederationId, AttestationId>,
    discovered: Vec<DiscoveredFederation>,
    join_failures: HashMap<String, BackendError>,
    join_identities: HashMap<String, FederationIdentity>,
    read_failure: Option<BackendError>,
    write_failure: Option<BackendError>,
    calls: Vec<BackendCall>,
}

/// In-process wallet backend.
///
/// Joined federations get an id derived from the invite code unless an
/// identity was scripted for that code. Failures can be scripted per invite
/// code for joins, and globally for reads and for writes.
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    join_latency: Option<Duration>,
    read_latency: Option<Duration>,
    write_latency: Option<Duration>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            join_latency: None,
            read_latency: None,
            write_latency: None,
        }
    }

    /// Delay every join by `latency` before it resolves
    pub fn with_join_latency(mut self, latency: Duration) -> Self {
        self.join_latency = Some(latency);
        self
    }

    /// Delay every read other than the membership list
    pub fn with_read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = Some(latency);
        self
    }

    /// Delay every mutating call other than join
    pub fn with_write_latency(mut self, latency: Duration) -> Self {
        self.write_latency = Some(latency);
        self
    }

    /// Make every join with `invite_code` fail with `error`
    pub async fn fail_join(&self, invite_code: &str, error: BackendError) {
        let mut state = self.state.lock().await;
        state.join_failures.insert(invite_code.to_string(), error);
    }

    /// Identity handed out when `invite_code` is joined
    pub async fn script_identity(&self, invite_code: &str, identity: FederationIdentity) {
        let mut state = self.state.lock().await;
        state.join_identities.insert(invite_code.to_string(), identity);
    }

    /// Seed a federation the wallet already belongs to
    pub async fn insert_federation(&self, identity: FederationIdentity) {
        let mut state = self.state.lock().await;
        state.balances.entry(identity.id.clone()).or_insert(Amount::ZERO);
        state.federations.retain(|existing| existing.id != identity.id);
        state.federations.push(identity);
    }

    pub async fn set_balance(&self, id: &FederationId, amount: Amount) {
        let mut state = self.state.lock().await;
        state.balances.insert(id.clone(), amount);
    }

    pub async fn add_discovered(&self, federation: DiscoveredFederation) {
        let mut state = self.state.lock().await;
        state.discovered.push(federation);
    }

    /// Fail every read operation (or stop failing with `None`)
    pub async fn fail_reads(&self, error: Option<BackendError>) {
        let mut state = self.state.lock().await;
        state.read_failure = error;
    }

    /// Fail every mutating operation other than join (or stop failing with `None`)
    pub async fn fail_writes(&self, error: Option<BackendError>) {
        let mut state = self.state.lock().await;
        state.write_failure = error;
    }

    pub async fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().await.calls.clone()
    }

    /// Invite codes passed to join, in call order
    pub async fn join_attempts(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Join(code) => Some(code.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn federations(&self) -> Vec<FederationIdentity> {
        self.state.lock().await.federations.clone()
    }

    async fn record(&self, call: BackendCall) {
        self.state.lock().await.calls.push(call);
    }

    async fn check_read(&self, call: BackendCall) -> BackendResult<()> {
        if call != BackendCall::List {
            pause(self.read_latency).await;
        }
        let mut state = self.state.lock().await;
        state.calls.push(call);
        match &state.read_failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

async fn pause(latency: Option<Duration>) {
    if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
    }
}

fn derived_federation_id(invite_code: &str) -> FederationId {
    let mut hasher = Sha256::new();
    hasher.update(invite_code.as_bytes());
    let hash = hasher.finalize();
    FederationId::new(hex::encode(&hash[0..16]))
}

#[async_trait]
impl WalletBackend for MemoryBackend {
    async fn join_federation(&self, invite_code: &str) -> BackendResult<FederationIdentity> {
        self.record(BackendCall::Join(invite_code.to_string())).await;

        pause(self.join_latency).await;

        let mut state = self.state.lock().await;
        if let Some(err) = state.join_failures.get(invite_code) {
            return Err(err.clone());
        }

        let identity = state.join_identities.get(invite_code).cloned().unwrap_or_else(|| {
            let id = derived_federation_id(invite_code);
            FederationIdentity::new(id.clone(), format!("Federation {}", &id.as_str()[..8]), invite_code)
        });

        if state.federations.iter().any(|existing| existing.id == identity.id) {
            return Err(BackendError::already_member(
                format!("Wallet already joined federation {}", identity.id),
                Some(identity.id.clone()),
            ));
        }

        debug!(federation_id = %identity.id, "Joined federation in memory");
        state.balances.entry(identity.id.clone()).or_insert(Amount::ZERO);
        state.federations.push(identity.clone());
        Ok(identity)
    }

    async fn list_federations(&self) -> BackendResult<Vec<FederationIdentity>> {
        self.check_read(BackendCall::List).await?;
        Ok(self.state.lock().await.federations.clone())
    }

    async fn remove_federation(&self, id: &FederationId) -> BackendResult<()> {
        pause(self.write_latency).await;
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::Remove(id.clone()));
        if let Some(err) = &state.write_failure {
            return Err(err.clone());
        }

        let before = state.federations.len();
        state.federations.retain(|existing| &existing.id != id);
        if state.federations.len() == before {
            return Err(BackendError::NotFound(id.to_string()));
        }
        state.balances.remove(id);
        state.recommendations.remove(id);
        Ok(())
    }

    async fn get_federation_balances(&self) -> BackendResult<Vec<FederationBalance>> {
        self.check_read(BackendCall::Balances).await?;
        let state = self.state.lock().await;
        Ok(state
            .balances
            .iter()
            .map(|(id, amount)| FederationBalance {
                federation_id: id.clone(),
                balance: *amount,
            })
            .collect())
    }

    async fn has_recommended_federation(&self, id: &FederationId) -> BackendResult<bool> {
        self.check_read(BackendCall::HasRecommended(id.clone())).await?;
        Ok(self.state.lock().await.recommendations.contains_key(id))
    }

    async fn recommend_federation(&self, invite_code: &str) -> BackendResult<AttestationId> {
        pause(self.write_latency).await;
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::Recommend(invite_code.to_string()));
        if let Some(err) = &state.write_failure {
            return Err(err.clone());
        }

        let id = state
            .federations
            .iter()
            .find(|federation| federation.invite_code == invite_code)
            .map(|federation| federation.id.clone())
            .ok_or_else(|| BackendError::NotFound(format!("No federation for invite {}", invite_code)))?;

        let attestation = AttestationId(Uuid::new_v4().to_string());
        state.recommendations.insert(id, attestation.clone());
        Ok(attestation)
    }

    async fn delete_federation_recommendation(&self, id: &FederationId) -> BackendResult<()> {
        pause(self.write_latency).await;
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::DeleteRecommendation(id.clone()));
        if let Some(err) = &state.write_failure {
            return Err(err.clone());
        }
        state.recommendations.remove(id);
        Ok(())
    }

    async fn discover_federations(&self) -> BackendResult<Vec<DiscoveredFederation>> {
        self.check_read(BackendCall::Discover).await?;
        Ok(self.state.lock().await.discovered.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_derives_identity_and_rejects_rejoin() {
        let backend = MemoryBackend::new();
        let identity = backend.join_federation("fed1xyz").await.unwrap();
        assert_eq!(identity.invite_code, "fed1xyz");
        assert_eq!(identity.id.as_str().len(), 32);

        let err = backend.join_federation("fed1xyz").await.unwrap_err();
        assert!(matches!(err, BackendError::AlreadyMember { federation_id: Some(_), .. }));
        assert_eq!(backend.join_attempts().await, vec!["fed1xyz", "fed1xyz"]);
    }

    #[tokio::test]
    async fn test_scripted_join_failure() {
        let backend = MemoryBackend::new();
        backend
            .fail_join("fed1abc", BackendError::GuardianUnreachable("down".into()))
            .await;
        assert!(backend.join_federation("fed1abc").await.is_err());
        assert!(backend.federations().await.is_empty());
    }

    #[tokio::test]
    async fn test_recommendation_lifecycle() {
        let backend = MemoryBackend::new();
        let identity = backend.join_federation("fed1xyz").await.unwrap();

        assert!(!backend.has_recommended_federation(&identity.id).await.unwrap());
        backend.recommend_federation("fed1xyz").await.unwrap();
        assert!(backend.has_recommended_federation(&identity.id).await.unwrap());
        backend.delete_federation_recommendation(&identity.id).await.unwrap();
        assert!(!backend.has_recommended_federation(&identity.id).await.unwrap());

        assert!(backend.recommend_federation("fed1unknown").await.is_err());
    }

    #[tokio::test]
    async fn test_read_and_write_failures() {
        let backend = MemoryBackend::new();
        backend.insert_federation(FederationIdentity::new("f1", "F1", "fed1a")).await;

        backend.fail_reads(Some(BackendError::Unavailable("offline".into()))).await;
        assert!(backend.get_federation_balances().await.is_err());
        assert!(backend.list_federations().await.is_err());
        backend.fail_reads(None).await;
        assert_eq!(backend.list_federations().await.unwrap().len(), 1);

        backend.fail_writes(Some(BackendError::Unavailable("offline".into()))).await;
        assert!(backend.remove_federation(&"f1".into()).await.is_err());
        assert_eq!(backend.federations().await.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_unknown_is_not_found() {
        let backend = MemoryBackend::new();
        let err = backend.remove_federation(&"ghost".into()).await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
        assert_eq!(backend.calls().await, vec![BackendCall::Remove("ghost".into())]);
    }
}
