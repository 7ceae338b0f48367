use crate::error::{EnrollmentError, RegistryError};
use crate::registry::FederationRegistry;
use fedwallet_invite::{FederationDescriptor, InviteCode};
use fedwallet_sync::{BackendError, BackendResult, WalletBackend};
use fedwallet_types::FederationIdentity;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Establishes membership from an ordered list of invite-code candidates.
///
/// Candidates are tried strictly one after another. Unreachable guardians
/// and rejected join arguments move on to the next candidate; any other
/// failure ends the call. Only a successful join reaches the registry.
pub struct FederationConnector {
    backend: Arc<dyn WalletBackend>,
    registry: Arc<FederationRegistry>,
}

impl FederationConnector {
    pub fn new(backend: Arc<dyn WalletBackend>, registry: Arc<FederationRegistry>) -> Self {
        Self { backend, registry }
    }

    /// Join the first candidate that works.
    ///
    /// Dropping the returned future abandons the call: an attempt already in
    /// flight runs to completion in the background and its result is thrown
    /// away.
    pub async fn connect<S: AsRef<str>>(&self, candidates: &[S]) -> Result<FederationIdentity, EnrollmentError> {
        let descriptors = parse_candidates(candidates)?;

        for descriptor in &descriptors {
            if let Some(id) = &descriptor.federation_id {
                if self.registry.contains(id).await {
                    info!(federation_id = %id, "Invite points at a federation we already belong to");
                    return Err(EnrollmentError::DuplicateFederation(id.clone()));
                }
            }
        }

        let mut last_error = None;
        for (index, descriptor) in descriptors.iter().enumerate() {
            debug!(candidate = index, opaque = descriptor.is_opaque(), "Attempting to join federation");

            match self.attempt(descriptor.code.as_str()).await {
                Ok(identity) => {
                    info!(candidate = index, federation_id = %identity.id, "Joined federation");
                    return match self.registry.add(identity.clone()).await {
                        Ok(()) => Ok(identity),
                        Err(RegistryError::DuplicateFederation(id)) | Err(RegistryError::NotFound(id)) => {
                            Err(EnrollmentError::DuplicateFederation(id))
                        }
                    };
                }
                Err(err) if err.is_join_recoverable() => {
                    warn!(candidate = index, kind = %err.kind(), "Join failed, trying next invite code: {}", err);
                    last_error = Some(err);
                }
                Err(BackendError::AlreadyMember { message, federation_id }) => {
                    info!(candidate = index, "Backend reports an existing membership");
                    return Err(match federation_id.or_else(|| descriptor.federation_id.clone()) {
                        Some(id) => EnrollmentError::DuplicateFederation(id),
                        None => EnrollmentError::AlreadyMember(BackendError::already_member(message, None)),
                    });
                }
                Err(err) => {
                    error!(candidate = index, kind = %err.kind(), "Join failed: {}", err);
                    return Err(EnrollmentError::Join(err));
                }
            }
        }

        match last_error {
            Some(last) => Err(EnrollmentError::AllCandidatesExhausted {
                attempts: descriptors.len(),
                last,
            }),
            None => Err(EnrollmentError::NoCandidates),
        }
    }

    /// One join attempt, detached from the caller so abandoning `connect`
    /// never cuts a guardian handshake short.
    async fn attempt(&self, invite_code: &str) -> BackendResult<FederationIdentity> {
        let backend = Arc::clone(&self.backend);
        let invite_code = invite_code.to_string();
        let handle = tokio::spawn(async move { backend.join_federation(&invite_code).await });

        handle
            .await
            .map_err(|e| BackendError::Internal(format!("Join attempt aborted: {}", e)))?
    }
}

/// Validate every candidate before any network call
fn parse_candidates<S: AsRef<str>>(candidates: &[S]) -> Result<Vec<FederationDescriptor>, EnrollmentError> {
    if candidates.is_empty() {
        return Err(EnrollmentError::NoCandidates);
    }

    candidates
        .iter()
        .map(|candidate| {
            InviteCode::parse(candidate.as_ref()).map_err(|source| EnrollmentError::InvalidInviteCode {
                code: candidate.as_ref().to_string(),
                source,
            })
        })
        .collect()
}
