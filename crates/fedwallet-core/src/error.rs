use fedwallet_invite::InviteError;
use fedwallet_sync::BackendError;
use fedwallet_types::FederationId;
use std::io;
use thiserror::Error;

/// Registry-level membership violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Federation {0} is already registered")]
    DuplicateFederation(FederationId),

    #[error("Federation {0} is not registered")]
    NotFound(FederationId),
}

/// Why an `enroll` call did not produce a membership
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentError {
    #[error("Invalid invite code {code:?}: {source}")]
    InvalidInviteCode {
        code: String,
        #[source]
        source: InviteError,
    },

    #[error("No invite codes were given")]
    NoCandidates,

    #[error("Already a member of federation {0}")]
    DuplicateFederation(FederationId),

    /// The backend reports an existing membership but does not say which
    #[error("Already a member of the federation behind this invite: {0}")]
    AlreadyMember(#[source] BackendError),

    #[error("All {attempts} invite codes failed, last error: {last}")]
    AllCandidatesExhausted { attempts: usize, last: BackendError },

    #[error("Failed to join federation: {0}")]
    Join(#[source] BackendError),
}

/// Errors from membership operations other than enrollment
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MembershipError {
    #[error("Federation {0} is not registered")]
    NotFound(FederationId),

    #[error("Federation {0} is already registered")]
    DuplicateFederation(FederationId),

    #[error("Failed to publish recommendation: {0}")]
    Publish(#[source] BackendError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl From<RegistryError> for MembershipError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DuplicateFederation(id) => MembershipError::DuplicateFederation(id),
            RegistryError::NotFound(id) => MembershipError::NotFound(id),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
