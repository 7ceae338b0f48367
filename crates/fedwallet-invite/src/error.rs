use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InviteError {
    #[error("Invite code is empty")]
    Empty,

    #[error("Invite code must start with \"fed1\"")]
    MissingPrefix,

    #[error("Invite code has no payload after the prefix")]
    EmptyPayload,

    #[error("Invalid character {character:?} at position {position}")]
    InvalidCharacter { character: char, position: usize },

    #[error("Invite names no guardians")]
    NoGuardians,

    #[error("Invalid guardian endpoint {endpoint}: {reason}")]
    InvalidGuardian { endpoint: String, reason: String },

    #[error("Failed to encode invite: {0}")]
    Encoding(String),
}

pub type InviteResult<T> = Result<T, InviteError>;
