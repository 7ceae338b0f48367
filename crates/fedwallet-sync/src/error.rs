use fedwallet_types::FederationId;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Closed set of failure kinds the wallet backend reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    GuardianUnreachable,
    InvalidArguments,
    AlreadyMember,
    NotFound,
    Unauthorized,
    Unavailable,
    #[serde(other)]
    Internal,
}

impl Display for BackendErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendErrorKind::GuardianUnreachable => "guardian_unreachable",
            BackendErrorKind::InvalidArguments => "invalid_arguments",
            BackendErrorKind::AlreadyMember => "already_member",
            BackendErrorKind::NotFound => "not_found",
            BackendErrorKind::Unauthorized => "unauthorized",
            BackendErrorKind::Unavailable => "unavailable",
            BackendErrorKind::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to connect to a federation: {0}")]
    GuardianUnreachable(String),

    #[error("Invalid arguments were given: {0}")]
    InvalidArguments(String),

    /// `federation_id` is set when the backend names the federation
    #[error("Already a member of federation: {message}")]
    AlreadyMember {
        message: String,
        federation_id: Option<FederationId>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            BackendErrorKind::GuardianUnreachable => BackendError::GuardianUnreachable(message),
            BackendErrorKind::InvalidArguments => BackendError::InvalidArguments(message),
            BackendErrorKind::AlreadyMember => BackendError::AlreadyMember {
                message,
                federation_id: None,
            },
            BackendErrorKind::NotFound => BackendError::NotFound(message),
            BackendErrorKind::Unauthorized => BackendError::Unauthorized(message),
            BackendErrorKind::Unavailable => BackendError::Unavailable(message),
            BackendErrorKind::Internal => BackendError::Internal(message),
        }
    }

    pub fn already_member(message: impl Into<String>, federation_id: Option<FederationId>) -> Self {
        BackendError::AlreadyMember {
            message: message.into(),
            federation_id,
        }
    }

    pub fn kind(&self) -> BackendErrorKind {
        match self {
            BackendError::GuardianUnreachable(_) => BackendErrorKind::GuardianUnreachable,
            BackendError::InvalidArguments(_) => BackendErrorKind::InvalidArguments,
            BackendError::AlreadyMember { .. } => BackendErrorKind::AlreadyMember,
            BackendError::NotFound(_) => BackendErrorKind::NotFound,
            BackendError::Unauthorized(_) => BackendErrorKind::Unauthorized,
            BackendError::Unavailable(_) => BackendErrorKind::Unavailable,
            BackendError::Internal(_) => BackendErrorKind::Internal,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            BackendError::AlreadyMember { message, .. } => message,
            BackendError::GuardianUnreachable(msg)
            | BackendError::InvalidArguments(msg)
            | BackendError::NotFound(msg)
            | BackendError::Unauthorized(msg)
            | BackendError::Unavailable(msg)
            | BackendError::Internal(msg) => msg,
        }
    }

    /// Whether a failed join should move on to the next invite candidate
    pub fn is_join_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            BackendErrorKind::GuardianUnreachable | BackendErrorKind::InvalidArguments
        )
    }

    /// Whether repeating the same read may succeed
    pub fn is_transient(&self) -> bool {
        self.kind() == BackendErrorKind::Unavailable
    }
}

/// Error body returned by the wallet daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ErrorBody {
    pub kind: BackendErrorKind,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation_id: Option<FederationId>,
}

impl From<ErrorBody> for BackendError {
    fn from(body: ErrorBody) -> Self {
        match body.kind {
            BackendErrorKind::AlreadyMember => BackendError::already_member(body.message, body.federation_id),
            kind => BackendError::new(kind, body.message),
        }
    }
}

// Transport failures never carry a backend verdict, so they only ever
// become Unavailable or Internal.
pub fn map_reqwest_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Unavailable("Request timed out".to_string())
    } else if err.is_connect() {
        BackendError::Unavailable(format!("Connection error: {}", err))
    } else if err.is_decode() {
        BackendError::Internal(format!("Malformed response: {}", err))
    } else if let Some(status) = err.status() {
        map_status(status.as_u16(), err.to_string())
    } else {
        BackendError::Unavailable(err.to_string())
    }
}

pub(crate) fn map_status(status: u16, message: String) -> BackendError {
    match status {
        401 | 403 => BackendError::Unauthorized(message),
        404 => BackendError::NotFound(message),
        408 | 429 | 502 | 503 | 504 => BackendError::Unavailable(message),
        _ => BackendError::Internal(message),
    }
}
