use crate::error::{InviteError, InviteResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use fedwallet_types::FederationId;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use url::Url;

/// Human-readable part plus separator that every invite code starts with
pub const INVITE_PREFIX: &str = "fed1";

const GUARDIAN_SCHEMES: &[&str] = &["http", "https", "ws", "wss"];

/// A syntactically valid, normalized invite code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InviteCode(String);

/// Structured content of a self-describing invite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitePayload {
    pub federation_id: FederationId,
    pub guardians: Vec<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
}

#[derive(Deserialize)]
struct RawInvitePayload {
    federation_id: String,
    #[serde(default)]
    guardians: Vec<String>,
    #[serde(default)]
    api_secret: Option<String>,
}

/// What a parsed invite tells us before any guardian is contacted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederationDescriptor {
    pub code: InviteCode,
    /// Known only for self-describing invites
    pub federation_id: Option<FederationId>,
    pub guardians: Vec<Url>,
    pub api_secret: Option<String>,
}

impl FederationDescriptor {
    /// True when the payload could not be interpreted locally
    pub fn is_opaque(&self) -> bool {
        self.federation_id.is_none()
    }
}

impl InviteCode {
    /// Parse an invite string into a descriptor.
    ///
    /// Surrounding whitespace is ignored and the prefix is matched
    /// case-insensitively.
    pub fn parse(code: &str) -> InviteResult<FederationDescriptor> {
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(InviteError::Empty);
        }

        let prefix_len = INVITE_PREFIX.len();
        let has_prefix = trimmed
            .get(..prefix_len)
            .map_or(false, |prefix| prefix.eq_ignore_ascii_case(INVITE_PREFIX));
        if !has_prefix {
            return Err(InviteError::MissingPrefix);
        }

        let payload = &trimmed[prefix_len..];
        if payload.is_empty() {
            return Err(InviteError::EmptyPayload);
        }

        if let Some((offset, character)) = payload
            .char_indices()
            .find(|(_, c)| !is_payload_char(*c))
        {
            return Err(InviteError::InvalidCharacter {
                character,
                position: prefix_len + offset,
            });
        }

        let code = InviteCode(format!("{}{}", INVITE_PREFIX, payload));

        match decode_payload(payload)? {
            Some(decoded) => Ok(FederationDescriptor {
                code,
                federation_id: Some(decoded.federation_id),
                guardians: decoded.guardians,
                api_secret: decoded.api_secret,
            }),
            None => Ok(FederationDescriptor {
                code,
                federation_id: None,
                guardians: Vec::new(),
                api_secret: None,
            }),
        }
    }

    /// Build a self-describing invite code
    pub fn encode(payload: &InvitePayload) -> InviteResult<InviteCode> {
        if payload.guardians.is_empty() {
            return Err(InviteError::NoGuardians);
        }
        for guardian in &payload.guardians {
            check_guardian(guardian)?;
        }

        let json = serde_json::to_vec(payload).map_err(|e| InviteError::Encoding(e.to_string()))?;
        Ok(InviteCode(format!("{}{}", INVITE_PREFIX, URL_SAFE_NO_PAD.encode(json))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl FromStr for InviteCode {
    type Err = InviteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InviteCode::parse(s).map(|descriptor| descriptor.code)
    }
}

impl Display for InviteCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for InviteCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_payload_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Interpret the payload as a JSON invite. `Ok(None)` means opaque.
fn decode_payload(payload: &str) -> InviteResult<Option<InvitePayload>> {
    let Ok(bytes) = URL_SAFE_NO_PAD.decode(payload) else {
        return Ok(None);
    };
    let Ok(raw) = serde_json::from_slice::<RawInvitePayload>(&bytes) else {
        return Ok(None);
    };

    if raw.guardians.is_empty() {
        return Err(InviteError::NoGuardians);
    }

    let mut guardians = Vec::with_capacity(raw.guardians.len());
    for endpoint in raw.guardians {
        let url = Url::parse(&endpoint).map_err(|e| InviteError::InvalidGuardian {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;
        check_guardian(&url)?;
        guardians.push(url);
    }

    Ok(Some(InvitePayload {
        federation_id: FederationId::new(raw.federation_id),
        guardians,
        api_secret: raw.api_secret,
    }))
}

fn check_guardian(url: &Url) -> InviteResult<()> {
    if !GUARDIAN_SCHEMES.contains(&url.scheme()) {
        return Err(InviteError::InvalidGuardian {
            endpoint: url.to_string(),
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(InviteError::InvalidGuardian {
            endpoint: url.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(())
}
