use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Identifier of a guardian group, unique within a wallet's membership set
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FederationId(String);

impl FederationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FederationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FederationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for FederationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for FederationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identity metadata of a federation the wallet has joined.
///
/// Created by the backend when enrollment succeeds and never mutated
/// afterwards; a changed federation shows up as a new value on the next
/// registry refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationIdentity {
    /// Guardian group identifier
    #[serde(rename = "federation_id")]
    pub id: FederationId,

    /// Human-readable federation name
    #[serde(rename = "federation_name", default)]
    pub name: String,

    /// Message shown to new members
    #[serde(default)]
    pub welcome_message: Option<String>,

    /// When the federation announced it will shut down
    #[serde(
        rename = "federation_expiry_timestamp",
        with = "chrono::serde::ts_seconds_option",
        default
    )]
    pub expiry: Option<DateTime<Utc>>,

    /// Invite code the wallet joined with
    pub invite_code: String,

    /// External metadata document
    #[serde(rename = "meta_external_url", default)]
    pub external_metadata_url: Option<String>,

    /// End of the promotional banner window
    #[serde(with = "chrono::serde::ts_seconds_option", default)]
    pub popup_end_timestamp: Option<DateTime<Utc>>,

    /// Banner text shown until `popup_end_timestamp`
    #[serde(rename = "popup_countdown_message", default)]
    pub popup_message: Option<String>,
}

impl FederationIdentity {
    /// Minimal identity with only the mandatory fields set
    pub fn new(id: impl Into<FederationId>, name: impl Into<String>, invite_code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            welcome_message: None,
            expiry: None,
            invite_code: invite_code.into(),
            external_metadata_url: None,
            popup_end_timestamp: None,
            popup_message: None,
        }
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_popup(mut self, message: impl Into<String>, ends_at: DateTime<Utc>) -> Self {
        self.popup_message = Some(message.into());
        self.popup_end_timestamp = Some(ends_at);
        self
    }

    pub fn with_welcome_message(mut self, message: impl Into<String>) -> Self {
        self.welcome_message = Some(message.into());
        self
    }

    /// Whether the promotional banner should still be displayed at `now`
    pub fn popup_active(&self, now: DateTime<Utc>) -> bool {
        match (&self.popup_message, self.popup_end_timestamp) {
            (Some(message), Some(end)) => !message.is_empty() && end > now,
            _ => false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.map_or(false, |expiry| expiry <= now)
    }

    /// True if the federation expires within `window` of `now` (or already has)
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.expiry.map_or(false, |expiry| expiry <= now + window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_identity_wire_format() {
        let json = serde_json::json!({
            "federation_id": "fed-abc",
            "federation_name": "Community Mint",
            "welcome_message": "hi",
            "federation_expiry_timestamp": 1_900_000_000,
            "invite_code": "fed1xyz",
            "meta_external_url": "https://example.com/meta.json",
            "popup_end_timestamp": null,
            "popup_countdown_message": null
        });

        let identity: FederationIdentity = serde_json::from_value(json).unwrap();
        assert_eq!(identity.id, FederationId::from("fed-abc"));
        assert_eq!(identity.name, "Community Mint");
        assert_eq!(identity.expiry, Some(at(1_900_000_000)));
        assert_eq!(identity.external_metadata_url.as_deref(), Some("https://example.com/meta.json"));
        assert!(identity.popup_end_timestamp.is_none());

        let back = serde_json::to_value(&identity).unwrap();
        assert_eq!(back["federation_id"], "fed-abc");
        assert_eq!(back["federation_expiry_timestamp"], 1_900_000_000);
    }

    #[test]
    fn test_optional_fields_default_when_missing() {
        let json = serde_json::json!({
            "federation_id": "fed-abc",
            "invite_code": "fed1xyz"
        });
        let identity: FederationIdentity = serde_json::from_value(json).unwrap();
        assert!(identity.name.is_empty());
        assert!(identity.expiry.is_none());
        assert!(identity.welcome_message.is_none());
    }

    #[test]
    fn test_popup_window() {
        let identity = FederationIdentity::new("f1", "F1", "fed1a").with_popup("closing soon", at(2_000));
        assert!(identity.popup_active(at(1_000)));
        assert!(!identity.popup_active(at(2_000)));

        let silent = FederationIdentity::new("f1", "F1", "fed1a").with_popup("", at(2_000));
        assert!(!silent.popup_active(at(1_000)));
    }

    #[test]
    fn test_expiry_window() {
        let identity = FederationIdentity::new("f1", "F1", "fed1a").with_expiry(at(10 * 86_400));
        let now = at(5 * 86_400);

        assert!(!identity.is_expired(now));
        assert!(identity.expires_within(now, Duration::days(7)));
        assert!(!identity.expires_within(now, Duration::days(2)));
        assert!(identity.is_expired(at(11 * 86_400)));

        let forever = FederationIdentity::new("f2", "F2", "fed1b");
        assert!(!forever.expires_within(now, Duration::days(365)));
    }
}
