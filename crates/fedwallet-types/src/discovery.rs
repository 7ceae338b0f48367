use crate::federation::FederationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display metadata published alongside a federation announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationMetadata {
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub about: Option<String>,
}

/// A contact who recommended a discovered federation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommender {
    pub pubkey: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A federation announced on the network and possibly recommended by contacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredFederation {
    pub id: FederationId,
    /// Candidate invite codes in the order they should be tried
    pub invite_codes: Vec<String>,
    pub pubkey: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    pub event_id: String,
    #[serde(default)]
    pub metadata: Option<FederationMetadata>,
    #[serde(default)]
    pub recommendations: Vec<Recommender>,
}

impl DiscoveredFederation {
    /// Name to show, falling back to the federation id
    pub fn display_name(&self) -> &str {
        self.metadata
            .as_ref()
            .map(|meta| meta.name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.id.as_str())
    }
}
