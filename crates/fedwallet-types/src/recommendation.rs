use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Whether the local user has published a recommendation for a federation.
///
/// `Unknown` until the first backend query (or local publish) settles it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationState {
    #[default]
    Unknown,
    Recommended,
    NotRecommended,
}

impl RecommendationState {
    pub fn from_recommended(recommended: bool) -> Self {
        if recommended {
            RecommendationState::Recommended
        } else {
            RecommendationState::NotRecommended
        }
    }

    pub fn is_recommended(self) -> bool {
        self == RecommendationState::Recommended
    }
}

impl Display for RecommendationState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RecommendationState::Unknown => write!(f, "unknown"),
            RecommendationState::Recommended => write!(f, "recommended"),
            RecommendationState::NotRecommended => write!(f, "not recommended"),
        }
    }
}

/// Identifier of a published recommendation event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttestationId(pub String);

impl Display for AttestationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
