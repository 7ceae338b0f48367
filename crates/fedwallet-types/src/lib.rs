//! Common types shared between fedwallet components

pub mod federation;
pub mod balance;
pub mod recommendation;
pub mod discovery;

/// Re-exports
pub use federation::{FederationId, FederationIdentity};
pub use balance::{Amount, FederationBalance, FederationBalances};
pub use recommendation::{AttestationId, RecommendationState};
pub use discovery::{DiscoveredFederation, FederationMetadata, Recommender};
