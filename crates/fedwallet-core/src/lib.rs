//! # fedwallet core
//!
//! Federation enrollment and membership state for a wallet that belongs to
//! several mutually untrusted federations at once.
//!
//! The pieces, leaves first:
//!
//! - [`FederationConnector`] joins a federation from an ordered list of
//!   invite codes, moving on to the next code when guardians are unreachable.
//! - [`FederationRegistry`] is the only owner of the membership set and
//!   announces every change.
//! - [`BalanceAggregator`] and [`RecommendationLedger`] cache re-fetchable,
//!   per-federation data and are pruned by the registry on removal.
//! - [`TransferRemovalCoordinator`] serializes removals and gates transfers.
//! - [`MembershipSession`] wires them together for one wallet session and is
//!   what presentation code talks to.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fedwallet_core::{MembershipSession, WalletConfig};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WalletConfig::load_or_create("fedwallet.toml")?;
//!     let backend = Arc::new(config.backend.build_http_backend()?);
//!     let session = MembershipSession::new(backend, config.membership.clone()).await;
//!
//!     session.refresh().await?;
//!     let joined = session.enroll(&["fed1..."]).await?;
//!     println!("joined {}", joined.name);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod config;
pub mod registry;
pub mod connector;
pub mod balances;
pub mod recommendations;
pub mod coordinator;
pub mod session;

pub use error::{ConfigError, EnrollmentError, MembershipError, RegistryError};
pub use config::{BackendConfig, LoggingConfig, MembershipConfig, WalletConfig};
pub use registry::{
    ExpirationWarning, FederationRegistry, MembershipEvent, MembershipObserver, RefreshSummary,
    WarningKind,
};
pub use connector::FederationConnector;
pub use balances::BalanceAggregator;
pub use recommendations::RecommendationLedger;
pub use coordinator::{TransferEligibility, TransferRemovalCoordinator};
pub use session::{DiscoveryEntry, MembershipSession};
