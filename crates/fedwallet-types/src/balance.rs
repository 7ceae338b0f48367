use crate::federation::FederationId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Amount in satoshis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_sats(sats: u64) -> Self {
        Self(sats)
    }

    pub const fn sats(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} sats", self.0)
    }
}

/// Balance entry as reported by the wallet backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationBalance {
    #[serde(rename = "identity_federation_id")]
    pub federation_id: FederationId,
    pub balance: Amount,
}

/// Balances keyed by federation, as of the last refresh.
///
/// A missing entry means the balance is unknown, not zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationBalances {
    balances: BTreeMap<FederationId, Amount>,
}

impl FederationBalances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: FederationId, amount: Amount) {
        self.balances.insert(id, amount);
    }

    pub fn get(&self, id: &FederationId) -> Option<Amount> {
        self.balances.get(id).copied()
    }

    pub fn remove(&mut self, id: &FederationId) -> Option<Amount> {
        self.balances.remove(id)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&FederationId) -> bool) {
        self.balances.retain(|id, _| keep(id));
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FederationId, Amount)> {
        self.balances.iter().map(|(id, amount)| (id, *amount))
    }

    /// Sum over all known balances, `None` on overflow
    pub fn total(&self) -> Option<Amount> {
        self.balances
            .values()
            .try_fold(Amount::ZERO, |acc, amount| acc.checked_add(*amount))
    }
}

impl FromIterator<FederationBalance> for FederationBalances {
    fn from_iter<I: IntoIterator<Item = FederationBalance>>(iter: I) -> Self {
        let mut balances = FederationBalances::new();
        for entry in iter {
            balances.insert(entry.federation_id, entry.balance);
        }
        balances
    }
}
