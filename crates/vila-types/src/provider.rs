//! Provider profiles and balance snapshots

use crate::{ProviderId, ProviderRole};
use serde::{Deserialize, Serialize};

/// A registered service provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Unique provider id
    pub id: ProviderId,
    /// Display name
    pub name: String,
    /// Registered role (one per provider)
    pub role: ProviderRole,
    /// Whether the provider is currently taking requests
    ///
    /// Invariant: never `true` while the combined balance is zero.
    pub online: bool,
}

/// Which balance a unit was taken from or added to
///
/// Trust credits are a provisional grant usable before a payment proof is
/// fully validated; they are consumed only after purchased credits are
/// exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BalanceKind {
    /// Purchased credits
    Credit,
    /// Provisional trust credits
    Trust,
}

/// Point-in-time view of a provider's spendable balance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    /// Purchased credits remaining
    pub credits: u32,
    /// Trust credits remaining
    pub trust: u32,
}

impl BalanceSnapshot {
    /// Combined spendable balance (saturating)
    pub fn total(&self) -> u32 {
        self.credits.saturating_add(self.trust)
    }

    /// Whether the provider can pay for one more accepted request
    pub fn is_spendable(&self) -> bool {
        self.total() > 0
    }
}
