//! VILA Ledger - Provider credit and trust balances
//!
//! Each provider spends exactly 1 unit per accepted request. Purchased
//! credits are consumed first; trust credits (a provisional grant made
//! before a payment proof is validated) only after. The ledger is:
//!
//! - Account-keyed by ProviderId
//! - Append-only (every movement leaves an entry with balance-after)
//! - Never negative (debits are checked)
//!
//! # Invariants
//!
//! 1. No negative balances
//! 2. Every entry has a reason
//! 3. Balances are mutated only through `top_up`, `charge` and `refund`
//!
//! The charge/refund pair is the acceptance hold: the arbiter charges
//! before the conditional transition and refunds the same balance kind
//! when it loses the race, so a provider can never accept more requests
//! than it can pay for.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use vila_types::{BalanceKind, BalanceSnapshot, DispatchError, EntryId, ProviderId, RequestId, Result};

/// Type of ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    /// Credit (increase) to a balance
    Credit,
    /// Debit (decrease) from a balance
    Debit,
}

/// Reason for a ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryReason {
    /// External refill (purchase flow, or provisional trust grant)
    TopUp,
    /// Hold taken when a provider attempts to accept a request
    AcceptCharge { request_id: RequestId },
    /// Hold restored after the accept lost the race
    RaceRefund { request_id: RequestId },
}

/// A single ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: EntryId,
    pub provider: ProviderId,
    pub kind: BalanceKind,
    pub entry_type: EntryType,
    pub amount: u32,
    pub balance_after: BalanceSnapshot,
    pub reason: EntryReason,
    pub created_at: DateTime<Utc>,
}

/// The VILA credit ledger
///
/// Thread-safe and designed for concurrent access; every balance check
/// and mutation happens under one write-lock acquisition.
#[derive(Clone)]
pub struct CreditLedger {
    /// Balances per provider
    accounts: Arc<RwLock<HashMap<ProviderId, BalanceSnapshot>>>,
    /// All entries (append-only)
    entries: Arc<RwLock<Vec<LedgerEntry>>>,
}

impl CreditLedger {
    /// Create a new in-memory ledger
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Get the current balance of a provider (zero if never topped up)
    pub async fn balance(&self, provider: &ProviderId) -> BalanceSnapshot {
        let accounts = self.accounts.read().await;
        accounts.get(provider).copied().unwrap_or_default()
    }

    /// External refill entry point (purchase flow, or trust grant)
    ///
    /// Returns the new balance.
    pub async fn top_up(
        &self,
        provider: &ProviderId,
        amount: u32,
        kind: BalanceKind,
    ) -> Result<BalanceSnapshot> {
        if amount == 0 {
            return Err(DispatchError::validation("amount", "must be greater than zero"));
        }

        let mut accounts = self.accounts.write().await;
        let mut entries = self.entries.write().await;

        let balance = accounts.entry(provider.clone()).or_default();
        let updated = match kind {
            BalanceKind::Credit => balance.credits.checked_add(amount),
            BalanceKind::Trust => balance.trust.checked_add(amount),
        }
        .ok_or_else(|| DispatchError::validation("amount", "balance would overflow"))?;
        match kind {
            BalanceKind::Credit => balance.credits = updated,
            BalanceKind::Trust => balance.trust = updated,
        }
        let after = *balance;

        entries.push(LedgerEntry {
            entry_id: EntryId::new(),
            provider: provider.clone(),
            kind,
            entry_type: EntryType::Credit,
            amount,
            balance_after: after,
            reason: EntryReason::TopUp,
            created_at: Utc::now(),
        });

        debug!(provider = %provider, ?kind, amount, "balance topped up");
        Ok(after)
    }

    /// Debit exactly 1 unit for an accepted request
    ///
    /// Credits are consumed before trust. Returns which balance kind was
    /// debited (needed for a refund) and the balance after. Fails with
    /// `InsufficientBalance` when both balances are zero; nothing is
    /// mutated in that case.
    pub async fn charge(
        &self,
        provider: &ProviderId,
        request_id: &RequestId,
    ) -> Result<(BalanceKind, BalanceSnapshot)> {
        let mut accounts = self.accounts.write().await;
        let mut entries = self.entries.write().await;

        let balance = accounts
            .entry(provider.clone())
            .or_default();

        let kind = if balance.credits > 0 {
            balance.credits -= 1;
            BalanceKind::Credit
        } else if balance.trust > 0 {
            balance.trust -= 1;
            BalanceKind::Trust
        } else {
            return Err(DispatchError::InsufficientBalance {
                provider_id: provider.to_string(),
            });
        };
        let after = *balance;

        entries.push(LedgerEntry {
            entry_id: EntryId::new(),
            provider: provider.clone(),
            kind,
            entry_type: EntryType::Debit,
            amount: 1,
            balance_after: after,
            reason: EntryReason::AcceptCharge {
                request_id: request_id.clone(),
            },
            created_at: Utc::now(),
        });

        debug!(provider = %provider, request = %request_id, ?kind, "charged 1 unit");
        Ok((kind, after))
    }

    /// Restore a hold after a lost acceptance race
    ///
    /// The unit goes back to the same balance kind it was taken from.
    pub async fn refund(
        &self,
        provider: &ProviderId,
        kind: BalanceKind,
        request_id: &RequestId,
    ) -> BalanceSnapshot {
        let mut accounts = self.accounts.write().await;
        let mut entries = self.entries.write().await;

        let balance = accounts.entry(provider.clone()).or_default();
        match kind {
            BalanceKind::Credit => balance.credits += 1,
            BalanceKind::Trust => balance.trust += 1,
        }
        let after = *balance;

        entries.push(LedgerEntry {
            entry_id: EntryId::new(),
            provider: provider.clone(),
            kind,
            entry_type: EntryType::Credit,
            amount: 1,
            balance_after: after,
            reason: EntryReason::RaceRefund {
                request_id: request_id.clone(),
            },
            created_at: Utc::now(),
        });

        debug!(provider = %provider, request = %request_id, ?kind, "refunded 1 unit");
        after
    }

    /// Get all entries for a provider
    pub async fn provider_entries(&self, provider: &ProviderId) -> Vec<LedgerEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| &e.provider == provider)
            .cloned()
            .collect()
    }

    /// Get the total number of entries
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for CreditLedger {
    fn default() -> Self {
        Self::new()
    }
}
