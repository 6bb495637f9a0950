//! Provider directory
//!
//! Registry of provider profiles and the single place where online
//! status changes. Going online requires a positive combined balance;
//! the arbiter forces a provider offline when an accept charge drains
//! the last unit. Together these keep the invariant that a provider
//! with zero balance is never online.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;
use vila_ledger::CreditLedger;
use vila_types::{DispatchError, ProviderId, ProviderProfile, ProviderRole, Result};

/// Registry of all providers known to the dispatch engine
#[derive(Clone)]
pub struct ProviderDirectory {
    providers: Arc<RwLock<HashMap<ProviderId, ProviderProfile>>>,
    ledger: CreditLedger,
}

impl ProviderDirectory {
    /// Create an empty directory backed by `ledger` for balance gates
    pub fn new(ledger: CreditLedger) -> Self {
        Self {
            providers: Arc::new(RwLock::new(HashMap::new())),
            ledger,
        }
    }

    /// Register a new provider; starts offline
    pub async fn register(&self, name: impl Into<String>, role: ProviderRole) -> ProviderProfile {
        let profile = ProviderProfile {
            id: ProviderId::new(),
            name: name.into(),
            role,
            online: false,
        };
        self.providers
            .write()
            .await
            .insert(profile.id.clone(), profile.clone());
        info!(provider = %profile.id, role = %profile.role, "provider registered");
        profile
    }

    /// Get a provider profile by id
    pub async fn get(&self, id: &ProviderId) -> Result<ProviderProfile> {
        self.providers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DispatchError::ProviderNotFound {
                provider_id: id.to_string(),
            })
    }

    /// Set a provider's online status
    ///
    /// Refuses to go online with zero combined balance; going offline is
    /// always allowed.
    pub async fn set_online(&self, id: &ProviderId, online: bool) -> Result<ProviderProfile> {
        if online && !self.ledger.balance(id).await.is_spendable() {
            return Err(DispatchError::InsufficientBalance {
                provider_id: id.to_string(),
            });
        }

        let mut providers = self.providers.write().await;
        let profile = providers
            .get_mut(id)
            .ok_or_else(|| DispatchError::ProviderNotFound {
                provider_id: id.to_string(),
            })?;
        profile.online = online;
        info!(provider = %id, online, "provider status changed");
        Ok(profile.clone())
    }

    /// Force a provider offline (balance exhausted)
    pub async fn force_offline(&self, id: &ProviderId) -> Result<ProviderProfile> {
        let mut providers = self.providers.write().await;
        let profile = providers
            .get_mut(id)
            .ok_or_else(|| DispatchError::ProviderNotFound {
                provider_id: id.to_string(),
            })?;
        if profile.online {
            profile.online = false;
            info!(provider = %id, "provider forced offline, balance exhausted");
        }
        Ok(profile.clone())
    }

    /// Snapshot of all registered providers
    pub async fn all(&self) -> Vec<ProviderProfile> {
        self.providers.read().await.values().cloned().collect()
    }
}
