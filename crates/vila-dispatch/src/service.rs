//! Dispatch service
//!
//! The boundary everything outside this crate talks to. Wires the
//! store, ledger, directory, arbiter and expiration scheduler together
//! and exposes the operations of the engine: register and fund
//! providers, flip online status, submit and watch requests, open
//! provider sessions, accept.

use std::sync::Arc;
use std::time::Duration;

use vila_ledger::{CreditLedger, LedgerEntry};
use vila_store::{RequestStore, RequestWatch, StoreConfig};
use vila_types::{
    AcceptOutcome, BalanceKind, BalanceSnapshot, ClientId, DispatchError, NewRequest, ProviderId,
    ProviderProfile, ProviderRole, RequestId, Result, ServiceCategory, ServiceRequest,
};

use crate::arbiter::AcceptanceArbiter;
use crate::directory::ProviderDirectory;
use crate::expiry::ExpirationScheduler;
use crate::session::{AlertSink, NullAlertSink, ProviderSession};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// How long a request stays open for acceptance
    pub offer_window: Duration,
    /// Event bus capacity
    pub event_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            offer_window: Duration::from_secs(60),
            event_capacity: 256,
        }
    }
}

/// The assembled dispatch engine
pub struct DispatchService {
    store: RequestStore,
    ledger: CreditLedger,
    directory: ProviderDirectory,
    arbiter: AcceptanceArbiter,
    alerts: Arc<dyn AlertSink>,
    scheduler: Option<ExpirationScheduler>,
}

impl DispatchService {
    /// Build and start an engine with the default alert sink
    pub fn new(config: DispatchConfig) -> Self {
        Self::with_alerts(config, Arc::new(NullAlertSink))
    }

    /// Build and start an engine with a custom alert sink
    pub fn with_alerts(config: DispatchConfig, alerts: Arc<dyn AlertSink>) -> Self {
        let store = RequestStore::new(StoreConfig {
            offer_window: config.offer_window,
            event_capacity: config.event_capacity,
        });
        let ledger = CreditLedger::new();
        let directory = ProviderDirectory::new(ledger.clone());
        let arbiter = AcceptanceArbiter::new(store.clone(), ledger.clone(), directory.clone());
        let scheduler = ExpirationScheduler::spawn(store.clone());

        Self {
            store,
            ledger,
            directory,
            arbiter,
            alerts,
            scheduler: Some(scheduler),
        }
    }

    // ========================================================================
    // Provider lifecycle
    // ========================================================================

    /// Register a new provider; starts offline with an empty balance
    pub async fn register_provider(
        &self,
        name: impl Into<String>,
        role: ProviderRole,
    ) -> ProviderProfile {
        self.directory.register(name, role).await
    }

    /// Credit a provider's balance
    pub async fn top_up(
        &self,
        provider: &ProviderId,
        amount: u32,
        kind: BalanceKind,
    ) -> Result<BalanceSnapshot> {
        // Top-ups only make sense for registered providers.
        self.directory.get(provider).await?;
        self.ledger.top_up(provider, amount, kind).await
    }

    /// Current balance of a provider
    pub async fn balance(&self, provider: &ProviderId) -> BalanceSnapshot {
        self.ledger.balance(provider).await
    }

    /// A provider's full ledger history
    pub async fn ledger_entries(&self, provider: &ProviderId) -> Vec<LedgerEntry> {
        self.ledger.provider_entries(provider).await
    }

    /// Flip a provider's online status
    pub async fn set_online(&self, provider: &ProviderId, online: bool) -> Result<ProviderProfile> {
        self.directory.set_online(provider, online).await
    }

    /// Open a live session for an online provider
    pub async fn open_session(&self, provider: &ProviderId) -> Result<ProviderSession> {
        let profile = self.directory.get(provider).await?;
        if !profile.online {
            return Err(DispatchError::ProviderOffline {
                provider_id: provider.to_string(),
            });
        }
        Ok(ProviderSession::spawn(
            provider.clone(),
            self.store.clone(),
            self.ledger.clone(),
            self.directory.clone(),
            self.alerts.clone(),
        )
        .await)
    }

    // ========================================================================
    // Request lifecycle
    // ========================================================================

    /// Submit a new request; it goes out to eligible sessions immediately
    pub async fn submit_request(&self, new: NewRequest) -> Result<ServiceRequest> {
        self.store.create(new).await
    }

    /// Look up a request
    pub async fn request(&self, id: &RequestId) -> Result<ServiceRequest> {
        self.store.get(id).await
    }

    /// Live subscription to one request's updates
    pub async fn watch(&self, id: &RequestId) -> Result<RequestWatch> {
        self.store.watch(id).await
    }

    /// Client-initiated withdrawal of a pending request
    pub async fn cancel(&self, id: &RequestId, client: &ClientId) -> Result<ServiceRequest> {
        self.store.cancel(id, client).await
    }

    /// All pending requests in one category
    pub async fn pending_in(&self, category: ServiceCategory) -> Vec<ServiceRequest> {
        self.store.pending_in(category).await
    }

    /// Attempt to assign a request to a provider
    ///
    /// See [`AcceptanceArbiter::accept`] for the race semantics.
    pub async fn accept(
        &self,
        request_id: &RequestId,
        provider_id: &ProviderId,
    ) -> Result<AcceptOutcome> {
        self.arbiter.accept(request_id, provider_id).await
    }

    // ========================================================================
    // Accessors and shutdown
    // ========================================================================

    /// The underlying request store
    pub fn store(&self) -> &RequestStore {
        &self.store
    }

    /// The underlying credit ledger
    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    /// The provider directory
    pub fn directory(&self) -> &ProviderDirectory {
        &self.directory
    }

    /// Stop the background scheduler
    pub async fn shutdown(mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown().await;
        }
    }
}
