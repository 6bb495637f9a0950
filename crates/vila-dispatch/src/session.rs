//! Provider session
//!
//! One actor per online provider. It tails the store's event bus, keeps
//! a live set of offers the provider is currently allowed to accept, and
//! pushes [`OfferUpdate`]s to the provider's device. Offers leave the
//! set when someone else takes the request, when the client cancels,
//! when the store expires it, or when the provider's own view of the
//! offer window runs out.
//!
//! Declines are local: they hide the offer from this provider and never
//! touch the shared record, so the request stays available to everyone
//! else until its own deadline.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use vila_ledger::CreditLedger;
use vila_store::RequestStore;
use vila_types::{ProviderId, RequestEvent, RequestId, RequestStatus, ServiceRequest};

use crate::directory::ProviderDirectory;
use crate::eligibility::is_eligible;

/// Why an offer was withdrawn from a provider's view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawReason {
    /// The provider's offer window ran out
    Timeout,
    /// Another provider accepted the request
    Taken,
    /// The client cancelled the request
    Cancelled,
    /// The request's own deadline passed with no accept
    Expired,
}

/// Update pushed to a provider's device
#[derive(Debug, Clone)]
pub enum OfferUpdate {
    /// A new request this provider may accept
    Incoming { request: ServiceRequest },
    /// A previously offered request is no longer available
    Withdrawn {
        request_id: RequestId,
        reason: WithdrawReason,
    },
}

/// Side channel for audible/visible alerts on the provider's device
///
/// The session rings once per incoming offer and silences it when the
/// offer is withdrawn or the provider acts on it.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn ring(&self, request: &ServiceRequest);
    async fn silence(&self, request_id: &RequestId);
}

/// Alert sink that does nothing
pub struct NullAlertSink;

#[async_trait]
impl AlertSink for NullAlertSink {
    async fn ring(&self, _request: &ServiceRequest) {}
    async fn silence(&self, _request_id: &RequestId) {}
}

/// Idle sleep when the session holds no offers
const IDLE_TICK: Duration = Duration::from_secs(60);

/// A provider's live view of acceptable requests
///
/// Spawned when the provider goes online, closed when it goes offline.
pub struct ProviderSession {
    provider: ProviderId,
    offers: Arc<RwLock<HashMap<RequestId, ServiceRequest>>>,
    declined: Arc<RwLock<HashSet<RequestId>>>,
    updates: mpsc::Receiver<OfferUpdate>,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProviderSession {
    /// Spawn the session actor for `provider`
    ///
    /// Subscribes to the bus before seeding from the pending snapshot so
    /// no request created in between is missed.
    pub async fn spawn(
        provider: ProviderId,
        store: RequestStore,
        ledger: CreditLedger,
        directory: ProviderDirectory,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let offers: Arc<RwLock<HashMap<RequestId, ServiceRequest>>> =
            Arc::new(RwLock::new(HashMap::new()));
        let declined: Arc<RwLock<HashSet<RequestId>>> = Arc::new(RwLock::new(HashSet::new()));
        let (tx, updates) = mpsc::channel(64);
        let (stop_tx, stop_rx) = oneshot::channel();

        let events = store.subscribe();
        let actor = SessionActor {
            provider: provider.clone(),
            store,
            ledger,
            directory,
            alerts,
            offers: offers.clone(),
            declined: declined.clone(),
            tx,
        };
        // Seed after subscribing; duplicates are deduplicated by id.
        let handle = tokio::spawn(actor.run(events, stop_rx));

        Self {
            provider,
            offers,
            declined,
            updates,
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// The provider this session belongs to
    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    /// Snapshot of the offers currently open to this provider
    pub async fn offers(&self) -> Vec<ServiceRequest> {
        self.offers.read().await.values().cloned().collect()
    }

    /// Receive the next pushed update, or `None` after close
    pub async fn next_update(&mut self) -> Option<OfferUpdate> {
        self.updates.recv().await
    }

    /// Hide an offer from this provider's view
    ///
    /// Local and idempotent: the request remains open to every other
    /// eligible provider, and declining twice is a no-op.
    pub async fn decline(&self, request_id: &RequestId) {
        self.declined.write().await.insert(request_id.clone());
        if self.offers.write().await.remove(request_id).is_some() {
            debug!(provider = %self.provider, request = %request_id, "offer declined");
        }
    }

    /// Stop the actor and wait for it to finish
    pub async fn close(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

struct SessionActor {
    provider: ProviderId,
    store: RequestStore,
    ledger: CreditLedger,
    directory: ProviderDirectory,
    alerts: Arc<dyn AlertSink>,
    offers: Arc<RwLock<HashMap<RequestId, ServiceRequest>>>,
    declined: Arc<RwLock<HashSet<RequestId>>>,
    tx: mpsc::Sender<OfferUpdate>,
}

impl SessionActor {
    async fn run(
        self,
        mut events: broadcast::Receiver<RequestEvent>,
        mut stop: oneshot::Receiver<()>,
    ) {
        self.reconcile().await;

        loop {
            let tick = self.next_deadline().await;
            tokio::select! {
                _ = &mut stop => break,
                _ = tokio::time::sleep(tick) => {
                    self.sweep_overdue().await;
                }
                event = events.recv() => match event {
                    Ok(event) => self.handle_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(provider = %self.provider, skipped, "session lagged, reconciling");
                        self.reconcile().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    /// Time until the earliest offer deadline, or an idle tick
    async fn next_deadline(&self) -> Duration {
        let offers = self.offers.read().await;
        let earliest = offers.values().map(|r| r.expires_at).min();
        match earliest {
            Some(deadline) => (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO),
            None => IDLE_TICK,
        }
    }

    /// Withdraw every offer whose window has run out
    async fn sweep_overdue(&self) {
        let now = Utc::now();
        let overdue: Vec<RequestId> = {
            let offers = self.offers.read().await;
            offers
                .values()
                .filter(|r| r.is_overdue(now))
                .map(|r| r.id.clone())
                .collect()
        };
        for id in overdue {
            self.withdraw(&id, WithdrawReason::Timeout).await;
        }
    }

    async fn handle_event(&self, event: RequestEvent) {
        match event {
            RequestEvent::Created { request } => self.offer(request).await,
            RequestEvent::Accepted { request } => {
                // The winner's own device resolves through the accept
                // call; only losers see a withdrawal.
                if request.assigned_provider.as_ref() == Some(&self.provider) {
                    self.drop_offer(&request.id).await;
                } else {
                    self.withdraw(&request.id, WithdrawReason::Taken).await;
                }
            }
            RequestEvent::Cancelled { request } => {
                self.withdraw(&request.id, WithdrawReason::Cancelled).await;
            }
            RequestEvent::Expired { request } => {
                self.withdraw(&request.id, WithdrawReason::Expired).await;
            }
        }
    }

    /// Add an offer if this provider is eligible for it right now
    async fn offer(&self, request: ServiceRequest) {
        if self.declined.read().await.contains(&request.id) {
            return;
        }
        let profile = match self.directory.get(&self.provider).await {
            Ok(profile) => profile,
            Err(_) => return,
        };
        let balance = self.ledger.balance(&self.provider).await;
        if !is_eligible(&request, &profile, &balance) {
            return;
        }

        let inserted = self
            .offers
            .write()
            .await
            .insert(request.id.clone(), request.clone())
            .is_none();
        if inserted {
            self.alerts.ring(&request).await;
            self.push(OfferUpdate::Incoming { request }).await;
        }
    }

    /// Remove an offer and notify the device, if it was present
    async fn withdraw(&self, request_id: &RequestId, reason: WithdrawReason) {
        if self.offers.write().await.remove(request_id).is_some() {
            self.alerts.silence(request_id).await;
            self.push(OfferUpdate::Withdrawn {
                request_id: request_id.clone(),
                reason,
            })
            .await;
        }
    }

    /// Remove an offer without a device notification
    async fn drop_offer(&self, request_id: &RequestId) {
        if self.offers.write().await.remove(request_id).is_some() {
            self.alerts.silence(request_id).await;
        }
    }

    /// Rebuild the offer set from a store snapshot
    ///
    /// Used at startup and after bus lag. Offers that vanished get a
    /// withdrawal derived from their stored terminal status.
    async fn reconcile(&self) {
        let profile = match self.directory.get(&self.provider).await {
            Ok(profile) => profile,
            Err(_) => return,
        };
        let pending = self.store.pending_in(profile.role.category()).await;

        let stale: Vec<RequestId> = {
            let offers = self.offers.read().await;
            offers
                .keys()
                .filter(|id| !pending.iter().any(|r| &&r.id == id))
                .cloned()
                .collect()
        };
        for id in stale {
            let reason = match self.store.get(&id).await {
                Ok(r) if r.status == RequestStatus::Accepted => WithdrawReason::Taken,
                Ok(r) if r.status == RequestStatus::Cancelled => WithdrawReason::Cancelled,
                _ => WithdrawReason::Expired,
            };
            self.withdraw(&id, reason).await;
        }

        for request in pending {
            self.offer(request).await;
        }
    }

    async fn push(&self, update: OfferUpdate) {
        // A device that stops draining its channel must not stall the
        // actor; the reconcile path repairs any gap.
        if self.tx.try_send(update).is_err() {
            warn!(provider = %self.provider, "update channel full, dropping");
        }
    }
}
