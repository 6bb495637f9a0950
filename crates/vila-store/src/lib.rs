//! VILA Store - Durable, subscribable home of service requests
//!
//! The store exclusively owns `ServiceRequest` records. Every edge out of
//! `Pending` goes through [`RequestStore::transition`], a conditional
//! write that checks and mutates under a single write-lock acquisition.
//! That lock is the serialization point of the whole engine: among all
//! concurrent accept/cancel/expire attempts for one request, exactly one
//! wins and the rest observe `Conflict`. No caller is permitted to
//! read-modify-write a record around this contract.
//!
//! Every committed transition is fanned out on a broadcast bus so that
//! provider sessions, client watchers and the expiration scheduler react
//! without polling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};
use vila_types::{
    ClientId, DispatchError, NewRequest, ProviderId, RequestEvent, RequestId, RequestStatus,
    Result, ServiceCategory, ServiceRequest,
};

/// Configuration for the request store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long a request stays open for acceptance
    pub offer_window: Duration,
    /// Broadcast bus capacity; slow subscribers lag and reconcile
    pub event_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            // Reference behavior: 60 seconds from creation
            offer_window: Duration::from_secs(60),
            event_capacity: 256,
        }
    }
}

/// The VILA request store
///
/// Cheap to clone; all clones share the same records and bus.
#[derive(Clone)]
pub struct RequestStore {
    requests: Arc<RwLock<HashMap<RequestId, ServiceRequest>>>,
    events: broadcast::Sender<RequestEvent>,
    offer_window: chrono::Duration,
}

impl RequestStore {
    /// Create a new in-memory store
    pub fn new(config: StoreConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        let offer_window = chrono::Duration::from_std(config.offer_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            events,
            offer_window,
        }
    }

    /// Insert a new `Pending` record and broadcast it
    ///
    /// Fails with a validation error when origin or destination is blank;
    /// nothing is mutated in that case.
    pub async fn create(&self, new: NewRequest) -> Result<ServiceRequest> {
        if new.origin.trim().is_empty() {
            return Err(DispatchError::validation("origin", "must not be empty"));
        }
        if new.destination.trim().is_empty() {
            return Err(DispatchError::validation("destination", "must not be empty"));
        }

        let now = Utc::now();
        let request = ServiceRequest {
            id: RequestId::new(),
            category: new.category,
            client: new.client,
            origin: new.origin,
            destination: new.destination,
            price: new.price,
            status: RequestStatus::Pending,
            assigned_provider: None,
            created_at: now,
            expires_at: now + self.offer_window,
        };

        self.requests
            .write()
            .await
            .insert(request.id.clone(), request.clone());

        info!(request = %request.id, category = %request.category, "request created");
        let _ = self.events.send(RequestEvent::Created {
            request: request.clone(),
        });
        Ok(request)
    }

    /// Get a request by id
    pub async fn get(&self, id: &RequestId) -> Result<ServiceRequest> {
        self.requests
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DispatchError::RequestNotFound {
                request_id: id.to_string(),
            })
    }

    /// Conditional transition: succeeds only if the record's current
    /// status equals `from`, otherwise returns `Conflict` without
    /// mutating anything.
    ///
    /// `assigned` must be `Some` exactly when `to` is `Accepted`; the
    /// assigned provider is set then and never changes afterwards.
    pub async fn transition(
        &self,
        id: &RequestId,
        from: RequestStatus,
        to: RequestStatus,
        assigned: Option<ProviderId>,
    ) -> Result<ServiceRequest> {
        if from.is_terminal() {
            return Err(DispatchError::validation("from", "terminal statuses admit no transition"));
        }
        if matches!(to, RequestStatus::Accepted) != assigned.is_some() {
            return Err(DispatchError::validation(
                "assigned",
                "provider must be set exactly on transition to accepted",
            ));
        }

        // Check-and-mutate under one write guard: the serialization point.
        let mut requests = self.requests.write().await;
        let request = requests
            .get_mut(id)
            .ok_or_else(|| DispatchError::RequestNotFound {
                request_id: id.to_string(),
            })?;

        if request.status != from {
            return Err(DispatchError::Conflict {
                request_id: id.to_string(),
                status: request.status.to_string(),
            });
        }

        request.status = to;
        if let Some(provider) = assigned {
            request.assigned_provider = Some(provider);
        }
        let snapshot = request.clone();
        drop(requests);

        let event = match to {
            RequestStatus::Accepted => RequestEvent::Accepted {
                request: snapshot.clone(),
            },
            RequestStatus::Expired => RequestEvent::Expired {
                request: snapshot.clone(),
            },
            RequestStatus::Cancelled => RequestEvent::Cancelled {
                request: snapshot.clone(),
            },
            RequestStatus::Pending => unreachable!("transition target is never pending"),
        };
        info!("{}", event.summary());
        let _ = self.events.send(event);

        Ok(snapshot)
    }

    /// Client-initiated withdrawal; allowed only while `Pending`
    ///
    /// A lost race surfaces as `Conflict` ("already resolved").
    pub async fn cancel(&self, id: &RequestId, client: &ClientId) -> Result<ServiceRequest> {
        // The client field is immutable, so this read needs no lock
        // coupling with the conditional write below.
        let request = self.get(id).await?;
        if &request.client != client {
            return Err(DispatchError::validation(
                "client",
                "only the requesting client may cancel",
            ));
        }
        self.transition(id, RequestStatus::Pending, RequestStatus::Cancelled, None)
            .await
    }

    /// Expire an overdue request; first caller wins
    ///
    /// Any party may trigger this once the record's own deadline has
    /// passed; a late accept afterwards is rejected the same way a lost
    /// race is.
    pub async fn expire(&self, id: &RequestId) -> Result<ServiceRequest> {
        let request = self.get(id).await?;
        if !request.is_overdue(Utc::now()) {
            return Err(DispatchError::DeadlineNotReached {
                request_id: id.to_string(),
            });
        }
        self.transition(id, RequestStatus::Pending, RequestStatus::Expired, None)
            .await
    }

    /// Subscribe to the raw event bus
    ///
    /// Receivers that lag must reconcile from [`Self::pending_in`] rather
    /// than trusting stale local state.
    pub fn subscribe(&self) -> broadcast::Receiver<RequestEvent> {
        self.events.subscribe()
    }

    /// Snapshot of all `Pending` requests in one category
    pub async fn pending_in(&self, category: ServiceCategory) -> Vec<ServiceRequest> {
        let requests = self.requests.read().await;
        requests
            .values()
            .filter(|r| r.status == RequestStatus::Pending && r.category == category)
            .cloned()
            .collect()
    }

    /// Snapshot of all `Pending` requests
    pub async fn pending(&self) -> Vec<ServiceRequest> {
        let requests = self.requests.read().await;
        requests
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
            .cloned()
            .collect()
    }

    /// Live subscription to one request's updates
    ///
    /// The client collaborator uses this to observe the eventual
    /// `Accepted`/`Expired`/`Cancelled` status without polling.
    pub async fn watch(&self, id: &RequestId) -> Result<RequestWatch> {
        // Subscribe before snapshotting so no transition can slip between.
        let rx = self.events.subscribe();
        let current = self.get(id).await?;
        Ok(RequestWatch {
            store: self.clone(),
            id: id.clone(),
            rx,
            initial: Some(current),
            finished: false,
        })
    }
}

impl Default for RequestStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

/// Live view of a single request's lifecycle
///
/// Yields the current snapshot first, then every subsequent update, and
/// ends after a terminal status has been delivered.
pub struct RequestWatch {
    store: RequestStore,
    id: RequestId,
    rx: broadcast::Receiver<RequestEvent>,
    initial: Option<ServiceRequest>,
    finished: bool,
}

impl RequestWatch {
    /// Next update for the watched request, or `None` once terminal
    pub async fn next(&mut self) -> Option<ServiceRequest> {
        if self.finished {
            return None;
        }

        if let Some(initial) = self.initial.take() {
            if initial.status.is_terminal() {
                self.finished = true;
            }
            return Some(initial);
        }

        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    let request = event.request();
                    if request.id != self.id {
                        continue;
                    }
                    if request.status.is_terminal() {
                        self.finished = true;
                    }
                    return Some(request.clone());
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Dropped events may include ours; reconcile from the
                    // store instead of trusting the stream.
                    warn!(request = %self.id, skipped, "watch lagged, reconciling");
                    match self.store.get(&self.id).await {
                        Ok(request) if request.status.is_terminal() => {
                            self.finished = true;
                            return Some(request);
                        }
                        Ok(_) => continue,
                        Err(_) => {
                            self.finished = true;
                            return None;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    /// Await the terminal status of the watched request
    pub async fn resolved(&mut self) -> Option<ServiceRequest> {
        let mut last = None;
        while let Some(request) = self.next().await {
            let terminal = request.status.is_terminal();
            last = Some(request);
            if terminal {
                break;
            }
        }
        last.filter(|r| r.status.is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vila_types::Price;

    fn moto_request(client: &ClientId) -> NewRequest {
        NewRequest {
            category: ServiceCategory::MotoTaxi,
            client: client.clone(),
            origin: "Centro".to_string(),
            destination: "Deslocamento Urbano".to_string(),
            price: Price::reais(8, 0),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = RequestStore::default();
        let client = ClientId::new();

        let request = store.create(moto_request(&client)).await.unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert!(request.assigned_provider.is_none());
        assert!(request.expires_at > request.created_at);

        let fetched = store.get(&request.id).await.unwrap();
        assert_eq!(fetched, request);
    }

    #[tokio::test]
    async fn test_create_validates_fields() {
        let store = RequestStore::default();
        let client = ClientId::new();

        let mut blank_origin = moto_request(&client);
        blank_origin.origin = "  ".to_string();
        assert!(store.create(blank_origin).await.is_err());

        let mut blank_destination = moto_request(&client);
        blank_destination.destination = String::new();
        assert!(store.create(blank_destination).await.is_err());
    }

    #[tokio::test]
    async fn test_get_unknown_id() {
        let store = RequestStore::default();
        let result = store.get(&RequestId::new()).await;
        assert!(matches!(result, Err(DispatchError::RequestNotFound { .. })));
    }

    #[tokio::test]
    async fn test_conditional_transition_wins_once() {
        let store = RequestStore::default();
        let client = ClientId::new();
        let request = store.create(moto_request(&client)).await.unwrap();
        let winner = ProviderId::new();

        let accepted = store
            .transition(
                &request.id,
                RequestStatus::Pending,
                RequestStatus::Accepted,
                Some(winner.clone()),
            )
            .await
            .unwrap();
        assert_eq!(accepted.status, RequestStatus::Accepted);
        assert_eq!(accepted.assigned_provider, Some(winner));

        // Second attempt observes Conflict, record untouched.
        let loser = store
            .transition(
                &request.id,
                RequestStatus::Pending,
                RequestStatus::Accepted,
                Some(ProviderId::new()),
            )
            .await;
        assert!(matches!(loser, Err(DispatchError::Conflict { .. })));

        let stored = store.get(&request.id).await.unwrap();
        assert_eq!(stored.assigned_provider, accepted.assigned_provider);
    }

    #[tokio::test]
    async fn test_transition_requires_provider_on_accept() {
        let store = RequestStore::default();
        let client = ClientId::new();
        let request = store.create(moto_request(&client)).await.unwrap();

        let result = store
            .transition(&request.id, RequestStatus::Pending, RequestStatus::Accepted, None)
            .await;
        assert!(matches!(result, Err(DispatchError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_cancel_only_by_owner() {
        let store = RequestStore::default();
        let client = ClientId::new();
        let request = store.create(moto_request(&client)).await.unwrap();

        let stranger = ClientId::new();
        assert!(store.cancel(&request.id, &stranger).await.is_err());

        let cancelled = store.cancel(&request.id, &client).await.unwrap();
        assert_eq!(cancelled.status, RequestStatus::Cancelled);

        // Cancel after resolution maps to Conflict.
        let again = store.cancel(&request.id, &client).await;
        assert!(matches!(again, Err(DispatchError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_expire_refused_before_deadline() {
        let store = RequestStore::default();
        let client = ClientId::new();
        let request = store.create(moto_request(&client)).await.unwrap();

        let result = store.expire(&request.id).await;
        assert!(matches!(result, Err(DispatchError::DeadlineNotReached { .. })));
    }

    #[tokio::test]
    async fn test_expire_first_caller_wins() {
        let store = RequestStore::new(StoreConfig {
            offer_window: Duration::from_millis(10),
            ..StoreConfig::default()
        });
        let client = ClientId::new();
        let request = store.create(moto_request(&client)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        let expired = store.expire(&request.id).await.unwrap();
        assert_eq!(expired.status, RequestStatus::Expired);

        let second = store.expire(&request.id).await;
        assert!(matches!(second, Err(DispatchError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_pending_in_filters_by_category() {
        let store = RequestStore::default();
        let client = ClientId::new();
        store.create(moto_request(&client)).await.unwrap();
        store
            .create(NewRequest {
                category: ServiceCategory::GasDelivery,
                client: client.clone(),
                origin: "Rua da Matriz, 12".to_string(),
                destination: "Entrega residencial".to_string(),
                price: Price::reais(110, 0),
            })
            .await
            .unwrap();

        let moto = store.pending_in(ServiceCategory::MotoTaxi).await;
        assert_eq!(moto.len(), 1);
        assert_eq!(store.pending().await.len(), 2);
        assert!(store.pending_in(ServiceCategory::CarRide).await.is_empty());
    }

    #[tokio::test]
    async fn test_watch_observes_terminal_status() {
        let store = RequestStore::default();
        let client = ClientId::new();
        let request = store.create(moto_request(&client)).await.unwrap();

        let mut watch = store.watch(&request.id).await.unwrap();
        let winner = ProviderId::new();

        let store2 = store.clone();
        let id = request.id.clone();
        let winner2 = winner.clone();
        let accept = tokio::spawn(async move {
            store2
                .transition(&id, RequestStatus::Pending, RequestStatus::Accepted, Some(winner2))
                .await
                .unwrap();
        });

        let resolved = watch.resolved().await.unwrap();
        assert_eq!(resolved.status, RequestStatus::Accepted);
        assert_eq!(resolved.assigned_provider, Some(winner));
        accept.await.unwrap();

        // Stream is done after the terminal update.
        assert!(watch.next().await.is_none());
    }

    #[tokio::test]
    async fn test_watch_on_already_resolved_request() {
        let store = RequestStore::default();
        let client = ClientId::new();
        let request = store.create(moto_request(&client)).await.unwrap();
        store.cancel(&request.id, &client).await.unwrap();

        let mut watch = store.watch(&request.id).await.unwrap();
        let resolved = watch.resolved().await.unwrap();
        assert_eq!(resolved.status, RequestStatus::Cancelled);
    }
}
