//! Expiration scheduler
//!
//! Arms one timer per pending request and fires the store's `expire`
//! at the record's own deadline. Expiry is first-caller-wins and
//! deadline-gated at the store, so a timer firing against an already
//! resolved request is harmless.

use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use vila_store::RequestStore;
use vila_types::RequestEvent;

/// Drives pending requests to `Expired` at their deadline
pub struct ExpirationScheduler {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ExpirationScheduler {
    /// Spawn the scheduler over `store`
    ///
    /// Arms timers for requests already pending, then one per `Created`
    /// event. Lag on the bus re-arms from the pending snapshot.
    pub fn spawn(store: RequestStore) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let events = store.subscribe();
        let handle = tokio::spawn(run(store, events, stop_rx));
        Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Stop the scheduler; timers already armed keep running to completion
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn run(
    store: RequestStore,
    mut events: broadcast::Receiver<RequestEvent>,
    mut stop: oneshot::Receiver<()>,
) {
    arm_pending(&store).await;

    loop {
        tokio::select! {
            _ = &mut stop => break,
            event = events.recv() => match event {
                Ok(RequestEvent::Created { request }) => arm(&store, request).await,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "expiration scheduler lagged, re-arming");
                    arm_pending(&store).await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

async fn arm_pending(store: &RequestStore) {
    for request in store.pending().await {
        arm(store, request).await;
    }
}

/// Arm one timer for `request`; double-arming is safe because the
/// second `expire` call loses as a `Conflict`.
async fn arm(store: &RequestStore, request: vila_types::ServiceRequest) {
    let store = store.clone();
    tokio::spawn(async move {
        let wait = (request.expires_at - chrono::Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        tokio::time::sleep(wait).await;
        match store.expire(&request.id).await {
            Ok(expired) => {
                debug!(request = %expired.id, "request expired at deadline");
            }
            // Already resolved, or another caller expired it first.
            Err(e) if e.is_recoverable() => {}
            Err(e) => {
                warn!(request = %request.id, error = %e, "expiry failed");
            }
        }
    });
}
