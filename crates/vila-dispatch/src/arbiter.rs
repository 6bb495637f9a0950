//! Acceptance arbiter
//!
//! The single correctness-critical operation of the engine. An accept
//! attempt takes a balance hold first, then tries the conditional
//! `Pending -> Accepted` transition; on a lost race the hold is
//! refunded to the same balance kind it was taken from. The ordering
//! matters: charging after the transition would let a provider with one
//! credit left win two races at once.
//!
//! A plain read-then-write here is the bug class this engine exists to
//! eliminate; every path below goes through the store's CAS.

use tracing::{info, warn};
use vila_ledger::CreditLedger;
use vila_store::RequestStore;
use vila_types::{
    AcceptOutcome, DispatchError, ProviderId, RequestId, RequestStatus, Result,
};

use crate::directory::ProviderDirectory;

/// Resolves the race when providers attempt to accept the same request
#[derive(Clone)]
pub struct AcceptanceArbiter {
    store: RequestStore,
    ledger: CreditLedger,
    directory: ProviderDirectory,
}

impl AcceptanceArbiter {
    pub fn new(store: RequestStore, ledger: CreditLedger, directory: ProviderDirectory) -> Self {
        Self {
            store,
            ledger,
            directory,
        }
    }

    /// Attempt to assign `request_id` to `provider_id`
    ///
    /// Exactly one concurrent accept per request returns `Granted`; all
    /// others observe `Conflict`. A losing attempt is never charged.
    /// Retries are safe: a second accept on an already-accepted request
    /// is a `Conflict`, never a duplicate success or a double charge.
    pub async fn accept(
        &self,
        request_id: &RequestId,
        provider_id: &ProviderId,
    ) -> Result<AcceptOutcome> {
        let request = self.store.get(request_id).await?;
        let provider = self.directory.get(provider_id).await?;

        // Defense in depth: sessions already scope subscriptions, but an
        // accept can arrive from a stale or misbehaving caller.
        if !provider.online {
            return Err(DispatchError::ProviderOffline {
                provider_id: provider_id.to_string(),
            });
        }
        if !provider.role.serves(request.category) {
            return Err(DispatchError::CategoryMismatch {
                provider_id: provider_id.to_string(),
                category: request.category.to_string(),
            });
        }

        // Take the hold before the CAS.
        let (kind, balance) = match self.ledger.charge(provider_id, request_id).await {
            Ok(charged) => charged,
            Err(DispatchError::InsufficientBalance { .. }) => {
                return Ok(AcceptOutcome::InsufficientBalance);
            }
            Err(e) => return Err(e),
        };

        match self
            .store
            .transition(
                request_id,
                RequestStatus::Pending,
                RequestStatus::Accepted,
                Some(provider_id.clone()),
            )
            .await
        {
            Ok(accepted) => {
                if !balance.is_spendable() {
                    // Last unit spent; the online invariant must hold.
                    self.directory.force_offline(provider_id).await?;
                }
                info!(request = %request_id, provider = %provider_id, "accept granted");
                Ok(AcceptOutcome::Granted { request: accepted })
            }
            Err(DispatchError::Conflict { .. }) => {
                self.ledger.refund(provider_id, kind, request_id).await;
                info!(request = %request_id, provider = %provider_id, "accept lost the race");
                Ok(AcceptOutcome::Conflict)
            }
            Err(e) => {
                // Request vanished or input was malformed; restore the
                // hold before surfacing the error.
                warn!(request = %request_id, provider = %provider_id, error = %e, "accept failed");
                self.ledger.refund(provider_id, kind, request_id).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vila_store::StoreConfig;
    use vila_types::{BalanceKind, ClientId, NewRequest, Price, ProviderRole, ServiceCategory};

    struct Fixture {
        store: RequestStore,
        ledger: CreditLedger,
        directory: ProviderDirectory,
        arbiter: AcceptanceArbiter,
    }

    fn fixture() -> Fixture {
        let store = RequestStore::new(StoreConfig::default());
        let ledger = CreditLedger::new();
        let directory = ProviderDirectory::new(ledger.clone());
        let arbiter = AcceptanceArbiter::new(store.clone(), ledger.clone(), directory.clone());
        Fixture {
            store,
            ledger,
            directory,
            arbiter,
        }
    }

    async fn online_rider(fx: &Fixture, credits: u32) -> ProviderId {
        let profile = fx.directory.register("Rider", ProviderRole::Mototaxista).await;
        fx.ledger
            .top_up(&profile.id, credits, BalanceKind::Credit)
            .await
            .unwrap();
        fx.directory.set_online(&profile.id, true).await.unwrap();
        profile.id
    }

    async fn submit_moto(fx: &Fixture) -> RequestId {
        let request = fx
            .store
            .create(NewRequest {
                category: ServiceCategory::MotoTaxi,
                client: ClientId::new(),
                origin: "Centro".to_string(),
                destination: "Deslocamento Urbano".to_string(),
                price: Price::parse_brl("8,00").unwrap(),
            })
            .await
            .unwrap();
        request.id
    }

    #[tokio::test]
    async fn test_accept_grants_and_charges() {
        let fx = fixture();
        let rider = online_rider(&fx, 5).await;
        let request = submit_moto(&fx).await;

        let outcome = fx.arbiter.accept(&request, &rider).await.unwrap();
        assert!(outcome.is_granted());
        assert_eq!(fx.ledger.balance(&rider).await.credits, 4);

        let stored = fx.store.get(&request).await.unwrap();
        assert_eq!(stored.assigned_provider, Some(rider));
    }

    #[tokio::test]
    async fn test_concurrent_accepts_exactly_one_grant() {
        let fx = fixture();
        let p1 = online_rider(&fx, 5).await;
        let p2 = online_rider(&fx, 5).await;
        let request = submit_moto(&fx).await;

        let (r1, r2) = tokio::join!(
            fx.arbiter.accept(&request, &p1),
            fx.arbiter.accept(&request, &p2)
        );
        let outcomes = [r1.unwrap(), r2.unwrap()];

        let granted = outcomes.iter().filter(|o| o.is_granted()).count();
        let conflicts = outcomes
            .iter()
            .filter(|o| matches!(o, AcceptOutcome::Conflict))
            .count();
        assert_eq!(granted, 1);
        assert_eq!(conflicts, 1);

        // Only the winner paid.
        let total_spent =
            (5 - fx.ledger.balance(&p1).await.credits) + (5 - fx.ledger.balance(&p2).await.credits);
        assert_eq!(total_spent, 1);
    }

    #[tokio::test]
    async fn test_accept_after_terminal_is_conflict() {
        let fx = fixture();
        let rider = online_rider(&fx, 5).await;
        let request = submit_moto(&fx).await;

        let winner = online_rider(&fx, 5).await;
        fx.arbiter.accept(&request, &winner).await.unwrap();

        let outcome = fx.arbiter.accept(&request, &rider).await.unwrap();
        assert_eq!(outcome, AcceptOutcome::Conflict);
        assert_eq!(fx.ledger.balance(&rider).await.credits, 5);
    }

    #[tokio::test]
    async fn test_offline_provider_refused() {
        let fx = fixture();
        let profile = fx.directory.register("Rider", ProviderRole::Mototaxista).await;
        fx.ledger
            .top_up(&profile.id, 5, BalanceKind::Credit)
            .await
            .unwrap();
        let request = submit_moto(&fx).await;

        let result = fx.arbiter.accept(&request, &profile.id).await;
        assert!(matches!(result, Err(DispatchError::ProviderOffline { .. })));
    }

    #[tokio::test]
    async fn test_category_mismatch_refused() {
        let fx = fixture();
        let profile = fx.directory.register("Gas", ProviderRole::DistribuidorGas).await;
        fx.ledger
            .top_up(&profile.id, 5, BalanceKind::Credit)
            .await
            .unwrap();
        fx.directory.set_online(&profile.id, true).await.unwrap();
        let request = submit_moto(&fx).await;

        let result = fx.arbiter.accept(&request, &profile.id).await;
        assert!(matches!(result, Err(DispatchError::CategoryMismatch { .. })));
    }

    #[tokio::test]
    async fn test_last_credit_forces_offline() {
        let fx = fixture();
        let rider = online_rider(&fx, 1).await;
        let request = submit_moto(&fx).await;

        let outcome = fx.arbiter.accept(&request, &rider).await.unwrap();
        assert!(outcome.is_granted());

        let profile = fx.directory.get(&rider).await.unwrap();
        assert!(!profile.online);
        assert_eq!(fx.ledger.balance(&rider).await.total(), 0);

        // And it cannot come back online until topped up.
        let refused = fx.directory.set_online(&rider, true).await;
        assert!(matches!(refused, Err(DispatchError::InsufficientBalance { .. })));
    }

    #[tokio::test]
    async fn test_lost_race_refunds_trust_kind() {
        let fx = fixture();
        let winner = online_rider(&fx, 5).await;

        // Loser runs on trust credits only.
        let loser_profile = fx.directory.register("Trusted", ProviderRole::Mototaxista).await;
        fx.ledger
            .top_up(&loser_profile.id, 2, BalanceKind::Trust)
            .await
            .unwrap();
        fx.directory.set_online(&loser_profile.id, true).await.unwrap();

        let request = submit_moto(&fx).await;
        fx.arbiter.accept(&request, &winner).await.unwrap();
        let outcome = fx.arbiter.accept(&request, &loser_profile.id).await.unwrap();
        assert_eq!(outcome, AcceptOutcome::Conflict);

        let balance = fx.ledger.balance(&loser_profile.id).await;
        assert_eq!(balance.trust, 2);
        assert_eq!(balance.credits, 0);
    }

    #[tokio::test]
    async fn test_exhausted_provider_gets_insufficient_balance() {
        let fx = fixture();
        let rider = online_rider(&fx, 1).await;

        // Drain the last unit out from under the still-online profile, as
        // a concurrent accept on another request would.
        fx.ledger.charge(&rider, &RequestId::new()).await.unwrap();

        let request = submit_moto(&fx).await;
        let outcome = fx.arbiter.accept(&request, &rider).await.unwrap();
        assert_eq!(outcome, AcceptOutcome::InsufficientBalance);

        // The request stays open for everyone else.
        let stored = fx.store.get(&request).await.unwrap();
        assert_eq!(stored.status, RequestStatus::Pending);
    }
}
