//! Scripted VILA scenario: two moto-taxi riders race for the same urban
//! ride, then a gas delivery request with nobody to serve it runs out.
//!
//! Deterministic apart from task scheduling; set `VILA_DEMO_SEED` to
//! vary the accept jitter.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vila_dispatch::{DispatchConfig, DispatchService};
use vila_types::{
    BalanceKind, ClientId, NewRequest, Price, ProviderRole, Result, ServiceCategory,
};

/// Short window so the expiry leg of the script finishes quickly
const DEMO_OFFER_WINDOW: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let seed = std::env::var("VILA_DEMO_SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(7);
    let mut rng = StdRng::seed_from_u64(seed);

    let engine = Arc::new(DispatchService::new(DispatchConfig {
        offer_window: DEMO_OFFER_WINDOW,
        ..DispatchConfig::default()
    }));

    // Two riders, funded and online.
    let ricardo = engine
        .register_provider("Ricardo Moto-Táxi", ProviderRole::Mototaxista)
        .await;
    let paulo = engine
        .register_provider("Paulo Moto-Táxi", ProviderRole::Mototaxista)
        .await;
    for rider in [&ricardo, &paulo] {
        engine.top_up(&rider.id, 10, BalanceKind::Credit).await?;
        engine.set_online(&rider.id, true).await?;
    }

    let mut sessions = Vec::new();
    for rider in [&ricardo, &paulo] {
        sessions.push((rider.clone(), engine.open_session(&rider.id).await?));
    }

    // Leg 1: the urban ride race.
    let client = ClientId::new();
    let request = engine
        .submit_request(NewRequest {
            category: ServiceCategory::MotoTaxi,
            client: client.clone(),
            origin: "Centro".to_string(),
            destination: "Deslocamento Urbano".to_string(),
            price: Price::parse_brl("8,00")?,
        })
        .await?;
    tracing::info!(request = %request.id, price = %request.price, "client asked for a ride");
    let mut watch = engine.watch(&request.id).await?;

    let mut racers = Vec::new();
    for (rider, _) in &sessions {
        let engine = engine.clone();
        let rider = rider.clone();
        let request_id = request.id.clone();
        let jitter = Duration::from_millis(rng.gen_range(0..25));
        racers.push(tokio::spawn(async move {
            tokio::time::sleep(jitter).await;
            let outcome = engine.accept(&request_id, &rider.id).await?;
            tracing::info!(
                rider = %rider.name,
                granted = outcome.is_granted(),
                "accept attempt finished"
            );
            Ok::<_, vila_types::DispatchError>(())
        }));
    }
    for racer in racers {
        if let Err(e) = racer.await.unwrap_or(Ok(())) {
            tracing::warn!(error = %e, "racer failed");
        }
    }

    if let Some(resolved) = watch.resolved().await {
        tracing::info!(
            status = %resolved.status,
            winner = ?resolved.assigned_provider,
            "ride resolved"
        );
    }
    for (rider, _) in &sessions {
        let balance = engine.balance(&rider.id).await;
        tracing::info!(rider = %rider.name, credits = balance.credits, "balance after race");
    }

    // Leg 2: a gas delivery nobody serves; it expires at its deadline.
    let gas = engine
        .submit_request(NewRequest {
            category: ServiceCategory::GasDelivery,
            client: client.clone(),
            origin: "Depósito São José".to_string(),
            destination: "Rua da Matriz, 12".to_string(),
            price: Price::parse_brl("110,00")?,
        })
        .await?;
    tracing::info!(request = %gas.id, "gas delivery submitted with no distributor online");

    let mut gas_watch = engine.watch(&gas.id).await?;
    if let Some(resolved) = gas_watch.resolved().await {
        tracing::info!(status = %resolved.status, "gas delivery resolved");
    }

    for (rider, session) in sessions {
        session.close().await;
        let entries = engine.ledger_entries(&rider.id).await;
        tracing::info!(rider = %rider.name, entries = entries.len(), "ledger history");
    }

    match Arc::try_unwrap(engine) {
        Ok(engine) => engine.shutdown().await,
        Err(_) => tracing::warn!("engine still shared at shutdown"),
    }
    Ok(())
}
