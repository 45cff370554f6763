//! Vocalis credit ledger service
//!
//! Wires the persistence layer, billing services, outbound clients, and
//! background jobs together, then parks on SIGINT. There is no HTTP
//! surface here; upstream request handlers call into the service layer
//! through the shared application state.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vocalis_core::{config::AppConfig, traits::SystemClock};
use vocalis_db::{
    create_pool, run_migrations, PgCallRepository, PgPurchaseRepository,
    PgReconciliationRepository, PgReservationRepository, PgWalletRepository,
};
use vocalis_jobs::{
    AutoRechargeWorker, ReconciliationSettings, ReconciliationWorker, ReservationExpirySweeper,
};
use vocalis_provider::{PaymentGatewayClient, VoiceProviderClient, WebhookAlerter};
use vocalis_services::{BillingParams, BillingServices};

// Breaches queued faster than payments clear are dropped and retried on
// the next breach, so the queue stays small.
const RECHARGE_QUEUE_DEPTH: usize = 256;

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "vocalis_billing={},vocalis_services={},vocalis_db={},vocalis_jobs={},sqlx=warn",
            log_level, log_level, log_level, log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting Vocalis credit ledger v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load()?;
    let params = BillingParams::from_config(&config.billing);

    let pool = create_pool(
        &config.database.url,
        Some(config.database.max_connections),
    )
    .await?;
    run_migrations(&pool).await?;

    // Repositories
    let wallets = Arc::new(PgWalletRepository::new(pool.clone()));
    let reservations = Arc::new(PgReservationRepository::new(pool.clone()));
    let calls = Arc::new(PgCallRepository::new(pool.clone()));
    let purchases = Arc::new(PgPurchaseRepository::new(pool.clone()));
    let runs = Arc::new(PgReconciliationRepository::new(pool.clone()));

    // Outbound clients
    let alerts = Arc::new(WebhookAlerter::new(&config.alerting)?);
    let provider = Arc::new(VoiceProviderClient::new(&config.provider)?);
    let payments = Arc::new(PaymentGatewayClient::new(&config.payments)?);

    // Services; the transport host hands these to its request handlers
    let clock = Arc::new(SystemClock);
    let (recharge_tx, recharge_rx) = mpsc::channel(RECHARGE_QUEUE_DEPTH);
    let services = BillingServices::wire(
        wallets,
        reservations.clone(),
        purchases,
        calls.clone(),
        alerts.clone(),
        recharge_tx,
        clock.clone(),
        params.clone(),
    );

    // Background jobs
    let sweeper = Arc::new(ReservationExpirySweeper::new(
        reservations.clone(),
        clock.clone(),
        Duration::from_secs(config.jobs.sweep_interval_secs),
    ));
    sweeper.clone().start();

    let reconciliation = Arc::new(ReconciliationWorker::new(
        provider,
        calls,
        runs,
        services.deduction.clone(),
        alerts.clone(),
        clock,
        params,
        ReconciliationSettings::from_config(&config.jobs, &config.provider),
    ));
    reconciliation.clone().start();

    let recharge_worker = Arc::new(AutoRechargeWorker::new(
        services.deduction.clone(),
        payments,
        alerts,
        recharge_rx,
    ));
    recharge_worker.clone().start();

    info!("All background jobs running; waiting for shutdown signal");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    recharge_worker.stop();
    reconciliation.stop();
    sweeper.stop();
    pool.close().await;

    Ok(())
}
