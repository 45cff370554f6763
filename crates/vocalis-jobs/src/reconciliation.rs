//! Reconciliation worker
//!
//! Webhook delivery is the primary billing path but it is lossy: a
//! dropped webhook means a call that was never charged. This worker
//! periodically lists the provider's calls for a trailing window, diffs
//! them against the internal call records, and bills every call the
//! webhooks missed. Every run is recorded, and a run whose reliability
//! falls below the configured threshold raises one critical alert.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};
use vocalis_core::{
    config::{JobsConfig, ProviderConfig},
    models::{Alert, NewCallRecord, ProviderCall, ReconciliationRun},
    traits::{
        AlertSink, CallProviderClient, CallRepository, Clock, PurchaseRepository,
        ReconciliationRepository, WalletRepository,
    },
    AppError, AppResult,
};
use vocalis_services::{
    calculators::usd_cents_to_pence,
    call_charge_key,
    deduction::{ChargeOutcome, DirectDeductionService},
    BillingParams,
};

// Hard stop for a provider that keeps answering `has_more`.
const MAX_PAGES: u32 = 1_000;

/// Scheduling and thresholds for the reconciliation worker
#[derive(Debug, Clone)]
pub struct ReconciliationSettings {
    /// How often a run starts
    pub interval: Duration,

    /// Trailing window each run covers
    pub window: chrono::Duration,

    /// Provider listing page size
    pub page_size: u32,

    /// Pause between listing pages
    pub page_delay: Duration,

    /// Reliability below this fraction raises a critical alert
    pub reliability_threshold: f64,
}

impl ReconciliationSettings {
    pub fn from_config(jobs: &JobsConfig, provider: &ProviderConfig) -> Self {
        Self {
            interval: Duration::from_secs(jobs.reconciliation_interval_secs),
            window: chrono::Duration::hours(jobs.reconciliation_window_hours),
            page_size: provider.page_size,
            page_delay: Duration::from_millis(provider.page_delay_ms),
            reliability_threshold: jobs.reliability_alert_threshold,
        }
    }
}

/// Diffs upstream calls against internal records and recovers charges
pub struct ReconciliationWorker<V, C, R, W, P, A> {
    provider: Arc<V>,
    calls: Arc<C>,
    runs: Arc<R>,
    deduction: Arc<DirectDeductionService<W, P, A>>,
    alerts: Arc<A>,
    clock: Arc<dyn Clock>,
    params: BillingParams,
    settings: ReconciliationSettings,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<V, C, R, W, P, A> ReconciliationWorker<V, C, R, W, P, A>
where
    V: CallProviderClient + 'static,
    C: CallRepository + 'static,
    R: ReconciliationRepository + 'static,
    W: WalletRepository + 'static,
    P: PurchaseRepository + 'static,
    A: AlertSink + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<V>,
        calls: Arc<C>,
        runs: Arc<R>,
        deduction: Arc<DirectDeductionService<W, P, A>>,
        alerts: Arc<A>,
        clock: Arc<dyn Clock>,
        params: BillingParams,
        settings: ReconciliationSettings,
    ) -> Self {
        Self {
            provider,
            calls,
            runs,
            deduction,
            alerts,
            clock,
            params,
            settings,
            handle: Mutex::new(None),
        }
    }

    /// Run one full reconciliation pass over the trailing window
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> AppResult<ReconciliationRun> {
        let window_end = self.clock.now();
        let window_start = window_end - self.settings.window;

        info!(
            "Reconciling provider calls between {} and {}",
            window_start, window_end
        );

        let upstream = self.fetch_upstream(window_start, window_end).await?;
        let known = self
            .calls
            .external_refs_between(window_start, window_end)
            .await?;

        let total_checked = upstream.len() as i64;
        let mut missing_found = 0i64;
        let mut recovered = 0i64;
        let mut recovered_pence = 0i64;

        for call in &upstream {
            if known.contains(&call.external_ref) {
                continue;
            }
            missing_found += 1;
            warn!(
                "Call {} exists upstream but was never billed",
                call.external_ref
            );

            // One bad call must not abort the rest of the run.
            match self.recover(call).await {
                Ok(Some(pence)) => {
                    recovered += 1;
                    recovered_pence += pence;
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Failed to recover call {}: {}", call.external_ref, e);
                }
            }
        }

        let run = ReconciliationRun::new(
            window_start,
            window_end,
            total_checked,
            missing_found,
            recovered,
            recovered_pence,
        );
        let run = self.runs.insert_run(&run).await?;

        info!(
            "Reconciliation done: checked={}, missing={}, recovered={} ({}p), reliability={:.4}",
            run.total_checked, run.missing_found, run.recovered, run.recovered_pence,
            run.reliability_pct
        );

        if run.total_checked > 0 && run.reliability_pct < self.settings.reliability_threshold {
            self.alerts
                .notify(
                    Alert::critical("Call recording reliability degraded")
                        .detail("reliability_pct", format!("{:.4}", run.reliability_pct))
                        .detail("threshold", self.settings.reliability_threshold)
                        .detail("total_checked", run.total_checked)
                        .detail("missing_found", run.missing_found)
                        .detail("window_start", run.window_start.to_rfc3339())
                        .detail("window_end", run.window_end.to_rfc3339()),
                )
                .await;
        } else if run.recovered > 0 {
            self.alerts
                .notify(
                    Alert::info("Reconciliation recovered missed calls")
                        .detail("recovered", run.recovered)
                        .detail("recovered_pence", run.recovered_pence)
                        .detail("reliability_pct", format!("{:.4}", run.reliability_pct)),
                )
                .await;
        }

        Ok(run)
    }

    /// All upstream calls for the window, across every listing page
    async fn fetch_upstream(
        &self,
        window_start: chrono::DateTime<chrono::Utc>,
        window_end: chrono::DateTime<chrono::Utc>,
    ) -> AppResult<Vec<ProviderCall>> {
        let mut all = Vec::new();
        let mut page = 1u32;

        loop {
            let listing = self
                .provider
                .list_calls(window_start, window_end, page, self.settings.page_size)
                .await?;
            all.extend(listing.calls);

            if !listing.has_more {
                break;
            }
            page += 1;
            if page > MAX_PAGES {
                return Err(AppError::Provider(format!(
                    "Call listing exceeded {} pages",
                    MAX_PAGES
                )));
            }
            tokio::time::sleep(self.settings.page_delay).await;
        }

        Ok(all)
    }

    /// Bill one missing call; `Some(pence)` when a record was recovered
    async fn recover(&self, call: &ProviderCall) -> AppResult<Option<i64>> {
        // Recovery always charges what the provider reported. A reported
        // cost of zero is a free call, not a missing figure: record it so
        // it stops showing up missing and deduct nothing.
        let cost_pence = usd_cents_to_pence(call.cost_usd_cents, self.params.usd_to_gbp);

        if cost_pence == 0 {
            self.record_recovered(call, 0).await?;
            return Ok(Some(0));
        }

        let outcome = self
            .deduction
            .deduct_call_charge(
                call.org_id,
                cost_pence,
                &format!("Recovered call charge for {}", call.external_ref),
                &call_charge_key(&call.external_ref),
            )
            .await?;

        match outcome {
            ChargeOutcome::Success { .. } => {
                self.record_recovered(call, cost_pence).await?;
                info!(
                    "Recovered {}p for call {}",
                    cost_pence, call.external_ref
                );
                Ok(Some(cost_pence))
            }
            ChargeOutcome::Duplicate => {
                // The ledger already has the charge; only the call row
                // was missing.
                self.record_recovered(call, cost_pence).await?;
                Ok(Some(0))
            }
            ChargeOutcome::DebtLimitExceeded { .. } => {
                // Monitor already alerted; the next run retries once the
                // wallet has headroom.
                warn!(
                    "Cannot recover call {} yet: debt limit",
                    call.external_ref
                );
                Ok(None)
            }
            ChargeOutcome::OrganizationNotFound => {
                warn!(
                    "Call {} belongs to unknown org {}",
                    call.external_ref, call.org_id
                );
                Ok(None)
            }
        }
    }

    async fn record_recovered(&self, call: &ProviderCall, cost_pence: i64) -> AppResult<()> {
        let record = NewCallRecord::new(
            call.org_id,
            call.external_ref.clone(),
            call.duration_seconds,
            cost_pence,
            true,
        );
        self.calls.record(&record).await?;
        Ok(())
    }

    /// Start reconciling on the configured interval
    pub fn start(self: Arc<Self>) {
        let worker = Arc::clone(&self);
        info!(
            "Starting reconciliation worker (every {:?}, window {})",
            self.settings.interval, self.settings.window
        );

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(worker.settings.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick fires immediately; skip it so a restart loop
            // doesn't hammer the provider.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = worker.run_once().await {
                    error!("Reconciliation run failed: {}", e);
                    worker
                        .alerts
                        .notify(
                            Alert::critical("Reconciliation run failed")
                                .detail("error", &e)
                                .detail("error_code", e.error_code()),
                        )
                        .await;
                }
            }
        });

        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Stop the reconciliation loop
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
            info!("Reconciliation worker stopped");
        }
    }
}
