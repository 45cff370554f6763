//! Auto-recharge worker
//!
//! Drains the debt monitor's top-up queue: collects each payment through
//! the gateway and credits the ledger. The payment and the ledger credit
//! share one idempotency key derived from the request id, so a crash
//! between the two steps is healed by replaying the request.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use vocalis_core::{
    models::{Alert, TransactionKind},
    traits::{AlertSink, PaymentOutcome, PaymentProcessor, PurchaseRepository, WalletRepository},
    AppResult,
};
use vocalis_services::{CreditOutcome, DirectDeductionService, RechargeRequest};

/// Collects queued top-ups and credits the ledger
pub struct AutoRechargeWorker<W, P, A, G> {
    deduction: Arc<DirectDeductionService<W, P, A>>,
    payments: Arc<G>,
    alerts: Arc<A>,
    receiver: Mutex<Option<mpsc::Receiver<RechargeRequest>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<W, P, A, G> AutoRechargeWorker<W, P, A, G>
where
    W: WalletRepository + 'static,
    P: PurchaseRepository + 'static,
    A: AlertSink + 'static,
    G: PaymentProcessor + 'static,
{
    pub fn new(
        deduction: Arc<DirectDeductionService<W, P, A>>,
        payments: Arc<G>,
        alerts: Arc<A>,
        receiver: mpsc::Receiver<RechargeRequest>,
    ) -> Self {
        Self {
            deduction,
            payments,
            alerts,
            receiver: Mutex::new(Some(receiver)),
            handle: Mutex::new(None),
        }
    }

    /// Collect one top-up and credit the wallet
    #[instrument(skip(self, request), fields(org_id = %request.org_id, request_id = %request.request_id))]
    pub async fn process(&self, request: &RechargeRequest) -> AppResult<()> {
        let idempotency_key = format!("auto-recharge:{}", request.request_id);

        let outcome = self
            .payments
            .collect(
                request.org_id,
                &request.payment_method_ref,
                request.amount_pence,
                &idempotency_key,
            )
            .await?;

        match outcome {
            PaymentOutcome::Collected { payment_ref } => {
                let credited = self
                    .deduction
                    .credit(
                        request.org_id,
                        request.amount_pence,
                        TransactionKind::Topup,
                        &format!("Auto-recharge top-up ({})", payment_ref),
                        &idempotency_key,
                    )
                    .await?;

                match credited {
                    CreditOutcome::Success { balance_after, .. } => {
                        info!(
                            "Auto-recharged {}p for org {}, balance now {}p",
                            request.amount_pence, request.org_id, balance_after
                        );
                    }
                    CreditOutcome::Duplicate => {
                        info!("Auto-recharge {} already credited", request.request_id);
                    }
                    CreditOutcome::OrganizationNotFound => {
                        // Money collected for a wallet that no longer exists
                        // needs a human.
                        error!(
                            "Collected {} but org {} has no wallet",
                            payment_ref, request.org_id
                        );
                        self.alerts
                            .notify(
                                Alert::critical("Auto-recharge collected for missing wallet")
                                    .detail("org_id", request.org_id)
                                    .detail("payment_ref", payment_ref)
                                    .detail("amount_pence", request.amount_pence),
                            )
                            .await;
                    }
                }
            }
            PaymentOutcome::Declined { reason } => {
                warn!(
                    "Auto-recharge declined for org {}: {}",
                    request.org_id, reason
                );
                self.alerts
                    .notify(
                        Alert::warning("Auto-recharge declined")
                            .detail("org_id", request.org_id)
                            .detail("amount_pence", request.amount_pence)
                            .detail("reason", reason),
                    )
                    .await;
            }
        }

        Ok(())
    }

    /// Start draining the queue
    pub fn start(self: Arc<Self>) {
        let mut receiver = match self.receiver.lock().unwrap().take() {
            Some(receiver) => receiver,
            None => {
                warn!("Auto-recharge worker already started");
                return;
            }
        };

        let worker = Arc::clone(&self);
        info!("Starting auto-recharge worker");

        let handle = tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                if let Err(e) = worker.process(&request).await {
                    error!(
                        "Auto-recharge {} failed for org {}: {}",
                        request.request_id, request.org_id, e
                    );
                }
            }
            info!("Auto-recharge queue closed");
        });

        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Stop the worker
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
            info!("Auto-recharge worker stopped");
        }
    }
}
