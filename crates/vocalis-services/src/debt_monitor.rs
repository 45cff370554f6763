//! Debt ceiling monitoring
//!
//! Whenever a charge is rejected for breaching an organisation's debt
//! limit, the monitor raises an alert and, for wallets with
//! auto-recharge enabled and a stored payment method, enqueues a top-up
//! request for the recharge worker. The monitor never fails the charge
//! path: alerting and enqueueing are best-effort side effects.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;
use vocalis_core::{models::Alert, traits::AlertSink, traits::WalletRepository};

/// A top-up the recharge worker should collect and credit
#[derive(Debug, Clone)]
pub struct RechargeRequest {
    /// Unique id for this attempt, doubles as the idempotency key
    pub request_id: Uuid,
    pub org_id: Uuid,
    pub payment_method_ref: String,
    pub amount_pence: i64,
}

/// Watches for debt limit breaches and triggers recovery
pub struct DebtMonitor<W, A> {
    wallets: Arc<W>,
    alerts: Arc<A>,
    recharge_tx: mpsc::Sender<RechargeRequest>,
    topup_pence: i64,
}

impl<W, A> DebtMonitor<W, A>
where
    W: WalletRepository,
    A: AlertSink,
{
    pub fn new(
        wallets: Arc<W>,
        alerts: Arc<A>,
        recharge_tx: mpsc::Sender<RechargeRequest>,
        topup_pence: i64,
    ) -> Self {
        Self {
            wallets,
            alerts,
            recharge_tx,
            topup_pence,
        }
    }

    /// Handle a rejected charge that would have breached the debt limit
    ///
    /// Raises an alert unconditionally, then enqueues a top-up if the
    /// wallet opted in to auto-recharge.
    #[instrument(skip(self))]
    pub async fn handle_breach(
        &self,
        org_id: Uuid,
        attempted_deduction_pence: i64,
        balance_pence: i64,
        debt_limit_pence: i64,
    ) {
        let headroom = balance_pence - debt_limit_pence;
        let amount_over_limit = attempted_deduction_pence - headroom;

        warn!(
            "Debt limit breached for org {}: balance={}p, limit={}p, attempted={}p",
            org_id, balance_pence, debt_limit_pence, attempted_deduction_pence
        );

        self.alerts
            .notify(
                Alert::warning("Debt limit exceeded")
                    .detail("org_id", org_id)
                    .detail("current_balance_pence", balance_pence)
                    .detail("debt_limit_pence", debt_limit_pence)
                    .detail("attempted_deduction_pence", attempted_deduction_pence)
                    .detail("amount_over_limit_pence", amount_over_limit),
            )
            .await;

        let wallet = match self.wallets.find_by_org(org_id).await {
            Ok(Some(wallet)) => wallet,
            Ok(None) => {
                warn!("Wallet for org {} vanished during breach handling", org_id);
                return;
            }
            Err(e) => {
                error!("Failed to load wallet for org {}: {}", org_id, e);
                return;
            }
        };

        if !wallet.can_auto_recharge() {
            debug!("Auto-recharge not enabled for org {}, alert only", org_id);
            return;
        }

        let payment_method_ref = match wallet.payment_method_ref {
            Some(reference) => reference,
            None => return,
        };

        let request = RechargeRequest {
            request_id: Uuid::new_v4(),
            org_id,
            payment_method_ref,
            amount_pence: self.topup_pence,
        };

        // The queue is bounded; a full queue drops the request rather
        // than blocking the charge path. The next breach retries.
        if let Err(e) = self.recharge_tx.try_send(request) {
            warn!("Could not enqueue auto-recharge for org {}: {}", org_id, e);
        } else {
            debug!("Enqueued {}p auto-recharge for org {}", self.topup_pence, org_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use vocalis_core::{
        models::{ApplyOutcome, BalanceFloor, NewLedgerEntry, Wallet},
        AppResult,
    };

    struct StubWalletRepo {
        wallet: Option<Wallet>,
    }

    #[async_trait]
    impl WalletRepository for StubWalletRepo {
        async fn find_by_org(&self, _org_id: Uuid) -> AppResult<Option<Wallet>> {
            Ok(self.wallet.clone())
        }

        async fn create(&self, wallet: &Wallet) -> AppResult<Wallet> {
            Ok(wallet.clone())
        }

        async fn apply_entry(
            &self,
            _entry: &NewLedgerEntry,
            _floor: BalanceFloor,
        ) -> AppResult<ApplyOutcome> {
            unimplemented!("not exercised by these tests")
        }
    }

    struct RecordingAlerts {
        seen: Mutex<Vec<Alert>>,
    }

    #[async_trait]
    impl AlertSink for RecordingAlerts {
        async fn notify(&self, alert: Alert) {
            self.seen.lock().unwrap().push(alert);
        }
    }

    fn recharge_wallet(org_id: Uuid, enabled: bool) -> Wallet {
        let mut wallet = Wallet::new(org_id, -450, -500);
        wallet.auto_recharge_enabled = enabled;
        wallet.payment_method_ref = Some("pm_123".to_string());
        wallet
    }

    #[tokio::test]
    async fn test_breach_alerts_and_enqueues_topup() {
        let org_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(8);
        let alerts = Arc::new(RecordingAlerts {
            seen: Mutex::new(Vec::new()),
        });
        let monitor = DebtMonitor::new(
            Arc::new(StubWalletRepo {
                wallet: Some(recharge_wallet(org_id, true)),
            }),
            alerts.clone(),
            tx,
            2000,
        );

        monitor.handle_breach(org_id, 100, -450, -500).await;

        let seen = alerts.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].title, "Debt limit exceeded");
        assert_eq!(
            seen[0].details.get("amount_over_limit_pence").map(String::as_str),
            Some("50")
        );
        drop(seen);

        let request = rx.try_recv().expect("top-up should be enqueued");
        assert_eq!(request.org_id, org_id);
        assert_eq!(request.amount_pence, 2000);
        assert_eq!(request.payment_method_ref, "pm_123");
    }

    #[tokio::test]
    async fn test_breach_without_auto_recharge_alerts_only() {
        let org_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(8);
        let alerts = Arc::new(RecordingAlerts {
            seen: Mutex::new(Vec::new()),
        });
        let monitor = DebtMonitor::new(
            Arc::new(StubWalletRepo {
                wallet: Some(recharge_wallet(org_id, false)),
            }),
            alerts.clone(),
            tx,
            2000,
        );

        monitor.handle_breach(org_id, 100, -450, -500).await;

        assert_eq!(alerts.seen.lock().unwrap().len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_queue_does_not_block_or_panic() {
        let org_id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(1);
        tx.try_send(RechargeRequest {
            request_id: Uuid::new_v4(),
            org_id,
            payment_method_ref: "pm_0".to_string(),
            amount_pence: 1,
        })
        .unwrap();

        let alerts = Arc::new(RecordingAlerts {
            seen: Mutex::new(Vec::new()),
        });
        let monitor = DebtMonitor::new(
            Arc::new(StubWalletRepo {
                wallet: Some(recharge_wallet(org_id, true)),
            }),
            alerts.clone(),
            tx,
            2000,
        );

        monitor.handle_breach(org_id, 100, -450, -500).await;

        // Alert still fires even though the queue was full.
        assert_eq!(alerts.seen.lock().unwrap().len(), 1);
    }
}
