//! Direct deduction service
//!
//! One-shot idempotent debits and credits against a wallet. Asset
//! purchases run under the zero-debt floor; call charges (the
//! direct-billing fallback and reconciliation recovery) run under the
//! debt-limit floor and hand breaches to the debt monitor.

use crate::debt_monitor::DebtMonitor;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use vocalis_core::{
    models::{
        Alert, ApplyOutcome, AssetPurchase, BalanceFloor, NewLedgerEntry, PurchaseStatus,
        TransactionKind,
    },
    traits::{AlertSink, PurchaseRepository, WalletRepository},
    AppResult,
};

/// An asset purchase to be charged
#[derive(Debug, Clone)]
pub struct DeductionRequest {
    pub org_id: Uuid,
    pub cost_pence: i64,
    pub asset_type: String,
    pub description: String,
    /// Caller-supplied key; a replay returns the original outcome
    pub idempotency_key: String,
}

/// Outcome of an asset purchase attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeductionOutcome {
    Success {
        transaction_id: Uuid,
        balance_before: i64,
        balance_after: i64,
    },
    /// The idempotency key was already spent; the wallet is untouched
    Duplicate,
    /// Zero-debt floor rejected the purchase
    InsufficientBalance {
        balance_pence: i64,
        required_pence: i64,
        shortfall_pence: i64,
    },
    OrganizationNotFound,
}

/// Outcome of a direct call charge (debt-limit floor)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Success {
        transaction_id: Uuid,
        balance_before: i64,
        balance_after: i64,
    },
    Duplicate,
    DebtLimitExceeded {
        current_balance_pence: i64,
        debt_limit_pence: i64,
        attempted_deduction_pence: i64,
        amount_over_limit_pence: i64,
    },
    OrganizationNotFound,
}

/// Outcome of crediting a wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    Success {
        transaction_id: Uuid,
        balance_after: i64,
    },
    Duplicate,
    OrganizationNotFound,
}

/// Idempotent debits and credits with floor enforcement
pub struct DirectDeductionService<W, P, A> {
    wallets: Arc<W>,
    purchases: Arc<P>,
    alerts: Arc<A>,
    monitor: Arc<DebtMonitor<W, A>>,
}

impl<W, P, A> DirectDeductionService<W, P, A>
where
    W: WalletRepository,
    P: PurchaseRepository,
    A: AlertSink,
{
    pub fn new(
        wallets: Arc<W>,
        purchases: Arc<P>,
        alerts: Arc<A>,
        monitor: Arc<DebtMonitor<W, A>>,
    ) -> Self {
        Self {
            wallets,
            purchases,
            alerts,
            monitor,
        }
    }

    /// Charge a discrete asset purchase under the zero-debt floor
    ///
    /// Every attempt, accepted or rejected, leaves an audit row. A
    /// rejected purchase raises a warning alert with the shortfall.
    #[instrument(skip(self, request), fields(org_id = %request.org_id, key = %request.idempotency_key))]
    pub async fn deduct_asset(&self, request: &DeductionRequest) -> AppResult<DeductionOutcome> {
        let entry = NewLedgerEntry::debit(
            request.org_id,
            request.cost_pence,
            TransactionKind::AssetCharge,
            request.description.clone(),
            request.idempotency_key.clone(),
        );

        match self.wallets.apply_entry(&entry, BalanceFloor::Zero).await? {
            ApplyOutcome::Applied {
                transaction_id,
                balance_before,
                balance_after,
            } => {
                self.audit_purchase(request, PurchaseStatus::Completed).await;
                info!(
                    "Asset purchase {} charged {}p, balance {}p -> {}p",
                    request.idempotency_key, request.cost_pence, balance_before, balance_after
                );
                Ok(DeductionOutcome::Success {
                    transaction_id,
                    balance_before,
                    balance_after,
                })
            }
            ApplyOutcome::Duplicate => {
                info!("Asset purchase {} replayed", request.idempotency_key);
                Ok(DeductionOutcome::Duplicate)
            }
            ApplyOutcome::FloorBreached { balance_pence, .. } => {
                self.audit_purchase(request, PurchaseStatus::Rejected).await;
                let shortfall = request.cost_pence - balance_pence;
                warn!(
                    "Asset purchase {} rejected: balance {}p, required {}p",
                    request.idempotency_key, balance_pence, request.cost_pence
                );
                self.alerts
                    .notify(
                        Alert::warning("Asset purchase rejected: insufficient balance")
                            .detail("org_id", request.org_id)
                            .detail("asset_type", &request.asset_type)
                            .detail("balance_pence", balance_pence)
                            .detail("required_pence", request.cost_pence)
                            .detail("shortfall_pence", shortfall),
                    )
                    .await;
                Ok(DeductionOutcome::InsufficientBalance {
                    balance_pence,
                    required_pence: request.cost_pence,
                    shortfall_pence: shortfall,
                })
            }
            ApplyOutcome::WalletMissing => {
                warn!("No wallet for org {}", request.org_id);
                Ok(DeductionOutcome::OrganizationNotFound)
            }
        }
    }

    /// Charge a call cost under the debt-limit floor
    ///
    /// Used by the direct-billing fallback and by reconciliation
    /// recovery. A breach is reported to the debt monitor, which alerts
    /// and may enqueue an auto-recharge.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn deduct_call_charge(
        &self,
        org_id: Uuid,
        cost_pence: i64,
        description: &str,
        idempotency_key: &str,
    ) -> AppResult<ChargeOutcome> {
        let entry = NewLedgerEntry::debit(
            org_id,
            cost_pence,
            TransactionKind::CallCharge,
            description,
            idempotency_key,
        );

        match self
            .wallets
            .apply_entry(&entry, BalanceFloor::DebtLimit)
            .await?
        {
            ApplyOutcome::Applied {
                transaction_id,
                balance_before,
                balance_after,
            } => {
                info!(
                    "Call charge {} took {}p, balance {}p -> {}p",
                    idempotency_key, cost_pence, balance_before, balance_after
                );
                Ok(ChargeOutcome::Success {
                    transaction_id,
                    balance_before,
                    balance_after,
                })
            }
            ApplyOutcome::Duplicate => {
                info!("Call charge {} replayed", idempotency_key);
                Ok(ChargeOutcome::Duplicate)
            }
            ApplyOutcome::FloorBreached {
                balance_pence,
                debt_limit_pence,
            } => {
                self.monitor
                    .handle_breach(org_id, cost_pence, balance_pence, debt_limit_pence)
                    .await;
                Ok(ChargeOutcome::DebtLimitExceeded {
                    current_balance_pence: balance_pence,
                    debt_limit_pence,
                    attempted_deduction_pence: cost_pence,
                    amount_over_limit_pence: cost_pence - (balance_pence - debt_limit_pence),
                })
            }
            ApplyOutcome::WalletMissing => {
                warn!("No wallet for org {}", org_id);
                Ok(ChargeOutcome::OrganizationNotFound)
            }
        }
    }

    /// Credit a wallet (top-up, refund, or bonus); no floor applies
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn credit(
        &self,
        org_id: Uuid,
        amount_pence: i64,
        kind: TransactionKind,
        description: &str,
        idempotency_key: &str,
    ) -> AppResult<CreditOutcome> {
        let entry =
            NewLedgerEntry::credit(org_id, amount_pence, kind, description, idempotency_key);

        match self
            .wallets
            .apply_entry(&entry, BalanceFloor::Unbounded)
            .await?
        {
            ApplyOutcome::Applied {
                transaction_id,
                balance_after,
                ..
            } => {
                info!(
                    "Credited {}p to org {} ({}), balance now {}p",
                    amount_pence, org_id, kind, balance_after
                );
                Ok(CreditOutcome::Success {
                    transaction_id,
                    balance_after,
                })
            }
            ApplyOutcome::Duplicate => Ok(CreditOutcome::Duplicate),
            ApplyOutcome::FloorBreached { .. } => {
                // Unreachable: credits carry no floor.
                Ok(CreditOutcome::Duplicate)
            }
            ApplyOutcome::WalletMissing => Ok(CreditOutcome::OrganizationNotFound),
        }
    }

    async fn audit_purchase(&self, request: &DeductionRequest, status: PurchaseStatus) {
        let purchase = AssetPurchase::new(
            request.idempotency_key.clone(),
            request.org_id,
            request.asset_type.clone(),
            request.cost_pence,
            status,
        );
        // Audit trail is advisory; a failed write must not undo the charge.
        if let Err(e) = self.purchases.record(&purchase).await {
            warn!(
                "Failed to audit purchase {}: {}",
                request.idempotency_key, e
            );
        }
    }
}
