//! Call-duration billing entrypoint
//!
//! Bills a completed call exactly once. The happy path settles the
//! call's reservation at its locked-in rate; when no usable hold exists
//! (webhook raced the sweeper, a legacy call, a recovered call from
//! reconciliation) the charge falls back to direct billing at either the
//! provider-reported cost or the current fixed rate.

use crate::calculators::{fixed_rate_charge, usd_cents_to_pence};
use crate::deduction::{ChargeOutcome, DirectDeductionService};
use crate::reservation_manager::{CommitOutcome, ReservationManager};
use crate::{call_charge_key, BillingParams};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use vocalis_core::{
    models::NewCallRecord,
    traits::{AlertSink, CallRepository, PurchaseRepository, ReservationRepository, WalletRepository},
    AppResult,
};

/// A completed call as reported by the provider webhook
#[derive(Debug, Clone)]
pub struct CallUsage {
    pub org_id: Uuid,
    pub call_id: String,
    /// Provider's identifier for the call
    pub external_ref: String,
    pub duration_seconds: i64,
    /// Provider-reported cost, preferred over the fixed rate when present
    pub provider_cost_usd_cents: Option<i64>,
}

/// Outcome of billing a completed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallBillingOutcome {
    /// Zero or negative duration; nothing was charged
    NoCharge,
    Charged {
        actual_cost_pence: i64,
        released_pence: i64,
        balance_after: i64,
        /// Billed directly rather than through a reservation
        via_fallback: bool,
    },
    /// The call was already billed
    Duplicate,
    DebtLimitExceeded {
        current_balance_pence: i64,
        debt_limit_pence: i64,
        attempted_deduction_pence: i64,
        amount_over_limit_pence: i64,
    },
    OrganizationNotFound,
}

/// Bills completed calls, preferring reservation settlement
pub struct CallBillingService<W, R, P, C, A> {
    reservation_manager: Arc<ReservationManager<W, R, A>>,
    deduction: Arc<DirectDeductionService<W, P, A>>,
    calls: Arc<C>,
    params: BillingParams,
}

impl<W, R, P, C, A> CallBillingService<W, R, P, C, A>
where
    W: WalletRepository,
    R: ReservationRepository,
    P: PurchaseRepository,
    C: CallRepository,
    A: AlertSink,
{
    pub fn new(
        reservation_manager: Arc<ReservationManager<W, R, A>>,
        deduction: Arc<DirectDeductionService<W, P, A>>,
        calls: Arc<C>,
        params: BillingParams,
    ) -> Self {
        Self {
            reservation_manager,
            deduction,
            calls,
            params,
        }
    }

    /// Bill a completed call
    ///
    /// Settles the call's reservation when one is active; otherwise
    /// charges directly at the provider-reported cost, or the current
    /// fixed rate when the provider reported none. Safe to retry: every
    /// path shares one ledger key per call.
    #[instrument(skip(self, usage), fields(call_id = %usage.call_id, org_id = %usage.org_id))]
    pub async fn deduct_call_credits(&self, usage: &CallUsage) -> AppResult<CallBillingOutcome> {
        if usage.duration_seconds <= 0 {
            // Nothing to bill and no store touch; any hold the call left
            // behind is released by the caller or swept at expiry.
            info!("Call {} had no billable duration", usage.call_id);
            return Ok(CallBillingOutcome::NoCharge);
        }

        match self
            .reservation_manager
            .commit(&usage.call_id, usage.duration_seconds)
            .await?
        {
            CommitOutcome::Committed {
                actual_cost_pence,
                released_pence,
                balance_after,
            } => {
                self.record_call(usage, actual_cost_pence).await?;
                Ok(CallBillingOutcome::Charged {
                    actual_cost_pence,
                    released_pence,
                    balance_after,
                    via_fallback: false,
                })
            }
            CommitOutcome::Duplicate => {
                self.record_call(usage, self.direct_cost_pence(usage)).await?;
                Ok(CallBillingOutcome::Duplicate)
            }
            CommitOutcome::DebtLimitExceeded {
                current_balance_pence,
                debt_limit_pence,
                attempted_deduction_pence,
                amount_over_limit_pence,
            } => {
                // No call row: reconciliation will surface it again once
                // the wallet has headroom.
                Ok(CallBillingOutcome::DebtLimitExceeded {
                    current_balance_pence,
                    debt_limit_pence,
                    attempted_deduction_pence,
                    amount_over_limit_pence,
                })
            }
            CommitOutcome::FallbackToDirectBilling => self.bill_directly(usage).await,
        }
    }

    async fn bill_directly(&self, usage: &CallUsage) -> AppResult<CallBillingOutcome> {
        let cost_pence = self.direct_cost_pence(usage);
        warn!(
            "Billing call {} directly: {}p for {}s",
            usage.call_id, cost_pence, usage.duration_seconds
        );

        let outcome = self
            .deduction
            .deduct_call_charge(
                usage.org_id,
                cost_pence,
                &format!("Call charge for {}", usage.call_id),
                &call_charge_key(&usage.external_ref),
            )
            .await?;

        match outcome {
            ChargeOutcome::Success { balance_after, .. } => {
                self.record_call(usage, cost_pence).await?;
                Ok(CallBillingOutcome::Charged {
                    actual_cost_pence: cost_pence,
                    released_pence: 0,
                    balance_after,
                    via_fallback: true,
                })
            }
            ChargeOutcome::Duplicate => {
                self.record_call(usage, cost_pence).await?;
                Ok(CallBillingOutcome::Duplicate)
            }
            ChargeOutcome::DebtLimitExceeded {
                current_balance_pence,
                debt_limit_pence,
                attempted_deduction_pence,
                amount_over_limit_pence,
            } => Ok(CallBillingOutcome::DebtLimitExceeded {
                current_balance_pence,
                debt_limit_pence,
                attempted_deduction_pence,
                amount_over_limit_pence,
            }),
            ChargeOutcome::OrganizationNotFound => Ok(CallBillingOutcome::OrganizationNotFound),
        }
    }

    /// Cost for the direct path: provider-reported when present,
    /// otherwise the fixed rate over the call duration
    fn direct_cost_pence(&self, usage: &CallUsage) -> i64 {
        match usage.provider_cost_usd_cents {
            Some(cents) => usd_cents_to_pence(cents, self.params.usd_to_gbp),
            None => {
                fixed_rate_charge(
                    usage.duration_seconds,
                    self.params.rate_cents_per_minute,
                    self.params.usd_to_gbp,
                )
                .pence
            }
        }
    }

    async fn record_call(&self, usage: &CallUsage, cost_pence: i64) -> AppResult<()> {
        let record = NewCallRecord::new(
            usage.org_id,
            usage.external_ref.clone(),
            usage.duration_seconds,
            cost_pence,
            false,
        );
        self.calls.record(&record).await?;
        Ok(())
    }
}
