//! Business logic services for the Vocalis credit ledger
//!
//! This crate contains the services that orchestrate billing operations:
//! pure charge calculators, direct deduction, reservation lifecycle,
//! debt monitoring with auto-recharge triggering, and the call-duration
//! billing entrypoint.
//!
//! # Architecture
//!
//! Services are designed to be composable and testable:
//! - Each service is generic over the core repository traits
//! - Services are wrapped in Arc for safe sharing across async tasks
//! - All operations are instrumented with tracing
//! - Business rejections are structured results, never errors
//!
//! # Services
//!
//! - `calculators` - Pure billing math (fixed-rate, whole-minute, overage)
//! - `DirectDeductionService` - Idempotent one-shot debits and credits
//! - `ReservationManager` - Hold / commit / release lifecycle
//! - `DebtMonitor` - Debt ceiling alerts and auto-recharge enqueueing
//! - `CallBillingService` - Call-duration entrypoint with direct-billing fallback
//! - `BillingServices` - Composition root bundling the above over one repository set

pub mod calculators;
pub mod call_billing;
pub mod debt_monitor;
pub mod deduction;
pub mod reservation_manager;
pub mod wiring;

#[cfg(test)]
pub(crate) mod testing;

pub use call_billing::{CallBillingOutcome, CallBillingService, CallUsage};
pub use debt_monitor::{DebtMonitor, RechargeRequest};
pub use deduction::{
    ChargeOutcome, CreditOutcome, DeductionOutcome, DeductionRequest, DirectDeductionService,
};
pub use reservation_manager::{CommitOutcome, ReleaseOutcome, ReservationManager, ReserveOutcome};
pub use wiring::BillingServices;

use chrono::Duration;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use vocalis_core::config::BillingConfig;

/// Billing parameters shared by the charge paths
///
/// One per-minute USD rate and one USD->GBP conversion rate; the
/// per-minute pence rate every reservation locks in derives from both.
#[derive(Debug, Clone)]
pub struct BillingParams {
    /// Per-minute call rate in US cents
    pub rate_cents_per_minute: i64,

    /// USD to GBP conversion rate
    pub usd_to_gbp: Decimal,

    /// Minutes reserved when the caller gives no estimate
    pub default_reservation_minutes: i64,

    /// How long a hold lives before the sweeper may expire it
    pub reservation_ttl: Duration,

    /// Pence credited per auto-recharge top-up
    pub auto_recharge_topup_pence: i64,
}

impl BillingParams {
    /// Build from application configuration
    pub fn from_config(config: &BillingConfig) -> Self {
        Self {
            rate_cents_per_minute: config.rate_cents_per_minute,
            usd_to_gbp: Decimal::from_f64(config.usd_to_gbp_rate)
                .unwrap_or_else(|| Decimal::new(79, 2)),
            default_reservation_minutes: config.default_reservation_minutes,
            reservation_ttl: Duration::seconds(config.reservation_ttl_secs),
            auto_recharge_topup_pence: config.auto_recharge_topup_pence,
        }
    }

    /// Current per-minute rate in pence, rounded up
    pub fn rate_pence_per_minute(&self) -> i64 {
        calculators::usd_cents_to_pence(self.rate_cents_per_minute, self.usd_to_gbp)
    }
}

impl Default for BillingParams {
    fn default() -> Self {
        Self::from_config(&BillingConfig::default())
    }
}

/// Ledger idempotency key for a call charge
///
/// Keyed by the provider's external ref on every path (reservation
/// commit, direct-billing fallback, reconciliation recovery) so the same
/// call can never be charged twice.
pub fn call_charge_key(external_ref: &str) -> String {
    format!("call-charge:{}", external_ref)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_rate_is_56_pence_per_minute() {
        let params = BillingParams::default();
        assert_eq!(params.usd_to_gbp, dec!(0.79));
        // 70 cents * 0.79 = 55.3, rounded up
        assert_eq!(params.rate_pence_per_minute(), 56);
    }

    #[test]
    fn test_call_charge_key_is_stable() {
        assert_eq!(call_charge_key("prov-1"), "call-charge:prov-1");
    }
}
