//! Composition root for the billing services
//!
//! Builds the debt monitor, direct deduction, reservation manager, and
//! call-billing services over one repository set, so the binary and any
//! transport host share a single wired bundle instead of assembling the
//! graph by hand.

use crate::call_billing::CallBillingService;
use crate::debt_monitor::{DebtMonitor, RechargeRequest};
use crate::deduction::DirectDeductionService;
use crate::reservation_manager::ReservationManager;
use crate::BillingParams;
use std::sync::Arc;
use tokio::sync::mpsc;
use vocalis_core::traits::{
    AlertSink, CallRepository, Clock, PurchaseRepository, ReservationRepository, WalletRepository,
};

/// The request-facing services, wired over one repository set
///
/// Handlers reach the billing operations through these fields; background
/// jobs borrow `deduction` for their own charge paths.
pub struct BillingServices<W, R, P, C, A> {
    pub monitor: Arc<DebtMonitor<W, A>>,
    pub deduction: Arc<DirectDeductionService<W, P, A>>,
    pub reservation_manager: Arc<ReservationManager<W, R, A>>,
    pub call_billing: Arc<CallBillingService<W, R, P, C, A>>,
}

impl<W, R, P, C, A> BillingServices<W, R, P, C, A>
where
    W: WalletRepository,
    R: ReservationRepository,
    P: PurchaseRepository,
    C: CallRepository,
    A: AlertSink,
{
    #[allow(clippy::too_many_arguments)]
    pub fn wire(
        wallets: Arc<W>,
        reservations: Arc<R>,
        purchases: Arc<P>,
        calls: Arc<C>,
        alerts: Arc<A>,
        recharge_tx: mpsc::Sender<RechargeRequest>,
        clock: Arc<dyn Clock>,
        params: BillingParams,
    ) -> Self {
        let monitor = Arc::new(DebtMonitor::new(
            wallets.clone(),
            alerts.clone(),
            recharge_tx,
            params.auto_recharge_topup_pence,
        ));
        let deduction = Arc::new(DirectDeductionService::new(
            wallets.clone(),
            purchases,
            alerts.clone(),
            monitor.clone(),
        ));
        let reservation_manager = Arc::new(ReservationManager::new(
            wallets,
            reservations,
            alerts,
            monitor.clone(),
            clock,
            params.clone(),
        ));
        let call_billing = Arc::new(CallBillingService::new(
            reservation_manager.clone(),
            deduction.clone(),
            calls,
            params,
        ));
        Self {
            monitor,
            deduction,
            reservation_manager,
            call_billing,
        }
    }
}
