//! Reservation lifecycle management
//!
//! Places holds before a call connects, settles them when the call
//! completes, and releases them when it never does. The per-minute rate
//! is locked in at reservation time so a mid-call price change cannot
//! alter what an already-connected call pays.

use crate::calculators::minute_charge;
use crate::debt_monitor::DebtMonitor;
use crate::{call_charge_key, BillingParams};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use vocalis_core::{
    models::{
        Alert, CommitApply, NewLedgerEntry, NewReservation, ReservationStatus, ReserveInsert,
        TransactionKind,
    },
    traits::{AlertSink, Clock, ReservationRepository, WalletRepository},
    AppResult,
};

/// Outcome of placing a hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved {
        reservation_id: Uuid,
        reserved_pence: i64,
        effective_balance_pence: i64,
        /// An identical active hold already existed for this call
        duplicate: bool,
    },
    InsufficientBalance {
        effective_balance_pence: i64,
        required_pence: i64,
    },
    OrganizationNotFound,
}

/// Outcome of settling a hold against the real call duration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed {
        actual_cost_pence: i64,
        released_pence: i64,
        balance_after: i64,
    },
    /// The call was already charged; nothing changed
    Duplicate,
    DebtLimitExceeded {
        current_balance_pence: i64,
        debt_limit_pence: i64,
        attempted_deduction_pence: i64,
        amount_over_limit_pence: i64,
    },
    /// No usable hold exists; the caller should bill directly
    FallbackToDirectBilling,
}

/// Outcome of releasing a hold without charging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released { released_pence: i64 },
    /// No active hold matched the call
    NotActive,
}

/// Places, settles, and releases credit holds
pub struct ReservationManager<W, R, A> {
    wallets: Arc<W>,
    reservations: Arc<R>,
    alerts: Arc<A>,
    monitor: Arc<DebtMonitor<W, A>>,
    clock: Arc<dyn Clock>,
    params: BillingParams,
}

impl<W, R, A> ReservationManager<W, R, A>
where
    W: WalletRepository,
    R: ReservationRepository,
    A: AlertSink,
{
    pub fn new(
        wallets: Arc<W>,
        reservations: Arc<R>,
        alerts: Arc<A>,
        monitor: Arc<DebtMonitor<W, A>>,
        clock: Arc<dyn Clock>,
        params: BillingParams,
    ) -> Self {
        Self {
            wallets,
            reservations,
            alerts,
            monitor,
            clock,
            params,
        }
    }

    /// Place a hold for an outgoing call
    ///
    /// The hold is sized from the estimated minutes (or the configured
    /// default) at today's rate and is guarded against the effective
    /// available balance: current balance minus every other active hold.
    /// Re-reserving a call with an active hold returns the existing one.
    #[instrument(skip(self), fields(org_id = %org_id, call_id = %call_id))]
    pub async fn reserve(
        &self,
        org_id: Uuid,
        call_id: &str,
        external_ref: &str,
        estimated_minutes: Option<i64>,
    ) -> AppResult<ReserveOutcome> {
        let minutes = estimated_minutes
            .unwrap_or(self.params.default_reservation_minutes)
            .max(1);
        let rate = self.params.rate_pence_per_minute();
        let reserved_pence = minutes * rate;
        let expires_at = self.clock.now() + self.params.reservation_ttl;

        let new = NewReservation::new(
            org_id,
            call_id,
            external_ref,
            reserved_pence,
            rate,
            minutes,
            expires_at,
        );

        match self.reservations.reserve(&new).await? {
            ReserveInsert::Created(reservation) => {
                let effective = self.effective_balance(org_id).await?;
                info!(
                    "Reserved {}p for call {} ({} min at {}p/min)",
                    reservation.reserved_pence, call_id, minutes, rate
                );
                Ok(ReserveOutcome::Reserved {
                    reservation_id: reservation.id,
                    reserved_pence: reservation.reserved_pence,
                    effective_balance_pence: effective,
                    duplicate: false,
                })
            }
            ReserveInsert::DuplicateActive(existing) => {
                let effective = self.effective_balance(org_id).await?;
                info!("Call {} already holds {}p", call_id, existing.reserved_pence);
                Ok(ReserveOutcome::Reserved {
                    reservation_id: existing.id,
                    reserved_pence: existing.reserved_pence,
                    effective_balance_pence: effective,
                    duplicate: true,
                })
            }
            ReserveInsert::InsufficientFunds {
                effective_balance_pence,
                ..
            } => {
                warn!(
                    "Reservation refused for call {}: effective {}p, required {}p",
                    call_id, effective_balance_pence, reserved_pence
                );
                self.alerts
                    .notify(
                        Alert::warning("Call reservation refused: insufficient balance")
                            .detail("org_id", org_id)
                            .detail("call_id", call_id)
                            .detail("effective_balance_pence", effective_balance_pence)
                            .detail("required_pence", reserved_pence),
                    )
                    .await;
                Ok(ReserveOutcome::InsufficientBalance {
                    effective_balance_pence,
                    required_pence: reserved_pence,
                })
            }
            ReserveInsert::WalletMissing => {
                warn!("No wallet for org {}", org_id);
                Ok(ReserveOutcome::OrganizationNotFound)
            }
        }
    }

    /// Settle a hold against the actual call duration
    ///
    /// Bills whole minutes at the rate locked in by the hold and returns
    /// the unspent remainder. A missing or already-swept hold tells the
    /// caller to fall back to direct billing; a completed settlement for
    /// the same call is a duplicate, never a second charge.
    #[instrument(skip(self), fields(call_id = %call_id))]
    pub async fn commit(&self, call_id: &str, duration_seconds: i64) -> AppResult<CommitOutcome> {
        let reservation = match self.reservations.find_by_call_id(call_id).await? {
            Some(reservation) => reservation,
            None => {
                warn!("No reservation for call {}, falling back", call_id);
                return Ok(CommitOutcome::FallbackToDirectBilling);
            }
        };

        match reservation.status {
            ReservationStatus::Committed => {
                info!("Call {} already settled", call_id);
                return Ok(CommitOutcome::Duplicate);
            }
            ReservationStatus::Released | ReservationStatus::Expired => {
                warn!(
                    "Reservation for call {} is {}, falling back",
                    call_id, reservation.status
                );
                return Ok(CommitOutcome::FallbackToDirectBilling);
            }
            ReservationStatus::Active => {}
        }

        let actual_cost = minute_charge(duration_seconds, reservation.rate_pence_per_minute);
        if actual_cost == 0 {
            // Nothing to bill; just let the hold go.
            return self.settle_free(call_id, reservation.org_id).await;
        }

        let charge = NewLedgerEntry::debit(
            reservation.org_id,
            actual_cost,
            TransactionKind::CallCharge,
            format!("Call charge for {}", call_id),
            call_charge_key(&reservation.external_ref),
        );

        match self.reservations.commit_active(call_id, &charge).await? {
            CommitApply::Committed {
                reservation,
                balance_after,
                ..
            } => {
                let released = (reservation.reserved_pence - actual_cost).max(0);
                info!(
                    "Call {} settled: charged {}p, released {}p, balance {}p",
                    call_id, actual_cost, released, balance_after
                );
                Ok(CommitOutcome::Committed {
                    actual_cost_pence: actual_cost,
                    released_pence: released,
                    balance_after,
                })
            }
            CommitApply::AlreadyCharged { .. } => {
                info!("Call {} was already charged elsewhere", call_id);
                Ok(CommitOutcome::Duplicate)
            }
            CommitApply::NoActiveReservation => {
                // Lost a race with the sweeper or another settle attempt.
                match self.reservations.find_by_call_id(call_id).await? {
                    Some(r) if r.status == ReservationStatus::Committed => {
                        Ok(CommitOutcome::Duplicate)
                    }
                    _ => Ok(CommitOutcome::FallbackToDirectBilling),
                }
            }
            CommitApply::DebtLimitExceeded {
                balance_pence,
                debt_limit_pence,
            } => {
                self.monitor
                    .handle_breach(
                        reservation.org_id,
                        actual_cost,
                        balance_pence,
                        debt_limit_pence,
                    )
                    .await;
                Ok(CommitOutcome::DebtLimitExceeded {
                    current_balance_pence: balance_pence,
                    debt_limit_pence,
                    attempted_deduction_pence: actual_cost,
                    amount_over_limit_pence: actual_cost - (balance_pence - debt_limit_pence),
                })
            }
        }
    }

    /// Release a hold that will never be charged (call failed to connect)
    #[instrument(skip(self), fields(call_id = %call_id))]
    pub async fn release(&self, call_id: &str) -> AppResult<ReleaseOutcome> {
        match self.reservations.release_active(call_id).await? {
            Some(reservation) => {
                info!(
                    "Released {}p hold for call {}",
                    reservation.reserved_pence, call_id
                );
                Ok(ReleaseOutcome::Released {
                    released_pence: reservation.reserved_pence,
                })
            }
            None => Ok(ReleaseOutcome::NotActive),
        }
    }

    /// Balance minus all active holds for an organization
    async fn effective_balance(&self, org_id: Uuid) -> AppResult<i64> {
        let balance = self
            .wallets
            .find_by_org(org_id)
            .await?
            .map(|w| w.balance_pence)
            .unwrap_or(0);
        let held = self.reservations.active_held_pence(org_id).await?;
        Ok(balance - held)
    }

    /// Settle a zero-cost call by releasing its hold
    ///
    /// The row ends up `released`, not `committed`: no charge means no
    /// ledger entry, and a ledger-backed `committed` row is the invariant
    /// the audit trail relies on. Callers still see a `Committed` outcome
    /// with a zero cost.
    async fn settle_free(&self, call_id: &str, org_id: Uuid) -> AppResult<CommitOutcome> {
        let released = match self.reservations.release_active(call_id).await? {
            Some(reservation) => reservation.reserved_pence,
            None => 0,
        };
        let balance = self
            .wallets
            .find_by_org(org_id)
            .await?
            .map(|w| w.balance_pence)
            .unwrap_or(0);
        Ok(CommitOutcome::Committed {
            actual_cost_pence: 0,
            released_pence: released,
            balance_after: balance,
        })
    }
}
