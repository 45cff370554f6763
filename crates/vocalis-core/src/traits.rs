//! Common traits for repositories and external collaborators
//!
//! Defines abstractions for the durable store and the outward-facing
//! boundaries (call provider, payment gateway, alert sink). Services are
//! generic over these so business logic tests run against in-memory
//! implementations.

use crate::error::AppError;
use crate::models::{
    Alert, ApplyOutcome, AssetPurchase, BalanceFloor, CallRecord, CommitApply, CreditReservation,
    NewCallRecord, NewLedgerEntry, NewReservation, ProviderCallPage, ReconciliationRun,
    ReserveInsert, Wallet,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

/// Wallet repository
///
/// `apply_entry` is the single primitive behind every balance mutation:
/// one atomic, server-side statement that moves the balance under the
/// given floor guard and writes the ledger row. No implementation may
/// read a balance and write it back in a separate round trip.
#[async_trait]
pub trait WalletRepository: Send + Sync {
    /// Find a wallet by organization
    async fn find_by_org(&self, org_id: Uuid) -> Result<Option<Wallet>, AppError>;

    /// Create a wallet at tenant onboarding
    async fn create(&self, wallet: &Wallet) -> Result<Wallet, AppError>;

    /// Atomically apply a ledger entry under a balance floor
    async fn apply_entry(
        &self,
        entry: &NewLedgerEntry,
        floor: BalanceFloor,
    ) -> Result<ApplyOutcome, AppError>;
}

/// Reservation repository
///
/// All state transitions are status-guarded conditional writes so that
/// overlapping request handlers and background jobs stay safe without
/// any external locking.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Insert an active hold, guarded by the effective available balance
    async fn reserve(&self, reservation: &NewReservation) -> Result<ReserveInsert, AppError>;

    /// Atomically flip an active reservation to committed and apply the
    /// call charge under the debt-limit floor; rolls back entirely when
    /// the floor is breached
    async fn commit_active(
        &self,
        call_id: &str,
        charge: &NewLedgerEntry,
    ) -> Result<CommitApply, AppError>;

    /// Flip an active reservation to released, returning it, or `None`
    /// when no active reservation matches
    async fn release_active(&self, call_id: &str) -> Result<Option<CreditReservation>, AppError>;

    /// Find the most recent reservation for a call
    async fn find_by_call_id(&self, call_id: &str) -> Result<Option<CreditReservation>, AppError>;

    /// Sum of active holds for an organization, in pence
    async fn active_held_pence(&self, org_id: Uuid) -> Result<i64, AppError>;

    /// Expire every active reservation past its deadline; returns the count
    async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Call record repository
#[async_trait]
pub trait CallRepository: Send + Sync {
    /// Insert a call record; idempotent on `external_ref`
    async fn record(&self, call: &NewCallRecord) -> Result<CallRecord, AppError>;

    /// External refs of calls recorded inside a window
    async fn external_refs_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<HashSet<String>, AppError>;
}

/// Asset purchase audit repository
#[async_trait]
pub trait PurchaseRepository: Send + Sync {
    /// Write-once insert; an existing key is left untouched
    async fn record(&self, purchase: &AssetPurchase) -> Result<(), AppError>;

    /// Look up a purchase attempt by idempotency key
    async fn find_by_key(&self, idempotency_key: &str) -> Result<Option<AssetPurchase>, AppError>;
}

/// Reconciliation audit repository
#[async_trait]
pub trait ReconciliationRepository: Send + Sync {
    /// Append one run record
    async fn insert_run(&self, run: &ReconciliationRun) -> Result<ReconciliationRun, AppError>;
}

/// Best-effort outbound notification sink
///
/// Implementations log delivery failures; they never propagate them.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, alert: Alert);
}

/// Upstream call provider client
#[async_trait]
pub trait CallProviderClient: Send + Sync {
    /// One page of the provider's call listing for a creation-time window
    async fn list_calls(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        page: u32,
        page_size: u32,
    ) -> Result<ProviderCallPage, AppError>;
}

/// Outcome of a payment collection attempt
#[derive(Debug, Clone)]
pub enum PaymentOutcome {
    Collected { payment_ref: String },
    Declined { reason: String },
}

/// Payment gateway client
///
/// Only the collect side is modeled; the gateway's own idempotency key
/// guarantees a retried collection charges the card at most once.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn collect(
        &self,
        org_id: Uuid,
        payment_method_ref: &str,
        amount_pence: i64,
        idempotency_key: &str,
    ) -> Result<PaymentOutcome, AppError>;
}

/// Injectable clock so jobs and expiry checks are deterministic in tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used in production
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
