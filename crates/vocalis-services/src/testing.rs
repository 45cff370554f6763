//! In-memory collaborators for service tests
//!
//! These mirror the store's guarded-write semantics closely enough to
//! exercise every business outcome: idempotency keys are enforced,
//! floors are checked against the same balances, and reservation
//! transitions are status-guarded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use vocalis_core::{
    models::{
        Alert, ApplyOutcome, AssetPurchase, BalanceFloor, CallRecord, CommitApply,
        CreditReservation, NewCallRecord, NewLedgerEntry, NewReservation, ReservationStatus,
        ReserveInsert, Wallet,
    },
    traits::{
        AlertSink, CallRepository, Clock, PurchaseRepository, ReservationRepository,
        WalletRepository,
    },
    AppResult,
};

/// In-memory wallet store with ledger idempotency and floor guards
pub struct MemWallets {
    state: Mutex<MemWalletState>,
}

struct MemWalletState {
    wallets: HashMap<Uuid, Wallet>,
    used_keys: HashMap<String, Uuid>,
}

impl MemWallets {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemWalletState {
                wallets: HashMap::new(),
                used_keys: HashMap::new(),
            }),
        }
    }

    pub fn with_wallet(wallet: Wallet) -> Self {
        let store = Self::new();
        store
            .state
            .lock()
            .unwrap()
            .wallets
            .insert(wallet.org_id, wallet);
        store
    }

    pub fn balance(&self, org_id: Uuid) -> i64 {
        self.state.lock().unwrap().wallets[&org_id].balance_pence
    }

    pub fn key_used(&self, key: &str) -> bool {
        self.state.lock().unwrap().used_keys.contains_key(key)
    }

    fn snapshot(&self, org_id: Uuid) -> Option<Wallet> {
        self.state.lock().unwrap().wallets.get(&org_id).cloned()
    }

    fn try_apply(&self, entry: &NewLedgerEntry, floor: BalanceFloor) -> ApplyOutcome {
        let mut state = self.state.lock().unwrap();
        if state.used_keys.contains_key(&entry.idempotency_key) {
            return ApplyOutcome::Duplicate;
        }
        let wallet = match state.wallets.get(&entry.org_id) {
            Some(w) => w.clone(),
            None => return ApplyOutcome::WalletMissing,
        };
        let after = wallet.balance_pence + entry.amount_pence;
        let floor_value = match floor {
            BalanceFloor::Unbounded => i64::MIN,
            BalanceFloor::Zero => 0,
            BalanceFloor::DebtLimit => wallet.debt_limit_pence,
        };
        if after < floor_value {
            return ApplyOutcome::FloorBreached {
                balance_pence: wallet.balance_pence,
                debt_limit_pence: wallet.debt_limit_pence,
            };
        }
        let id = Uuid::new_v4();
        state.used_keys.insert(entry.idempotency_key.clone(), id);
        state.wallets.get_mut(&entry.org_id).unwrap().balance_pence = after;
        ApplyOutcome::Applied {
            transaction_id: id,
            balance_before: wallet.balance_pence,
            balance_after: after,
        }
    }
}

#[async_trait]
impl WalletRepository for MemWallets {
    async fn find_by_org(&self, org_id: Uuid) -> AppResult<Option<Wallet>> {
        Ok(self.snapshot(org_id))
    }

    async fn create(&self, wallet: &Wallet) -> AppResult<Wallet> {
        self.state
            .lock()
            .unwrap()
            .wallets
            .insert(wallet.org_id, wallet.clone());
        Ok(wallet.clone())
    }

    async fn apply_entry(
        &self,
        entry: &NewLedgerEntry,
        floor: BalanceFloor,
    ) -> AppResult<ApplyOutcome> {
        Ok(self.try_apply(entry, floor))
    }
}

/// In-memory reservation store sharing the wallet state for guards
pub struct MemReservations {
    wallets: Arc<MemWallets>,
    rows: Mutex<Vec<CreditReservation>>,
}

impl MemReservations {
    pub fn new(wallets: Arc<MemWallets>) -> Self {
        Self {
            wallets,
            rows: Mutex::new(Vec::new()),
        }
    }

    pub fn status_of(&self, call_id: &str) -> Option<ReservationStatus> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.call_id == call_id)
            .map(|r| r.status)
    }

    fn held(&self, org_id: Uuid) -> i64 {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.org_id == org_id && r.status.is_holding())
            .map(|r| r.reserved_pence)
            .sum()
    }

    fn materialize(new: &NewReservation) -> CreditReservation {
        let now = Utc::now();
        CreditReservation {
            id: new.id,
            org_id: new.org_id,
            call_id: new.call_id.clone(),
            external_ref: new.external_ref.clone(),
            reserved_pence: new.reserved_pence,
            rate_pence_per_minute: new.rate_pence_per_minute,
            estimated_minutes: new.estimated_minutes,
            status: ReservationStatus::Active,
            expires_at: new.expires_at,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl ReservationRepository for MemReservations {
    async fn reserve(&self, reservation: &NewReservation) -> AppResult<ReserveInsert> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows
            .iter()
            .find(|r| r.call_id == reservation.call_id && r.status.is_holding())
        {
            return Ok(ReserveInsert::DuplicateActive(existing.clone()));
        }

        let wallet = match self.wallets.snapshot(reservation.org_id) {
            Some(w) => w,
            None => return Ok(ReserveInsert::WalletMissing),
        };
        let held: i64 = rows
            .iter()
            .filter(|r| r.org_id == reservation.org_id && r.status.is_holding())
            .map(|r| r.reserved_pence)
            .sum();
        let effective = wallet.balance_pence - held;
        if effective - reservation.reserved_pence < wallet.debt_limit_pence {
            return Ok(ReserveInsert::InsufficientFunds {
                effective_balance_pence: effective,
                debt_limit_pence: wallet.debt_limit_pence,
            });
        }

        let row = Self::materialize(reservation);
        rows.push(row.clone());
        Ok(ReserveInsert::Created(row))
    }

    async fn commit_active(
        &self,
        call_id: &str,
        charge: &NewLedgerEntry,
    ) -> AppResult<CommitApply> {
        let mut rows = self.rows.lock().unwrap();
        let index = match rows
            .iter()
            .position(|r| r.call_id == call_id && r.status.is_holding())
        {
            Some(i) => i,
            None => return Ok(CommitApply::NoActiveReservation),
        };

        if self.wallets.key_used(&charge.idempotency_key) {
            rows[index].status = ReservationStatus::Committed;
            return Ok(CommitApply::AlreadyCharged {
                reservation: rows[index].clone(),
            });
        }

        match self.wallets.try_apply(charge, BalanceFloor::DebtLimit) {
            ApplyOutcome::Applied {
                transaction_id,
                balance_after,
                ..
            } => {
                rows[index].status = ReservationStatus::Committed;
                Ok(CommitApply::Committed {
                    reservation: rows[index].clone(),
                    transaction_id,
                    balance_after,
                })
            }
            ApplyOutcome::Duplicate => {
                rows[index].status = ReservationStatus::Committed;
                Ok(CommitApply::AlreadyCharged {
                    reservation: rows[index].clone(),
                })
            }
            ApplyOutcome::FloorBreached {
                balance_pence,
                debt_limit_pence,
            } => Ok(CommitApply::DebtLimitExceeded {
                balance_pence,
                debt_limit_pence,
            }),
            ApplyOutcome::WalletMissing => unreachable!("reservation without wallet"),
        }
    }

    async fn release_active(&self, call_id: &str) -> AppResult<Option<CreditReservation>> {
        let mut rows = self.rows.lock().unwrap();
        match rows
            .iter()
            .position(|r| r.call_id == call_id && r.status.is_holding())
        {
            Some(i) => {
                rows[i].status = ReservationStatus::Released;
                Ok(Some(rows[i].clone()))
            }
            None => Ok(None),
        }
    }

    async fn find_by_call_id(&self, call_id: &str) -> AppResult<Option<CreditReservation>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.call_id == call_id)
            .cloned())
    }

    async fn active_held_pence(&self, org_id: Uuid) -> AppResult<i64> {
        Ok(self.held(org_id))
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        let mut count = 0;
        for row in rows.iter_mut() {
            if row.status.is_holding() && row.expires_at <= now {
                row.status = ReservationStatus::Expired;
                count += 1;
            }
        }
        Ok(count)
    }
}

/// In-memory call record store
pub struct MemCalls {
    rows: Mutex<Vec<CallRecord>>,
}

impl MemCalls {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }

    pub fn refs(&self) -> HashSet<String> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.external_ref.clone())
            .collect()
    }

    pub fn cost_of(&self, external_ref: &str) -> Option<i64> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.external_ref == external_ref)
            .map(|r| r.cost_pence)
    }
}

#[async_trait]
impl CallRepository for MemCalls {
    async fn record(&self, call: &NewCallRecord) -> AppResult<CallRecord> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows.iter().find(|r| r.external_ref == call.external_ref) {
            return Ok(existing.clone());
        }
        let record = CallRecord {
            id: call.id,
            org_id: call.org_id,
            external_ref: call.external_ref.clone(),
            duration_seconds: call.duration_seconds,
            cost_pence: call.cost_pence,
            reconciled: call.reconciled,
            created_at: Utc::now(),
        };
        rows.push(record.clone());
        Ok(record)
    }

    async fn external_refs_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<HashSet<String>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.created_at >= start && r.created_at <= end)
            .map(|r| r.external_ref.clone())
            .collect())
    }
}

/// In-memory purchase audit store
pub struct MemPurchases {
    rows: Mutex<HashMap<String, AssetPurchase>>,
}

impl MemPurchases {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PurchaseRepository for MemPurchases {
    async fn record(&self, purchase: &AssetPurchase) -> AppResult<()> {
        self.rows
            .lock()
            .unwrap()
            .entry(purchase.idempotency_key.clone())
            .or_insert_with(|| purchase.clone());
        Ok(())
    }

    async fn find_by_key(&self, idempotency_key: &str) -> AppResult<Option<AssetPurchase>> {
        Ok(self.rows.lock().unwrap().get(idempotency_key).cloned())
    }
}

/// Alert sink that records everything it is given
pub struct RecordingAlerts {
    seen: Mutex<Vec<Alert>>,
}

impl RecordingAlerts {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlerts {
    async fn notify(&self, alert: Alert) {
        self.seen.lock().unwrap().push(alert);
    }
}

/// Manually advanced clock
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
