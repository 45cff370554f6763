//! In-memory collaborators for job tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;
use vocalis_core::{
    models::{
        Alert, ApplyOutcome, AssetPurchase, BalanceFloor, CallRecord, CommitApply,
        CreditReservation, NewCallRecord, NewLedgerEntry, NewReservation, ProviderCallPage,
        ReconciliationRun, ReservationStatus, ReserveInsert, Wallet,
    },
    traits::{
        AlertSink, CallProviderClient, CallRepository, Clock, PaymentOutcome, PaymentProcessor,
        PurchaseRepository, ReconciliationRepository, ReservationRepository, WalletRepository,
    },
    AppError, AppResult,
};

/// In-memory wallet store with ledger idempotency and floor guards
pub struct MemWallets {
    state: Mutex<MemWalletState>,
}

struct MemWalletState {
    wallets: HashMap<Uuid, Wallet>,
    used_keys: HashSet<String>,
    failing_keys: HashSet<String>,
}

impl MemWallets {
    pub fn with_wallet(wallet: Wallet) -> Self {
        let mut wallets = HashMap::new();
        wallets.insert(wallet.org_id, wallet);
        Self {
            state: Mutex::new(MemWalletState {
                wallets,
                used_keys: HashSet::new(),
                failing_keys: HashSet::new(),
            }),
        }
    }

    pub fn balance(&self, org_id: Uuid) -> i64 {
        self.state.lock().unwrap().wallets[&org_id].balance_pence
    }

    /// Mark a ledger key as already consumed
    pub fn spend_key(&self, key: &str) {
        self.state.lock().unwrap().used_keys.insert(key.to_string());
    }

    /// Make `apply_entry` fail for one ledger key
    pub fn fail_for_key(&self, key: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_keys
            .insert(key.to_string());
    }
}

#[async_trait]
impl WalletRepository for MemWallets {
    async fn find_by_org(&self, org_id: Uuid) -> AppResult<Option<Wallet>> {
        Ok(self.state.lock().unwrap().wallets.get(&org_id).cloned())
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
        let mut state = self.state.lock().unwrap();
        if state.failing_keys.contains(&entry.idempotency_key) {
            return Err(AppError::Database("wallet store unavailable".to_string()));
        }
        if state.used_keys.contains(&entry.idempotency_key) {
            return Ok(ApplyOutcome::Duplicate);
        }
        let wallet = match state.wallets.get(&entry.org_id) {
            Some(w) => w.clone(),
            None => return Ok(ApplyOutcome::WalletMissing),
        };
        let after = wallet.balance_pence + entry.amount_pence;
        let floor_value = match floor {
            BalanceFloor::Unbounded => i64::MIN,
            BalanceFloor::Zero => 0,
            BalanceFloor::DebtLimit => wallet.debt_limit_pence,
        };
        if after < floor_value {
            return Ok(ApplyOutcome::FloorBreached {
                balance_pence: wallet.balance_pence,
                debt_limit_pence: wallet.debt_limit_pence,
            });
        }
        state.used_keys.insert(entry.idempotency_key.clone());
        state.wallets.get_mut(&entry.org_id).unwrap().balance_pence = after;
        Ok(ApplyOutcome::Applied {
            transaction_id: Uuid::new_v4(),
            balance_before: wallet.balance_pence,
            balance_after: after,
        })
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

    pub fn seed(&self, org_id: Uuid, external_ref: &str, duration_seconds: i64, cost_pence: i64) {
        self.rows.lock().unwrap().push(CallRecord {
            id: Uuid::new_v4(),
            org_id,
            external_ref: external_ref.to_string(),
            duration_seconds,
            cost_pence,
            reconciled: false,
            created_at: Utc::now(),
        });
    }

    pub fn refs(&self) -> HashSet<String> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.external_ref.clone())
            .collect()
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

/// In-memory reconciliation run store
pub struct MemRuns {
    rows: Mutex<Vec<ReconciliationRun>>,
}

impl MemRuns {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl ReconciliationRepository for MemRuns {
    async fn insert_run(&self, run: &ReconciliationRun) -> AppResult<ReconciliationRun> {
        self.rows.lock().unwrap().push(run.clone());
        Ok(run.clone())
    }
}

/// Minimal reservation store for the sweeper
pub struct MemReservations {
    rows: Mutex<Vec<CreditReservation>>,
}

impl MemReservations {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }

    pub fn seed(&self, call_id: &str, status: ReservationStatus, expires_at: DateTime<Utc>) {
        let now = Utc::now();
        self.rows.lock().unwrap().push(CreditReservation {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            call_id: call_id.to_string(),
            external_ref: format!("ext-{}", call_id),
            reserved_pence: 245,
            rate_pence_per_minute: 49,
            estimated_minutes: 5,
            status,
            expires_at,
            created_at: now,
            updated_at: now,
        });
    }

    pub fn status_of(&self, call_id: &str) -> Option<ReservationStatus> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.call_id == call_id)
            .map(|r| r.status)
    }
}

#[async_trait]
impl ReservationRepository for MemReservations {
    async fn reserve(&self, _reservation: &NewReservation) -> AppResult<ReserveInsert> {
        unimplemented!("not exercised by job tests")
    }

    async fn commit_active(
        &self,
        _call_id: &str,
        _charge: &NewLedgerEntry,
    ) -> AppResult<CommitApply> {
        unimplemented!("not exercised by job tests")
    }

    async fn release_active(&self, _call_id: &str) -> AppResult<Option<CreditReservation>> {
        unimplemented!("not exercised by job tests")
    }

    async fn find_by_call_id(&self, call_id: &str) -> AppResult<Option<CreditReservation>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.call_id == call_id)
            .cloned())
    }

    async fn active_held_pence(&self, org_id: Uuid) -> AppResult<i64> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.org_id == org_id && r.status.is_holding())
            .map(|r| r.reserved_pence)
            .sum())
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

/// Provider stub serving a fixed page sequence
pub struct StubProvider {
    pages: Vec<ProviderCallPage>,
}

impl StubProvider {
    pub fn with_pages(pages: Vec<ProviderCallPage>) -> Self {
        Self { pages }
    }
}

#[async_trait]
impl CallProviderClient for StubProvider {
    async fn list_calls(
        &self,
        _window_start: DateTime<Utc>,
        _window_end: DateTime<Utc>,
        page: u32,
        _page_size: u32,
    ) -> AppResult<ProviderCallPage> {
        Ok(self
            .pages
            .get((page as usize).saturating_sub(1))
            .cloned()
            .unwrap_or(ProviderCallPage {
                calls: Vec::new(),
                has_more: false,
            }))
    }
}

/// Payment gateway stub with a scripted outcome
pub enum StubPayments {
    Collecting,
    Declining(String),
    Failing,
}

impl StubPayments {
    pub fn collecting() -> Self {
        StubPayments::Collecting
    }

    pub fn declining(reason: &str) -> Self {
        StubPayments::Declining(reason.to_string())
    }

    pub fn failing() -> Self {
        StubPayments::Failing
    }
}

#[async_trait]
impl PaymentProcessor for StubPayments {
    async fn collect(
        &self,
        _org_id: Uuid,
        _payment_method_ref: &str,
        _amount_pence: i64,
        idempotency_key: &str,
    ) -> AppResult<PaymentOutcome> {
        match self {
            StubPayments::Collecting => Ok(PaymentOutcome::Collected {
                payment_ref: format!("ch_{}", idempotency_key),
            }),
            StubPayments::Declining(reason) => Ok(PaymentOutcome::Declined {
                reason: reason.clone(),
            }),
            StubPayments::Failing => Err(AppError::Payment("gateway unavailable".to_string())),
        }
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

    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += duration;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
