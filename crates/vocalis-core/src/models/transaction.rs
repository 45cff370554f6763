//! Ledger transaction models
//!
//! Immutable audit log of all balance changes plus the discriminated
//! outcomes of the atomic apply operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Credit purchased or collected by auto-recharge
    Topup,
    /// Metered charge for a completed call
    CallCharge,
    /// Discrete purchase (phone number, etc.)
    AssetCharge,
    /// Compensating credit for a failed downstream step
    Refund,
    /// Promotional credit
    Bonus,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Topup => write!(f, "topup"),
            TransactionKind::CallCharge => write!(f, "call_charge"),
            TransactionKind::AssetCharge => write!(f, "asset_charge"),
            TransactionKind::Refund => write!(f, "refund"),
            TransactionKind::Bonus => write!(f, "bonus"),
        }
    }
}

impl TransactionKind {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "topup" => Some(TransactionKind::Topup),
            "call_charge" => Some(TransactionKind::CallCharge),
            "asset_charge" => Some(TransactionKind::AssetCharge),
            "refund" => Some(TransactionKind::Refund),
            "bonus" => Some(TransactionKind::Bonus),
            _ => None,
        }
    }

    /// Whether this kind increases the balance
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TransactionKind::Topup | TransactionKind::Refund | TransactionKind::Bonus
        )
    }
}

/// Ledger transaction entity
///
/// Immutable once written. Invariant: `balance_after = balance_before +
/// amount_pence`, and the idempotency key maps to at most one row ever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Unique identifier
    pub id: Uuid,

    /// Owning organization
    pub org_id: Uuid,

    /// Signed amount in pence (negative for charges)
    pub amount_pence: i64,

    /// Kind of transaction
    pub kind: TransactionKind,

    /// Human-readable description
    pub description: Option<String>,

    /// Caller-supplied globally unique key
    pub idempotency_key: String,

    /// Wallet balance before this transaction
    pub balance_before: i64,

    /// Wallet balance after this transaction
    pub balance_after: i64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    /// Check if this is a debit transaction (reduces balance)
    pub fn is_debit(&self) -> bool {
        self.amount_pence < 0
    }
}

/// A ledger entry waiting to be applied atomically
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub id: Uuid,
    pub org_id: Uuid,
    pub amount_pence: i64,
    pub kind: TransactionKind,
    pub description: Option<String>,
    pub idempotency_key: String,
}

impl NewLedgerEntry {
    /// Build a debit entry from a positive cost
    pub fn debit(
        org_id: Uuid,
        cost_pence: i64,
        kind: TransactionKind,
        description: impl Into<String>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            amount_pence: -cost_pence.abs(),
            kind,
            description: Some(description.into()),
            idempotency_key: idempotency_key.into(),
        }
    }

    /// Build a credit entry from a positive amount
    pub fn credit(
        org_id: Uuid,
        amount_pence: i64,
        kind: TransactionKind,
        description: impl Into<String>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            amount_pence: amount_pence.abs(),
            kind,
            description: Some(description.into()),
            idempotency_key: idempotency_key.into(),
        }
    }
}

/// Lowest balance a mutation may leave behind
///
/// Asset purchases carry the zero-debt floor; call charges may run the
/// balance down to the wallet's debt limit; credits have no floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceFloor {
    /// No guard, used for credits
    Unbounded,
    /// Balance after must be >= 0 (zero-debt policy)
    Zero,
    /// Balance after must be >= the wallet's debt limit
    DebtLimit,
}

/// Outcome of atomically applying a ledger entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Balance moved by exactly the entry amount
    Applied {
        transaction_id: Uuid,
        balance_before: i64,
        balance_after: i64,
    },
    /// The idempotency key was already used; nothing changed
    Duplicate,
    /// The floor guard rejected the mutation; nothing changed
    FloorBreached {
        balance_pence: i64,
        debt_limit_pence: i64,
    },
    /// No wallet exists for the organization
    WalletMissing,
}
