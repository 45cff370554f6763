//! Asset purchase audit record
//!
//! Write-once record of a discrete purchase attempt, keyed by the caller's
//! idempotency key. Replays are detected through the ledger's unique key;
//! this table preserves the rejected attempts the ledger never sees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Purchase outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    /// Balance was deducted and the asset may be provisioned
    Completed,
    /// Zero-debt policy refused the deduction
    Rejected,
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurchaseStatus::Completed => write!(f, "completed"),
            PurchaseStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl PurchaseStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "completed" => Some(PurchaseStatus::Completed),
            "rejected" => Some(PurchaseStatus::Rejected),
            _ => None,
        }
    }
}

/// Asset purchase record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetPurchase {
    /// Caller-supplied idempotency key, primary key
    pub idempotency_key: String,

    /// Owning organization
    pub org_id: Uuid,

    /// What was bought (phone_number, etc.)
    pub asset_type: String,

    /// Attempted cost in pence
    pub cost_pence: i64,

    /// Outcome of the attempt
    pub status: PurchaseStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl AssetPurchase {
    pub fn new(
        idempotency_key: impl Into<String>,
        org_id: Uuid,
        asset_type: impl Into<String>,
        cost_pence: i64,
        status: PurchaseStatus,
    ) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            org_id,
            asset_type: asset_type.into(),
            cost_pence,
            status,
            created_at: Utc::now(),
        }
    }
}
