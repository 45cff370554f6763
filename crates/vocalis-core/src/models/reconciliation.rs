//! Reconciliation run record
//!
//! Append-only audit trail, one row per reconciliation job run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result of one reconciliation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationRun {
    /// Unique identifier
    pub id: Uuid,

    /// Start of the reconciled window
    pub window_start: DateTime<Utc>,

    /// End of the reconciled window
    pub window_end: DateTime<Utc>,

    /// Calls reported upstream for the window
    pub total_checked: i64,

    /// Calls present upstream but missing internally
    pub missing_found: i64,

    /// Missing calls successfully recovered into the ledger
    pub recovered: i64,

    /// Revenue recovered, in pence
    pub recovered_pence: i64,

    /// Fraction of upstream calls that were already recorded internally
    pub reliability_pct: f64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl ReconciliationRun {
    /// Build a run record; reliability of an empty window is 1.0
    pub fn new(
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        total_checked: i64,
        missing_found: i64,
        recovered: i64,
        recovered_pence: i64,
    ) -> Self {
        let reliability_pct = if total_checked > 0 {
            (total_checked - missing_found) as f64 / total_checked as f64
        } else {
            1.0
        };

        Self {
            id: Uuid::new_v4(),
            window_start,
            window_end,
            total_checked,
            missing_found,
            recovered,
            recovered_pence,
            reliability_pct,
            created_at: Utc::now(),
        }
    }
}
