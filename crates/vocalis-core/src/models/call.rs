//! Call record models
//!
//! Internal record of every billed call plus the shapes returned by the
//! upstream provider's call-listing endpoint. The reconciliation diff runs
//! over `external_ref`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Internally recorded call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    /// Unique identifier
    pub id: Uuid,

    /// Owning organization
    pub org_id: Uuid,

    /// Upstream provider's call identifier
    pub external_ref: String,

    /// Billable duration in seconds
    pub duration_seconds: i64,

    /// Charge applied for this call, in pence
    pub cost_pence: i64,

    /// True when the record was recovered by the reconciliation worker
    /// instead of arriving through webhook delivery
    pub reconciled: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// A call record waiting to be inserted
#[derive(Debug, Clone)]
pub struct NewCallRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    pub external_ref: String,
    pub duration_seconds: i64,
    pub cost_pence: i64,
    pub reconciled: bool,
}

impl NewCallRecord {
    pub fn new(
        org_id: Uuid,
        external_ref: impl Into<String>,
        duration_seconds: i64,
        cost_pence: i64,
        reconciled: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            external_ref: external_ref.into(),
            duration_seconds,
            cost_pence,
            reconciled,
        }
    }
}

/// One call as reported by the upstream provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCall {
    /// Provider's call identifier
    pub external_ref: String,

    /// Organization the call belongs to
    pub org_id: Uuid,

    /// Reported duration in seconds
    pub duration_seconds: i64,

    /// Reported total cost in US cents
    pub cost_usd_cents: i64,

    /// inbound / outbound
    pub direction: String,

    /// Provider-side call status
    pub status: String,

    /// When the call was created upstream
    pub created_at: DateTime<Utc>,
}

/// One page of the provider's paginated call listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCallPage {
    pub calls: Vec<ProviderCall>,
    pub has_more: bool,
}
