//! Credit reservation model
//!
//! A reservation earmarks funds for an in-flight call. The hold is purely
//! logical: the wallet balance is untouched and the held amount only
//! narrows the effective available balance until the reservation leaves
//! the `active` state.
//!
//! Lifecycle: exactly one transition out of `active`, to `committed`
//! (charged), `released` (call never connected), or `expired` (swept).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Reservation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Reservation is holding funds
    #[default]
    Active,
    /// Converted into a call charge
    Committed,
    /// Released without a charge
    Released,
    /// Expired by the sweeper (call never reported completion)
    Expired,
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationStatus::Active => write!(f, "active"),
            ReservationStatus::Committed => write!(f, "committed"),
            ReservationStatus::Released => write!(f, "released"),
            ReservationStatus::Expired => write!(f, "expired"),
        }
    }
}

impl ReservationStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(ReservationStatus::Active),
            "committed" => Some(ReservationStatus::Committed),
            "released" => Some(ReservationStatus::Released),
            "expired" => Some(ReservationStatus::Expired),
            _ => None,
        }
    }

    /// Check if the reservation is still holding funds
    pub fn is_holding(&self) -> bool {
        matches!(self, ReservationStatus::Active)
    }

    /// Check if the reservation reached a terminal state
    pub fn is_final(&self) -> bool {
        !self.is_holding()
    }
}

/// Credit reservation entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditReservation {
    /// Unique identifier
    pub id: Uuid,

    /// Owning organization
    pub org_id: Uuid,

    /// Call identifier, unique among active reservations
    pub call_id: String,

    /// Upstream provider's identifier for the same call
    pub external_ref: String,

    /// Amount held in pence
    pub reserved_pence: i64,

    /// Per-minute rate locked in at reservation time
    pub rate_pence_per_minute: i64,

    /// Minutes the hold was sized for
    pub estimated_minutes: i64,

    /// Current status
    pub status: ReservationStatus,

    /// When the sweeper may expire this hold
    pub expires_at: DateTime<Utc>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl CreditReservation {
    /// Check if the reservation is past its expiry deadline
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A reservation waiting to be inserted
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub id: Uuid,
    pub org_id: Uuid,
    pub call_id: String,
    pub external_ref: String,
    pub reserved_pence: i64,
    pub rate_pence_per_minute: i64,
    pub estimated_minutes: i64,
    pub expires_at: DateTime<Utc>,
}

impl NewReservation {
    pub fn new(
        org_id: Uuid,
        call_id: impl Into<String>,
        external_ref: impl Into<String>,
        reserved_pence: i64,
        rate_pence_per_minute: i64,
        estimated_minutes: i64,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            call_id: call_id.into(),
            external_ref: external_ref.into(),
            reserved_pence,
            rate_pence_per_minute,
            estimated_minutes,
            expires_at,
        }
    }
}

/// Outcome of the guarded reservation insert
#[derive(Debug, Clone)]
pub enum ReserveInsert {
    /// Hold created
    Created(CreditReservation),
    /// An active hold already exists for this call
    DuplicateActive(CreditReservation),
    /// Effective available balance cannot cover the hold
    InsufficientFunds {
        effective_balance_pence: i64,
        debt_limit_pence: i64,
    },
    /// No wallet exists for the organization
    WalletMissing,
}

/// Outcome of the atomic commit (status flip + charge + ledger row)
#[derive(Debug, Clone)]
pub enum CommitApply {
    /// Reservation committed and the charge applied
    Committed {
        reservation: CreditReservation,
        transaction_id: Uuid,
        balance_after: i64,
    },
    /// Reservation committed but the call was already charged elsewhere;
    /// no new ledger row was written
    AlreadyCharged { reservation: CreditReservation },
    /// No active reservation matched the call id
    NoActiveReservation,
    /// Charge would breach the debt limit; everything rolled back and the
    /// reservation is still active
    DebtLimitExceeded {
        balance_pence: i64,
        debt_limit_pence: i64,
    },
}
