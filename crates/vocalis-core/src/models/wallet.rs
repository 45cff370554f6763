//! Per-tenant wallet model
//!
//! One wallet per organization, created at onboarding and never deleted.
//! Every ledger transaction mutates its running balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-tenant credit wallet
///
/// Balances are held in pence (signed). `debt_limit_pence` is the most
/// negative balance the tenant may reach; it is zero or negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Owning organization
    pub org_id: Uuid,

    /// Current balance in pence, may be negative down to the debt limit
    pub balance_pence: i64,

    /// Most negative balance permitted (always <= 0)
    pub debt_limit_pence: i64,

    /// Whether a debt-limit breach should enqueue a recharge
    pub auto_recharge_enabled: bool,

    /// Stored payment method reference for auto-recharge
    pub payment_method_ref: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create a wallet for a newly onboarded organization
    pub fn new(org_id: Uuid, opening_balance_pence: i64, debt_limit_pence: i64) -> Self {
        let now = Utc::now();
        Self {
            org_id,
            balance_pence: opening_balance_pence,
            debt_limit_pence: debt_limit_pence.min(0),
            auto_recharge_enabled: false,
            payment_method_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Spendable headroom before the debt limit is reached
    #[inline]
    pub fn headroom_pence(&self) -> i64 {
        self.balance_pence - self.debt_limit_pence
    }

    /// Whether a recharge can actually be collected for this wallet
    pub fn can_auto_recharge(&self) -> bool {
        self.auto_recharge_enabled && self.payment_method_ref.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debt_limit_clamped_to_non_positive() {
        let wallet = Wallet::new(Uuid::new_v4(), 1000, 500);
        assert_eq!(wallet.debt_limit_pence, 0);

        let wallet = Wallet::new(Uuid::new_v4(), 1000, -500);
        assert_eq!(wallet.debt_limit_pence, -500);
    }

    #[test]
    fn test_headroom() {
        let mut wallet = Wallet::new(Uuid::new_v4(), 1000, -500);
        assert_eq!(wallet.headroom_pence(), 1500);

        wallet.balance_pence = -500;
        assert_eq!(wallet.headroom_pence(), 0);
    }

    #[test]
    fn test_can_auto_recharge_requires_payment_method() {
        let mut wallet = Wallet::new(Uuid::new_v4(), 0, 0);
        wallet.auto_recharge_enabled = true;
        assert!(!wallet.can_auto_recharge());

        wallet.payment_method_ref = Some("pm_123".to_string());
        assert!(wallet.can_auto_recharge());
    }
}
