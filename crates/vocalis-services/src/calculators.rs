//! Pure billing calculators
//!
//! All charge math lives here as free functions with no I/O so every
//! rounding rule can be pinned by a unit test. Monetary amounts are
//! integer minor units (US cents upstream, pence in the ledger); the
//! only decimal arithmetic is the USD to GBP conversion, and every
//! fractional result rounds up so rounding never favours the platform's
//! debtor side.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// A fixed-rate charge in both currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRateCharge {
    /// Charge in US cents, fractional cents rounded up
    pub usd_cents: i64,

    /// Charge in pence after conversion, fractional pence rounded up
    pub pence: i64,
}

impl FixedRateCharge {
    /// A zero charge in both currencies
    pub const ZERO: Self = Self {
        usd_cents: 0,
        pence: 0,
    };
}

/// Whole minutes billed for a call, always rounded up
///
/// Non-positive durations bill zero minutes.
pub fn billable_minutes(duration_seconds: i64) -> i64 {
    if duration_seconds <= 0 {
        return 0;
    }
    (duration_seconds + 59) / 60
}

/// Convert a US cent amount to pence, rounding fractional pence up
///
/// Non-positive amounts and non-positive rates convert to zero.
pub fn usd_cents_to_pence(usd_cents: i64, usd_to_gbp: Decimal) -> i64 {
    if usd_cents <= 0 || usd_to_gbp <= Decimal::ZERO {
        return 0;
    }
    (Decimal::from(usd_cents) * usd_to_gbp)
        .ceil()
        .to_i64()
        .unwrap_or(i64::MAX)
}

/// Fixed-rate charge for a call duration
///
/// The USD amount is prorated to the second (`duration * rate / 60`)
/// with fractional cents rounded up, then converted to pence with
/// fractional pence rounded up. A non-positive duration or rate
/// produces a zero charge.
pub fn fixed_rate_charge(
    duration_seconds: i64,
    rate_cents_per_minute: i64,
    usd_to_gbp: Decimal,
) -> FixedRateCharge {
    if duration_seconds <= 0 || rate_cents_per_minute <= 0 {
        return FixedRateCharge::ZERO;
    }

    // Ceiling division without floats: exact at whole-minute boundaries.
    let usd_cents = (duration_seconds * rate_cents_per_minute + 59) / 60;
    let pence = usd_cents_to_pence(usd_cents, usd_to_gbp);

    FixedRateCharge { usd_cents, pence }
}

/// Whole-minute charge at a locked-in pence rate
///
/// Used when settling a reservation: the minutes are rounded up and
/// billed at the rate captured when the hold was placed.
pub fn minute_charge(duration_seconds: i64, rate_pence_per_minute: i64) -> i64 {
    if rate_pence_per_minute <= 0 {
        return 0;
    }
    billable_minutes(duration_seconds) * rate_pence_per_minute
}

/// Result of applying a call against a plan's minute allowance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TieredCharge {
    /// Whole minutes the call consumed
    pub billable_minutes: i64,

    /// Minutes that fell outside the allowance
    pub overage_minutes: i64,

    /// Pence owed for the overage minutes
    pub overage_pence: i64,
}

/// Tiered overage charge for a call against a monthly minute allowance
///
/// Minutes inside the allowance are free; only the minutes that spill
/// past it are billed, at the plan's overage rate. A call can straddle
/// the boundary, in which case just the spilled portion is charged.
pub fn tiered_overage(
    duration_seconds: i64,
    minutes_used: i64,
    minutes_allowance: i64,
    overage_rate_pence_per_minute: i64,
) -> TieredCharge {
    let billable = billable_minutes(duration_seconds);
    let used = minutes_used.max(0);
    let allowance = minutes_allowance.max(0);

    let overage = if used >= allowance {
        billable
    } else {
        (used + billable - allowance).max(0)
    };

    TieredCharge {
        billable_minutes: billable,
        overage_minutes: overage,
        overage_pence: overage * overage_rate_pence_per_minute.max(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    const RATE: i64 = 70;

    fn fx() -> Decimal {
        dec!(0.79)
    }

    #[test]
    fn test_half_minute_charge() {
        let charge = fixed_rate_charge(30, RATE, fx());
        assert_eq!(charge.usd_cents, 35);
        assert_eq!(charge.pence, 28);
    }

    #[test]
    fn test_exact_minute_charge() {
        let charge = fixed_rate_charge(60, RATE, fx());
        assert_eq!(charge.usd_cents, 70);
        assert_eq!(charge.pence, 56);
    }

    #[test]
    fn test_fractional_cent_rounds_up() {
        // 91s * 70 / 60 = 106.16 cents -> 107; 107 * 0.79 = 84.53 -> 85
        let charge = fixed_rate_charge(91, RATE, fx());
        assert_eq!(charge.usd_cents, 107);
        assert_eq!(charge.pence, 85);
    }

    #[test]
    fn test_one_second_minimum() {
        let charge = fixed_rate_charge(1, RATE, fx());
        assert_eq!(charge.usd_cents, 2);
        assert_eq!(charge.pence, 2);
    }

    #[test]
    fn test_one_hour_charge() {
        let charge = fixed_rate_charge(3600, RATE, fx());
        assert_eq!(charge.usd_cents, 4200);
        assert_eq!(charge.pence, 3318);
    }

    #[test]
    fn test_zero_and_negative_duration_charge_nothing() {
        assert_eq!(fixed_rate_charge(0, RATE, fx()), FixedRateCharge::ZERO);
        assert_eq!(fixed_rate_charge(-30, RATE, fx()), FixedRateCharge::ZERO);
    }

    #[test]
    fn test_zero_rate_charges_nothing() {
        assert_eq!(fixed_rate_charge(600, 0, fx()), FixedRateCharge::ZERO);
        assert_eq!(fixed_rate_charge(600, -10, fx()), FixedRateCharge::ZERO);
    }

    #[test]
    fn test_billable_minutes_rounds_up() {
        assert_eq!(billable_minutes(0), 0);
        assert_eq!(billable_minutes(1), 1);
        assert_eq!(billable_minutes(59), 1);
        assert_eq!(billable_minutes(60), 1);
        assert_eq!(billable_minutes(61), 2);
        assert_eq!(billable_minutes(90), 2);
        assert_eq!(billable_minutes(3600), 60);
    }

    #[test]
    fn test_minute_charge_bills_whole_minutes() {
        assert_eq!(minute_charge(90, 49), 98);
        assert_eq!(minute_charge(300, 49), 245);
        assert_eq!(minute_charge(0, 49), 0);
        assert_eq!(minute_charge(90, 0), 0);
    }

    #[test]
    fn test_overage_straddling_allowance_boundary() {
        // Two billable minutes, one inside the allowance, one out.
        let charge = tiered_overage(120, 399, 400, 45);
        assert_eq!(charge.billable_minutes, 2);
        assert_eq!(charge.overage_minutes, 1);
        assert_eq!(charge.overage_pence, 45);
    }

    #[test]
    fn test_overage_fully_past_allowance() {
        let charge = tiered_overage(1800, 500, 400, 40);
        assert_eq!(charge.billable_minutes, 30);
        assert_eq!(charge.overage_minutes, 30);
        assert_eq!(charge.overage_pence, 1200);
    }

    #[test]
    fn test_overage_fully_inside_allowance() {
        let charge = tiered_overage(120, 100, 400, 45);
        assert_eq!(charge.billable_minutes, 2);
        assert_eq!(charge.overage_minutes, 0);
        assert_eq!(charge.overage_pence, 0);
    }

    #[test]
    fn test_overage_with_exhausted_allowance_bills_everything() {
        let charge = tiered_overage(60, 400, 400, 45);
        assert_eq!(charge.overage_minutes, 1);
        assert_eq!(charge.overage_pence, 45);
    }

    #[test]
    fn test_usd_cents_to_pence_rounds_up() {
        assert_eq!(usd_cents_to_pence(100, dec!(0.79)), 79);
        assert_eq!(usd_cents_to_pence(1, dec!(0.79)), 1);
        assert_eq!(usd_cents_to_pence(0, dec!(0.79)), 0);
        assert_eq!(usd_cents_to_pence(-50, dec!(0.79)), 0);
        assert_eq!(usd_cents_to_pence(100, Decimal::ZERO), 0);
    }

    proptest! {
        #[test]
        fn prop_fixed_rate_monotonic_in_duration(
            a in 0i64..100_000,
            b in 0i64..100_000,
            rate in 1i64..500,
        ) {
            let (short, long) = if a <= b { (a, b) } else { (b, a) };
            let cs = fixed_rate_charge(short, rate, dec!(0.79));
            let cl = fixed_rate_charge(long, rate, dec!(0.79));
            prop_assert!(cs.usd_cents <= cl.usd_cents);
            prop_assert!(cs.pence <= cl.pence);
        }

        #[test]
        fn prop_fixed_rate_never_undercharges(
            seconds in 1i64..100_000,
            rate in 1i64..500,
        ) {
            // Rounding up means the integer charge is never below the
            // exact prorated amount.
            let charge = fixed_rate_charge(seconds, rate, dec!(0.79));
            prop_assert!(charge.usd_cents * 60 >= seconds * rate);
        }

        #[test]
        fn prop_overage_never_exceeds_billable(
            seconds in 0i64..100_000,
            used in 0i64..10_000,
            allowance in 0i64..10_000,
            rate in 0i64..500,
        ) {
            let charge = tiered_overage(seconds, used, allowance, rate);
            prop_assert!(charge.overage_minutes >= 0);
            prop_assert!(charge.overage_minutes <= charge.billable_minutes);
            prop_assert_eq!(charge.overage_pence, charge.overage_minutes * rate);
        }
    }
}
