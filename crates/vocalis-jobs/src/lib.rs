//! Background jobs
//!
//! Three long-running tasks keep the ledger honest without any operator
//! involvement:
//!
//! - `ReservationExpirySweeper` frees holds whose calls never reported
//!   completion, so abandoned reservations cannot pin a tenant's
//!   effective balance forever
//! - `ReconciliationWorker` diffs the upstream provider's call log
//!   against the internal records and recovers any charge that webhook
//!   delivery dropped
//! - `AutoRechargeWorker` drains the debt monitor's top-up queue,
//!   collecting payments and crediting the ledger
//!
//! Each job exposes `run_once` for deterministic testing and a
//! `start`/`stop` pair that drives it on a tokio interval.

pub mod recharge;
pub mod reconciliation;
pub mod sweeper;

pub use recharge::AutoRechargeWorker;
pub use reconciliation::{ReconciliationSettings, ReconciliationWorker};
pub use sweeper::ReservationExpirySweeper;

#[cfg(test)]
pub(crate) mod testing;
