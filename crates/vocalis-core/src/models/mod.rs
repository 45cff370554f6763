//! Domain models for the Vocalis credit ledger

pub mod alert;
pub mod call;
pub mod purchase;
pub mod reconciliation;
pub mod reservation;
pub mod transaction;
pub mod wallet;

pub use alert::{Alert, AlertSeverity};
pub use call::{CallRecord, NewCallRecord, ProviderCall, ProviderCallPage};
pub use purchase::{AssetPurchase, PurchaseStatus};
pub use reconciliation::ReconciliationRun;
pub use reservation::{
    CommitApply, CreditReservation, NewReservation, ReservationStatus, ReserveInsert,
};
pub use transaction::{
    ApplyOutcome, BalanceFloor, LedgerTransaction, NewLedgerEntry, TransactionKind,
};
pub use wallet::Wallet;
