//! Repository implementations

pub mod call_repo;
pub mod purchase_repo;
pub mod reconciliation_repo;
pub mod reservation_repo;
pub mod wallet_repo;

pub use call_repo::PgCallRepository;
pub use purchase_repo::PgPurchaseRepository;
pub use reconciliation_repo::PgReconciliationRepository;
pub use reservation_repo::PgReservationRepository;
pub use wallet_repo::PgWalletRepository;

/// Whether a sqlx error is a unique-constraint violation
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
