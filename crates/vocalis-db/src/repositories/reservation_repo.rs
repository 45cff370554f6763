//! Credit reservation repository implementation
//!
//! Reserve runs as a transaction that locks the wallet row before reading
//! the held sum, so concurrent reserves for the same tenant serialize
//! inside PostgreSQL and each sees every hold the previous one committed.
//! Commit is one transaction pairing a status-guarded flip with the
//! debt-floor charge. Status transitions always carry
//! `WHERE status = 'active'` so overlapping request handlers and the
//! sweeper stay safe without external locking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;
use vocalis_core::{
    models::{
        CommitApply, CreditReservation, NewLedgerEntry, NewReservation, ReservationStatus,
        ReserveInsert,
    },
    traits::ReservationRepository,
    AppError, AppResult,
};

use super::is_unique_violation;

const RESERVATION_COLUMNS: &str = r#"
    id, org_id, call_id, external_ref, reserved_pence,
    rate_pence_per_minute, estimated_minutes, status,
    expires_at, created_at, updated_at
"#;

/// PostgreSQL implementation of ReservationRepository
pub struct PgReservationRepository {
    pool: PgPool,
}

impl PgReservationRepository {
    /// Create a new reservation repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Parse reservation status from string
    fn parse_status(s: &str) -> ReservationStatus {
        ReservationStatus::from_str(s).unwrap_or(ReservationStatus::Active)
    }

    async fn find_active_by_call_id(
        &self,
        call_id: &str,
    ) -> AppResult<Option<CreditReservation>> {
        let result = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM credit_reservations
            WHERE call_id = $1 AND status = 'active'
            "#
        ))
        .bind(call_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding active reservation: {}", e);
            AppError::Database(format!("Failed to find active reservation: {}", e))
        })?;

        Ok(result.map(Into::into))
    }
}

#[async_trait]
impl ReservationRepository for PgReservationRepository {
    #[instrument(skip(self, reservation), fields(call_id = %reservation.call_id))]
    async fn reserve(&self, reservation: &NewReservation) -> AppResult<ReserveInsert> {
        debug!(
            "Reserving {} pence for call {}",
            reservation.reserved_pence, reservation.call_id
        );

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        // Lock the wallet row before reading the held sum. A concurrent
        // reserve for the same tenant blocks here, and once it gets the
        // lock its held-sum statement runs on a fresh snapshot that
        // includes the hold we are about to commit. Summing in the same
        // statement as the lock would keep the statement-start snapshot
        // and miss it.
        let wallet = sqlx::query_as::<sqlx::Postgres, WalletSnapshotRow>(
            r#"
            SELECT balance_pence, debt_limit_pence
            FROM wallets
            WHERE org_id = $1
            FOR UPDATE
            "#,
        )
        .bind(reservation.org_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error locking wallet: {}", e);
            AppError::Database(format!("Failed to lock wallet: {}", e))
        })?;

        let Some(wallet) = wallet else {
            return Ok(ReserveInsert::WalletMissing);
        };

        let held: (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(reserved_pence), 0)::BIGINT
            FROM credit_reservations
            WHERE org_id = $1 AND status = 'active'
            "#,
        )
        .bind(reservation.org_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to sum active holds: {}", e)))?;

        let effective_balance_pence = wallet.balance_pence - held.0;
        if effective_balance_pence - reservation.reserved_pence < wallet.debt_limit_pence {
            return Ok(ReserveInsert::InsufficientFunds {
                effective_balance_pence,
                debt_limit_pence: wallet.debt_limit_pence,
            });
        }

        let result = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&format!(
            r#"
            INSERT INTO credit_reservations
                (id, org_id, call_id, external_ref, reserved_pence,
                 rate_pence_per_minute, estimated_minutes, status, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'active', $8)
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(reservation.id)
        .bind(reservation.org_id)
        .bind(&reservation.call_id)
        .bind(&reservation.external_ref)
        .bind(reservation.reserved_pence)
        .bind(reservation.rate_pence_per_minute)
        .bind(reservation.estimated_minutes)
        .bind(reservation.expires_at)
        .fetch_one(&mut *tx)
        .await;

        match result {
            Ok(row) => {
                tx.commit().await.map_err(|e| {
                    AppError::Transaction(format!("Failed to commit transaction: {}", e))
                })?;
                Ok(ReserveInsert::Created(row.into()))
            }
            Err(e) if is_unique_violation(&e) => {
                // An active hold already exists for this call id. The
                // violation poisoned the transaction, so drop it before
                // reading the surviving row.
                tx.rollback().await.map_err(|e| {
                    AppError::Transaction(format!("Failed to roll back transaction: {}", e))
                })?;
                match self.find_active_by_call_id(&reservation.call_id).await? {
                    Some(existing) => Ok(ReserveInsert::DuplicateActive(existing)),
                    // The competing hold resolved between our insert and this
                    // read; report the losing insert as a duplicate of it.
                    None => match self.find_by_call_id(&reservation.call_id).await? {
                        Some(existing) => Ok(ReserveInsert::DuplicateActive(existing)),
                        None => Err(AppError::Database(
                            "Reservation conflict with no surviving row".to_string(),
                        )),
                    },
                }
            }
            Err(e) => {
                error!("Database error creating reservation: {}", e);
                Err(AppError::Database(format!(
                    "Failed to create reservation: {}",
                    e
                )))
            }
        }
    }

    #[instrument(skip(self, charge), fields(key = %charge.idempotency_key))]
    async fn commit_active(
        &self,
        call_id: &str,
        charge: &NewLedgerEntry,
    ) -> AppResult<CommitApply> {
        debug!("Committing reservation for call {}", call_id);

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        // Status-guarded flip; only one committer can win.
        let reservation = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&format!(
            r#"
            UPDATE credit_reservations
            SET status = 'committed',
                updated_at = NOW()
            WHERE call_id = $1 AND status = 'active'
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(call_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error committing reservation: {}", e);
            AppError::Database(format!("Failed to commit reservation: {}", e))
        })?;

        let Some(reservation) = reservation else {
            return Ok(CommitApply::NoActiveReservation);
        };
        let reservation: CreditReservation = reservation.into();

        // The call may already be charged (webhook retry raced a fallback
        // deduction). Finish the status flip but write no second ledger row.
        let already: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM ledger_transactions WHERE idempotency_key = $1")
                .bind(&charge.idempotency_key)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| AppError::Database(format!("Failed to check ledger key: {}", e)))?;

        if already.is_some() {
            tx.commit().await.map_err(|e| {
                AppError::Transaction(format!("Failed to commit transaction: {}", e))
            })?;
            warn!(
                "Call {} already charged under key {}; reservation {} closed without a new charge",
                call_id, charge.idempotency_key, reservation.id
            );
            return Ok(CommitApply::AlreadyCharged { reservation });
        }

        let applied = sqlx::query_as::<sqlx::Postgres, CommitChargeRow>(
            r#"
            WITH applied AS (
                UPDATE wallets
                SET balance_pence = balance_pence + $3,
                    updated_at = NOW()
                WHERE org_id = $2
                  AND balance_pence + $3 >= debt_limit_pence
                RETURNING balance_pence AS balance_after
            )
            INSERT INTO ledger_transactions
                (id, org_id, amount_pence, kind, description, idempotency_key,
                 balance_before, balance_after)
            SELECT $1, $2, $3, $4, $5, $6, balance_after - $3, balance_after
            FROM applied
            RETURNING id, balance_after
            "#,
        )
        .bind(charge.id)
        .bind(charge.org_id)
        .bind(charge.amount_pence)
        .bind(charge.kind.to_string())
        .bind(&charge.description)
        .bind(&charge.idempotency_key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error applying call charge: {}", e);
            AppError::Database(format!("Failed to apply call charge: {}", e))
        })?;

        match applied {
            Some(row) => {
                tx.commit().await.map_err(|e| {
                    error!("Failed to commit transaction: {}", e);
                    AppError::Transaction(format!("Failed to commit transaction: {}", e))
                })?;

                Ok(CommitApply::Committed {
                    reservation,
                    transaction_id: row.id,
                    balance_after: row.balance_after,
                })
            }
            None => {
                // Debt floor refused the charge; undo the status flip too.
                let wallet = sqlx::query_as::<sqlx::Postgres, WalletSnapshotRow>(
                    "SELECT balance_pence, debt_limit_pence FROM wallets WHERE org_id = $1",
                )
                .bind(charge.org_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| AppError::Database(format!("Failed to read wallet: {}", e)))?;

                tx.rollback().await.map_err(|e| {
                    AppError::Transaction(format!("Failed to roll back transaction: {}", e))
                })?;

                warn!(
                    "Debt limit rejected commit for call {}: balance={}, limit={}",
                    call_id, wallet.balance_pence, wallet.debt_limit_pence
                );

                Ok(CommitApply::DebtLimitExceeded {
                    balance_pence: wallet.balance_pence,
                    debt_limit_pence: wallet.debt_limit_pence,
                })
            }
        }
    }

    #[instrument(skip(self))]
    async fn release_active(&self, call_id: &str) -> AppResult<Option<CreditReservation>> {
        debug!("Releasing reservation for call {}", call_id);

        let result = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&format!(
            r#"
            UPDATE credit_reservations
            SET status = 'released',
                updated_at = NOW()
            WHERE call_id = $1 AND status = 'active'
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(call_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error releasing reservation: {}", e);
            AppError::Database(format!("Failed to release reservation: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_call_id(&self, call_id: &str) -> AppResult<Option<CreditReservation>> {
        debug!("Finding reservation by call id: {}", call_id);

        let result = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM credit_reservations
            WHERE call_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(call_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding reservation: {}", e);
            AppError::Database(format!("Failed to find reservation: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn active_held_pence(&self, org_id: Uuid) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(reserved_pence), 0)::BIGINT
            FROM credit_reservations
            WHERE org_id = $1 AND status = 'active'
            "#,
        )
        .bind(org_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error summing active holds: {}", e);
            AppError::Database(format!("Failed to sum active holds: {}", e))
        })?;

        Ok(result.0)
    }

    #[instrument(skip(self))]
    async fn expire_due(&self, now: DateTime<Utc>) -> AppResult<u64> {
        debug!("Expiring reservations due at {}", now);

        let result = sqlx::query(
            r#"
            UPDATE credit_reservations
            SET status = 'expired',
                updated_at = NOW()
            WHERE status = 'active'
              AND expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error expiring reservations: {}", e);
            AppError::Database(format!("Failed to expire reservations: {}", e))
        })?;

        let expired = result.rows_affected();

        if expired > 0 {
            warn!("Expired {} overdue reservations", expired);
        }

        Ok(expired)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    org_id: Uuid,
    call_id: String,
    external_ref: String,
    reserved_pence: i64,
    rate_pence_per_minute: i64,
    estimated_minutes: i64,
    status: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ReservationRow> for CreditReservation {
    fn from(row: ReservationRow) -> Self {
        Self {
            id: row.id,
            org_id: row.org_id,
            call_id: row.call_id,
            external_ref: row.external_ref,
            reserved_pence: row.reserved_pence,
            rate_pence_per_minute: row.rate_pence_per_minute,
            estimated_minutes: row.estimated_minutes,
            status: PgReservationRepository::parse_status(&row.status),
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WalletSnapshotRow {
    balance_pence: i64,
    debt_limit_pence: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct CommitChargeRow {
    id: Uuid,
    balance_after: i64,
}
