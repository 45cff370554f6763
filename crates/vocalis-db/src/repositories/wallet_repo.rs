//! Wallet repository implementation
//!
//! Every balance change goes through one CTE statement that moves the
//! wallet balance under a floor guard and writes the ledger row in the
//! same round trip. Concurrent processes serialize on the wallet row
//! inside PostgreSQL; the application never reads a balance and writes
//! it back separately.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;
use vocalis_core::{
    models::{ApplyOutcome, BalanceFloor, NewLedgerEntry, Wallet},
    traits::WalletRepository,
    AppError, AppResult,
};

use super::is_unique_violation;

/// Guard variants baked into the apply statement. `Unbounded` still runs
/// through the same CTE so credits share the one mutation path.
const APPLY_SQL_UNBOUNDED: &str = r#"
    WITH applied AS (
        UPDATE wallets
        SET balance_pence = balance_pence + $3,
            updated_at = NOW()
        WHERE org_id = $2
        RETURNING balance_pence AS balance_after
    )
    INSERT INTO ledger_transactions
        (id, org_id, amount_pence, kind, description, idempotency_key,
         balance_before, balance_after)
    SELECT $1, $2, $3, $4, $5, $6, balance_after - $3, balance_after
    FROM applied
    RETURNING id, balance_before, balance_after
"#;

const APPLY_SQL_ZERO_FLOOR: &str = r#"
    WITH applied AS (
        UPDATE wallets
        SET balance_pence = balance_pence + $3,
            updated_at = NOW()
        WHERE org_id = $2
          AND balance_pence + $3 >= 0
        RETURNING balance_pence AS balance_after
    )
    INSERT INTO ledger_transactions
        (id, org_id, amount_pence, kind, description, idempotency_key,
         balance_before, balance_after)
    SELECT $1, $2, $3, $4, $5, $6, balance_after - $3, balance_after
    FROM applied
    RETURNING id, balance_before, balance_after
"#;

const APPLY_SQL_DEBT_FLOOR: &str = r#"
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
    RETURNING id, balance_before, balance_after
"#;

/// PostgreSQL implementation of WalletRepository
pub struct PgWalletRepository {
    pool: PgPool,
}

impl PgWalletRepository {
    /// Create a new wallet repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn apply_sql(floor: BalanceFloor) -> &'static str {
        match floor {
            BalanceFloor::Unbounded => APPLY_SQL_UNBOUNDED,
            BalanceFloor::Zero => APPLY_SQL_ZERO_FLOOR,
            BalanceFloor::DebtLimit => APPLY_SQL_DEBT_FLOOR,
        }
    }
}

#[async_trait]
impl WalletRepository for PgWalletRepository {
    #[instrument(skip(self))]
    async fn find_by_org(&self, org_id: Uuid) -> AppResult<Option<Wallet>> {
        debug!("Finding wallet for org: {}", org_id);

        let result = sqlx::query_as::<sqlx::Postgres, WalletRow>(
            r#"
            SELECT org_id, balance_pence, debt_limit_pence,
                   auto_recharge_enabled, payment_method_ref,
                   created_at, updated_at
            FROM wallets
            WHERE org_id = $1
            "#,
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding wallet {}: {}", org_id, e);
            AppError::Database(format!("Failed to find wallet: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self, wallet))]
    async fn create(&self, wallet: &Wallet) -> AppResult<Wallet> {
        debug!("Creating wallet for org: {}", wallet.org_id);

        let row = sqlx::query_as::<sqlx::Postgres, WalletRow>(
            r#"
            INSERT INTO wallets
                (org_id, balance_pence, debt_limit_pence,
                 auto_recharge_enabled, payment_method_ref)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING org_id, balance_pence, debt_limit_pence,
                      auto_recharge_enabled, payment_method_ref,
                      created_at, updated_at
            "#,
        )
        .bind(wallet.org_id)
        .bind(wallet.balance_pence)
        .bind(wallet.debt_limit_pence)
        .bind(wallet.auto_recharge_enabled)
        .bind(&wallet.payment_method_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating wallet: {}", e);
            AppError::Database(format!("Failed to create wallet: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entry), fields(org_id = %entry.org_id, key = %entry.idempotency_key))]
    async fn apply_entry(
        &self,
        entry: &NewLedgerEntry,
        floor: BalanceFloor,
    ) -> AppResult<ApplyOutcome> {
        debug!(
            "Applying ledger entry {} for {} pence",
            entry.idempotency_key, entry.amount_pence
        );

        let result = sqlx::query_as::<sqlx::Postgres, AppliedRow>(Self::apply_sql(floor))
            .bind(entry.id)
            .bind(entry.org_id)
            .bind(entry.amount_pence)
            .bind(entry.kind.to_string())
            .bind(&entry.description)
            .bind(&entry.idempotency_key)
            .fetch_optional(&self.pool)
            .await;

        match result {
            Ok(Some(row)) => Ok(ApplyOutcome::Applied {
                transaction_id: row.id,
                balance_before: row.balance_before,
                balance_after: row.balance_after,
            }),
            Ok(None) => {
                // The guard refused the update, or there is no wallet at all.
                let wallet = self.find_by_org(entry.org_id).await?;
                match wallet {
                    Some(w) => {
                        warn!(
                            "Floor guard rejected entry {}: balance={}, amount={}",
                            entry.idempotency_key, w.balance_pence, entry.amount_pence
                        );
                        Ok(ApplyOutcome::FloorBreached {
                            balance_pence: w.balance_pence,
                            debt_limit_pence: w.debt_limit_pence,
                        })
                    }
                    None => Ok(ApplyOutcome::WalletMissing),
                }
            }
            Err(e) if is_unique_violation(&e) => {
                debug!("Idempotent replay of ledger entry {}", entry.idempotency_key);
                Ok(ApplyOutcome::Duplicate)
            }
            Err(e) => {
                error!("Database error applying ledger entry: {}", e);
                Err(AppError::Database(format!(
                    "Failed to apply ledger entry: {}",
                    e
                )))
            }
        }
    }
}

/// Helper struct for wallet row mapping
#[derive(Debug, sqlx::FromRow)]
struct WalletRow {
    org_id: Uuid,
    balance_pence: i64,
    debt_limit_pence: i64,
    auto_recharge_enabled: bool,
    payment_method_ref: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Self {
            org_id: row.org_id,
            balance_pence: row.balance_pence,
            debt_limit_pence: row.debt_limit_pence,
            auto_recharge_enabled: row.auto_recharge_enabled,
            payment_method_ref: row.payment_method_ref,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AppliedRow {
    id: Uuid,
    balance_before: i64,
    balance_after: i64,
}
