//! Asset purchase audit repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;
use vocalis_core::{
    models::{AssetPurchase, PurchaseStatus},
    traits::PurchaseRepository,
    AppError, AppResult,
};

/// PostgreSQL implementation of PurchaseRepository
pub struct PgPurchaseRepository {
    pool: PgPool,
}

impl PgPurchaseRepository {
    /// Create a new purchase repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PurchaseRepository for PgPurchaseRepository {
    #[instrument(skip(self, purchase), fields(key = %purchase.idempotency_key))]
    async fn record(&self, purchase: &AssetPurchase) -> AppResult<()> {
        debug!("Recording asset purchase {}", purchase.idempotency_key);

        // Write-once: replays leave the original attempt untouched.
        sqlx::query(
            r#"
            INSERT INTO asset_purchases
                (idempotency_key, org_id, asset_type, cost_pence, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(&purchase.idempotency_key)
        .bind(purchase.org_id)
        .bind(&purchase.asset_type)
        .bind(purchase.cost_pence)
        .bind(purchase.status.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error recording purchase: {}", e);
            AppError::Database(format!("Failed to record purchase: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_key(&self, idempotency_key: &str) -> AppResult<Option<AssetPurchase>> {
        let result = sqlx::query_as::<sqlx::Postgres, PurchaseRow>(
            r#"
            SELECT idempotency_key, org_id, asset_type, cost_pence, status, created_at
            FROM asset_purchases
            WHERE idempotency_key = $1
            "#,
        )
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding purchase: {}", e);
            AppError::Database(format!("Failed to find purchase: {}", e))
        })?;

        Ok(result.map(Into::into))
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct PurchaseRow {
    idempotency_key: String,
    org_id: Uuid,
    asset_type: String,
    cost_pence: i64,
    status: String,
    created_at: DateTime<Utc>,
}

impl From<PurchaseRow> for AssetPurchase {
    fn from(row: PurchaseRow) -> Self {
        Self {
            idempotency_key: row.idempotency_key,
            org_id: row.org_id,
            asset_type: row.asset_type,
            cost_pence: row.cost_pence,
            status: PurchaseStatus::from_str(&row.status).unwrap_or(PurchaseStatus::Completed),
            created_at: row.created_at,
        }
    }
}
