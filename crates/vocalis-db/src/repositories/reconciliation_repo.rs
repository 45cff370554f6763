//! Reconciliation run repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;
use vocalis_core::{
    models::ReconciliationRun, traits::ReconciliationRepository, AppError, AppResult,
};

/// PostgreSQL implementation of ReconciliationRepository
pub struct PgReconciliationRepository {
    pool: PgPool,
}

impl PgReconciliationRepository {
    /// Create a new reconciliation repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReconciliationRepository for PgReconciliationRepository {
    #[instrument(skip(self, run))]
    async fn insert_run(&self, run: &ReconciliationRun) -> AppResult<ReconciliationRun> {
        debug!(
            "Recording reconciliation run: checked={}, missing={}",
            run.total_checked, run.missing_found
        );

        let row = sqlx::query_as::<sqlx::Postgres, RunRow>(
            r#"
            INSERT INTO reconciliation_runs
                (id, window_start, window_end, total_checked, missing_found,
                 recovered, recovered_pence, reliability_pct)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, window_start, window_end, total_checked, missing_found,
                      recovered, recovered_pence, reliability_pct, created_at
            "#,
        )
        .bind(run.id)
        .bind(run.window_start)
        .bind(run.window_end)
        .bind(run.total_checked)
        .bind(run.missing_found)
        .bind(run.recovered)
        .bind(run.recovered_pence)
        .bind(run.reliability_pct)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error recording reconciliation run: {}", e);
            AppError::Database(format!("Failed to record reconciliation run: {}", e))
        })?;

        Ok(row.into())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    total_checked: i64,
    missing_found: i64,
    recovered: i64,
    recovered_pence: i64,
    reliability_pct: f64,
    created_at: DateTime<Utc>,
}

impl From<RunRow> for ReconciliationRun {
    fn from(row: RunRow) -> Self {
        Self {
            id: row.id,
            window_start: row.window_start,
            window_end: row.window_end,
            total_checked: row.total_checked,
            missing_found: row.missing_found,
            recovered: row.recovered,
            recovered_pence: row.recovered_pence,
            reliability_pct: row.reliability_pct,
            created_at: row.created_at,
        }
    }
}
