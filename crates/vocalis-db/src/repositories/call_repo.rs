//! Call record repository implementation
//!
//! Inserts are idempotent on the provider's external ref so a webhook
//! retry and a reconciliation recovery of the same call collapse into
//! one row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::{debug, error, instrument};
use uuid::Uuid;
use vocalis_core::{
    models::{CallRecord, NewCallRecord},
    traits::CallRepository,
    AppError, AppResult,
};

const CALL_COLUMNS: &str = r#"
    id, org_id, external_ref, duration_seconds, cost_pence, reconciled, created_at
"#;

/// PostgreSQL implementation of CallRepository
pub struct PgCallRepository {
    pool: PgPool,
}

impl PgCallRepository {
    /// Create a new call repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallRepository for PgCallRepository {
    #[instrument(skip(self, call), fields(external_ref = %call.external_ref))]
    async fn record(&self, call: &NewCallRecord) -> AppResult<CallRecord> {
        debug!("Recording call {}", call.external_ref);

        let inserted = sqlx::query_as::<sqlx::Postgres, CallRow>(&format!(
            r#"
            INSERT INTO calls
                (id, org_id, external_ref, duration_seconds, cost_pence, reconciled)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (external_ref) DO NOTHING
            RETURNING {CALL_COLUMNS}
            "#
        ))
        .bind(call.id)
        .bind(call.org_id)
        .bind(&call.external_ref)
        .bind(call.duration_seconds)
        .bind(call.cost_pence)
        .bind(call.reconciled)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error recording call: {}", e);
            AppError::Database(format!("Failed to record call: {}", e))
        })?;

        if let Some(row) = inserted {
            return Ok(row.into());
        }

        // Replay: return the row that beat us to the insert.
        let existing = sqlx::query_as::<sqlx::Postgres, CallRow>(&format!(
            r#"
            SELECT {CALL_COLUMNS}
            FROM calls
            WHERE external_ref = $1
            "#
        ))
        .bind(&call.external_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error fetching existing call: {}", e);
            AppError::Database(format!("Failed to fetch existing call: {}", e))
        })?;

        Ok(existing.into())
    }

    #[instrument(skip(self))]
    async fn external_refs_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<HashSet<String>> {
        debug!("Listing call refs between {} and {}", start, end);

        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT external_ref
            FROM calls
            WHERE created_at >= $1 AND created_at <= $2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing call refs: {}", e);
            AppError::Database(format!("Failed to list call refs: {}", e))
        })?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CallRow {
    id: Uuid,
    org_id: Uuid,
    external_ref: String,
    duration_seconds: i64,
    cost_pence: i64,
    reconciled: bool,
    created_at: DateTime<Utc>,
}

impl From<CallRow> for CallRecord {
    fn from(row: CallRow) -> Self {
        Self {
            id: row.id,
            org_id: row.org_id,
            external_ref: row.external_ref,
            duration_seconds: row.duration_seconds,
            cost_pence: row.cost_pence,
            reconciled: row.reconciled,
            created_at: row.created_at,
        }
    }
}
