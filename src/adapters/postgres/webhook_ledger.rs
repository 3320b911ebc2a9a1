//! PostgreSQL implementation of the webhook idempotency ledger.
//!
//! The unique constraint on `event_id` is the only cross-worker
//! coordination primitive in the whole pipeline. The claim is a two-step
//! dance that stays race-safe because both steps are atomic on their own:
//!
//! 1. `INSERT ... ON CONFLICT DO NOTHING` - wins for fresh event ids.
//! 2. A guarded `UPDATE` that re-claims only failed rows or processing
//!    rows older than the staleness threshold - wins for retries.
//!
//! Anything left over is either terminal success or a live claim held by
//! another worker.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::foundation::DomainError;
use crate::ports::{ClaimOutcome, LedgerEntry, LedgerStatus, WebhookLedger};

pub struct PostgresWebhookLedger {
    pool: PgPool,
}

impl PostgresWebhookLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    event_id: String,
    event_type: String,
    status: String,
    received_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    retry_count: i32,
    error_message: Option<String>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = DomainError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let status = LedgerStatus::parse(&row.status).ok_or_else(|| {
            DomainError::database(format!("Invalid ledger status: {}", row.status))
        })?;
        Ok(LedgerEntry {
            event_id: row.event_id,
            event_type: row.event_type,
            status,
            received_at: row.received_at,
            processed_at: row.processed_at,
            retry_count: row.retry_count,
            error_message: row.error_message,
        })
    }
}

#[async_trait]
impl WebhookLedger for PostgresWebhookLedger {
    async fn claim_or_get_status(
        &self,
        event_id: &str,
        event_type: &str,
        stale_after: Duration,
    ) -> Result<ClaimOutcome, DomainError> {
        // Step 1: try to be the first sighting of this event id.
        let inserted = sqlx::query(
            r#"
            INSERT INTO webhook_events (event_id, event_type, status, received_at, retry_count)
            VALUES ($1, $2, 'processing', NOW(), 0)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to claim event: {}", e)))?;

        if inserted.rows_affected() == 1 {
            return Ok(ClaimOutcome::Claimed);
        }

        // Step 2: re-claim failed rows and abandoned processing rows.
        let stale_secs = stale_after.as_secs() as i64;
        let reclaimed = sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = 'processing', received_at = NOW()
            WHERE event_id = $1
              AND (status = 'failed'
                   OR (status = 'processing'
                       AND received_at < NOW() - make_interval(secs => $2)))
            "#,
        )
        .bind(event_id)
        .bind(stale_secs as f64)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to re-claim event: {}", e)))?;

        if reclaimed.rows_affected() == 1 {
            return Ok(ClaimOutcome::Claimed);
        }

        // Step 3: read the row that beat us.
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM webhook_events WHERE event_id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(format!("Failed to read event status: {}", e)))?;

        match status.as_deref() {
            Some("succeeded") => Ok(ClaimOutcome::AlreadySucceeded),
            Some(_) => Ok(ClaimOutcome::InFlight),
            // The row vanished between steps (retention job); take it.
            None => {
                if self.claim_fresh(event_id, event_type).await? {
                    Ok(ClaimOutcome::Claimed)
                } else {
                    Ok(ClaimOutcome::InFlight)
                }
            }
        }
    }

    async fn mark_succeeded(&self, event_id: &str) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = 'succeeded', processed_at = NOW(), error_message = NULL
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to mark succeeded: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::database(format!(
                "No ledger row to mark succeeded: {}",
                event_id
            )));
        }
        Ok(())
    }

    async fn mark_failed(&self, event_id: &str, error: &str) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = 'failed',
                processed_at = NOW(),
                retry_count = retry_count + 1,
                error_message = $2
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to mark failed: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::database(format!(
                "No ledger row to mark failed: {}",
                event_id
            )));
        }
        Ok(())
    }

    async fn find(&self, event_id: &str) -> Result<Option<LedgerEntry>, DomainError> {
        let row: Option<LedgerRow> = sqlx::query_as(
            r#"
            SELECT event_id, event_type, status, received_at, processed_at,
                   retry_count, error_message
            FROM webhook_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to load ledger row: {}", e)))?;

        row.map(LedgerEntry::try_from).transpose()
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM webhook_events WHERE received_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to apply retention: {}", e)))?;
        Ok(result.rows_affected())
    }
}

impl PostgresWebhookLedger {
    async fn claim_fresh(&self, event_id: &str, event_type: &str) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (event_id, event_type, status, received_at, retry_count)
            VALUES ($1, $2, 'processing', NOW(), 0)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to claim event: {}", e)))?;
        Ok(result.rows_affected() == 1)
    }
}
