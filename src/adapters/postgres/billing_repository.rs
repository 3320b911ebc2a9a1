//! PostgreSQL implementation of BillingRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{SubscriptionRecord, SubscriptionStatus};
use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::ports::BillingRepository;

/// Repository over the `subscription_records` table, one row per user.
pub struct PostgresBillingRepository {
    pool: PgPool,
}

impl PostgresBillingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a subscription record.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    user_id: Uuid,
    email: String,
    status: String,
    subscription_id: Option<String>,
    subscription_start: Option<DateTime<Utc>>,
    subscription_end: Option<DateTime<Utc>>,
    trial_start: Option<DateTime<Utc>>,
    trial_end: Option<DateTime<Utc>>,
    provider_customer_id: Option<String>,
    is_admin: bool,
}

impl From<SubscriptionRow> for SubscriptionRecord {
    fn from(row: SubscriptionRow) -> Self {
        SubscriptionRecord {
            user_id: UserId::from_uuid(row.user_id),
            email: row.email,
            status: SubscriptionStatus::parse(&row.status),
            subscription_id: row.subscription_id,
            subscription_start: row.subscription_start.map(Timestamp::from_datetime),
            subscription_end: row.subscription_end.map(Timestamp::from_datetime),
            trial_start: row.trial_start.map(Timestamp::from_datetime),
            trial_end: row.trial_end.map(Timestamp::from_datetime),
            provider_customer_id: row.provider_customer_id,
            is_admin: row.is_admin,
        }
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT user_id, email, status, subscription_id,
           subscription_start, subscription_end,
           trial_start, trial_end,
           provider_customer_id, is_admin
    FROM subscription_records
"#;

impl PostgresBillingRepository {
    async fn find_one(
        &self,
        filter: &str,
        bind: &str,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        let query = format!("{} WHERE {}", SELECT_COLUMNS, filter);
        let row: Option<SubscriptionRow> = sqlx::query_as(&query)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to load record: {}", e)))?;
        Ok(row.map(SubscriptionRecord::from))
    }
}

#[async_trait]
impl BillingRepository for PostgresBillingRepository {
    async fn insert(&self, record: &SubscriptionRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscription_records (
                user_id, email, status, subscription_id,
                subscription_start, subscription_end,
                trial_start, trial_end,
                provider_customer_id, is_admin,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
            "#,
        )
        .bind(record.user_id.as_uuid())
        .bind(&record.email)
        .bind(record.status.as_str())
        .bind(&record.subscription_id)
        .bind(record.subscription_start.as_ref().map(Timestamp::as_datetime))
        .bind(record.subscription_end.as_ref().map(Timestamp::as_datetime))
        .bind(record.trial_start.as_ref().map(Timestamp::as_datetime))
        .bind(record.trial_end.as_ref().map(Timestamp::as_datetime))
        .bind(&record.provider_customer_id)
        .bind(record.is_admin)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to insert record: {}", e)))?;

        Ok(())
    }

    async fn update(&self, record: &SubscriptionRecord) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscription_records SET
                email = $2,
                status = $3,
                subscription_id = $4,
                subscription_start = $5,
                subscription_end = $6,
                trial_start = $7,
                trial_end = $8,
                provider_customer_id = $9,
                is_admin = $10,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(record.user_id.as_uuid())
        .bind(&record.email)
        .bind(record.status.as_str())
        .bind(&record.subscription_id)
        .bind(record.subscription_start.as_ref().map(Timestamp::as_datetime))
        .bind(record.subscription_end.as_ref().map(Timestamp::as_datetime))
        .bind(record.trial_start.as_ref().map(Timestamp::as_datetime))
        .bind(record.trial_end.as_ref().map(Timestamp::as_datetime))
        .bind(&record.provider_customer_id)
        .bind(record.is_admin)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to update record: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::user_not_found(record.user_id));
        }
        Ok(())
    }

    async fn find_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        let query = format!("{} WHERE user_id = $1", SELECT_COLUMNS);
        let row: Option<SubscriptionRow> = sqlx::query_as(&query)
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to load record: {}", e)))?;
        Ok(row.map(SubscriptionRecord::from))
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        self.find_one("provider_customer_id = $1", customer_id).await
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        self.find_one("subscription_id = $1", subscription_id).await
    }
}
