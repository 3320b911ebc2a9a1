//! In-memory implementation of the billing repository.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::SubscriptionRecord;
use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use crate::ports::BillingRepository;

/// Repository backed by a map keyed on user id.
pub struct InMemoryBillingRepository {
    records: RwLock<HashMap<UserId, SubscriptionRecord>>,
}

impl InMemoryBillingRepository {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Seeds a record, replacing any existing one (test setup helper).
    pub async fn seed(&self, record: SubscriptionRecord) {
        self.records.write().await.insert(record.user_id, record);
    }
}

impl Default for InMemoryBillingRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BillingRepository for InMemoryBillingRepository {
    async fn insert(&self, record: &SubscriptionRecord) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.user_id) {
            return Err(DomainError::new(
                ErrorCode::ValidationFailed,
                format!("Record already exists for user {}", record.user_id),
            ));
        }
        records.insert(record.user_id, record.clone());
        Ok(())
    }

    async fn update(&self, record: &SubscriptionRecord) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.user_id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(DomainError::user_not_found(record.user_id)),
        }
    }

    async fn find_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.provider_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }
}
