//! BillingRepository port - persistence for the canonical subscription
//! record.
//!
//! The record is updated via single-row transactional writes; no
//! multi-row transactions are needed anywhere in the billing pipeline.

use async_trait::async_trait;

use crate::domain::billing::SubscriptionRecord;
use crate::domain::foundation::{DomainError, UserId};

/// Port for storing and retrieving subscription records.
#[async_trait]
pub trait BillingRepository: Send + Sync {
    /// Inserts the record for a new user.
    async fn insert(&self, record: &SubscriptionRecord) -> Result<(), DomainError>;

    /// Overwrites the record's billing fields in a single-row write.
    async fn update(&self, record: &SubscriptionRecord) -> Result<(), DomainError>;

    /// Finds the record for a user.
    async fn find_by_user_id(&self, user_id: &UserId)
        -> Result<Option<SubscriptionRecord>, DomainError>;

    /// Finds the record owning a provider customer id.
    async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<SubscriptionRecord>, DomainError>;

    /// Finds the record owning a provider subscription id.
    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>, DomainError>;
}
