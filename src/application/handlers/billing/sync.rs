//! Shared reconciliation helpers.
//!
//! Every handler that writes period boundaries goes through
//! `fetch_authoritative`: deliveries can be delayed and reordered, so
//! the embedded payload is only trusted for identifiers.

use std::sync::Arc;

use crate::domain::billing::{SubscriptionRecord, SubscriptionStatus, WebhookError};
use crate::domain::foundation::Timestamp;
use crate::ports::{BillingRepository, PaymentProvider, ProviderSubscription};

/// Re-fetches the authoritative subscription object from the provider.
///
/// A missing subscription is a failure here, not a no-op: the handlers
/// that call this only do so for subscriptions that are supposed to
/// exist, and the provider's redelivery will sort out eventual
/// consistency.
pub async fn fetch_authoritative(
    provider: &Arc<dyn PaymentProvider>,
    subscription_id: &str,
) -> Result<ProviderSubscription, WebhookError> {
    match provider.get_subscription(subscription_id).await {
        Ok(Some(subscription)) => Ok(subscription),
        Ok(None) => Err(WebhookError::ProviderFetchFailed(format!(
            "subscription {} not found at provider",
            subscription_id
        ))),
        Err(err) => Err(WebhookError::ProviderFetchFailed(err.to_string())),
    }
}

/// Resolves the record for a provider customer id.
pub async fn resolve_by_customer(
    repository: &Arc<dyn BillingRepository>,
    customer_id: &str,
) -> Result<SubscriptionRecord, WebhookError> {
    repository
        .find_by_customer_id(customer_id)
        .await?
        .ok_or_else(|| WebhookError::UserNotFound(customer_id.to_string()))
}

/// Resolves the record for a subscription, falling back to the customer
/// id carried by the fetched object.
pub async fn resolve_by_subscription(
    repository: &Arc<dyn BillingRepository>,
    subscription: &ProviderSubscription,
) -> Result<SubscriptionRecord, WebhookError> {
    if let Some(record) = repository.find_by_subscription_id(&subscription.id).await? {
        return Ok(record);
    }
    resolve_by_customer(repository, &subscription.customer_id).await
}

/// Period bounds of the fetched object as UTC timestamps.
pub fn period_bounds(subscription: &ProviderSubscription) -> (Timestamp, Timestamp) {
    (
        Timestamp::from_unix_secs(subscription.current_period_start),
        Timestamp::from_unix_secs(subscription.current_period_end),
    )
}

/// Trial end of the fetched object, only when it is actually trialing.
pub fn trial_end_if_trialing(subscription: &ProviderSubscription) -> Option<Timestamp> {
    if subscription.status == "trialing" {
        subscription.trial_end.map(Timestamp::from_unix_secs)
    } else {
        None
    }
}

/// Ordinary field sync from a fetched object.
pub fn sync_record(record: &mut SubscriptionRecord, subscription: &ProviderSubscription) {
    let (start, end) = period_bounds(subscription);
    record.sync_from_provider(
        &subscription.id,
        SubscriptionStatus::parse(&subscription.status),
        start,
        end,
        trial_end_if_trialing(subscription),
    );
}
