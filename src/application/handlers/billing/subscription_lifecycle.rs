//! Handlers for subscription lifecycle events: created, updated, deleted.
//!
//! The updated branch is the critical one: it distinguishes a pending
//! cancellation, a reactivation, and an ordinary field sync, and guards
//! the invariants around `subscription_end`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::billing::{
    ProviderEvent, ProviderEventType, SubscriptionStatus, WebhookEventHandler, WebhookError,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    send_detached, BillingRepository, EmailMessage, EmailSender, EmailTemplate, PaymentProvider,
};

use super::sync::{fetch_authoritative, period_bounds, resolve_by_subscription, sync_record};

pub struct SubscriptionLifecycleHandler {
    repository: Arc<dyn BillingRepository>,
    provider: Arc<dyn PaymentProvider>,
    email: Arc<dyn EmailSender>,
}

impl SubscriptionLifecycleHandler {
    pub fn new(
        repository: Arc<dyn BillingRepository>,
        provider: Arc<dyn PaymentProvider>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        Self { repository, provider, email }
    }

    async fn handle_created(&self, subscription_id: &str) -> Result<(), WebhookError> {
        let subscription = fetch_authoritative(&self.provider, subscription_id).await?;
        let mut record = resolve_by_subscription(&self.repository, &subscription).await?;

        let first_activation = !record.has_held_subscription();
        sync_record(&mut record, &subscription);
        self.repository.update(&record).await?;

        tracing::info!(
            user_id = %record.user_id,
            subscription_id,
            status = %record.status,
            "Subscription created"
        );

        if first_activation && record.status == SubscriptionStatus::Active {
            send_detached(
                Arc::clone(&self.email),
                EmailMessage::new(record.email.clone(), EmailTemplate::Welcome)
                    .with_variable("plan_name", "Pro"),
            );
        }

        Ok(())
    }

    async fn handle_updated(&self, subscription_id: &str) -> Result<(), WebhookError> {
        let subscription = fetch_authoritative(&self.provider, subscription_id).await?;
        let mut record = resolve_by_subscription(&self.repository, &subscription).await?;
        let (_, period_end) = period_bounds(&subscription);

        if subscription.cancel_at_period_end {
            // Pending cancellation. The subscription id stays: access
            // runs until period end and reactivation stays possible.
            record.apply_cancellation(period_end);
            self.repository.update(&record).await?;
            tracing::info!(
                user_id = %record.user_id,
                subscription_id,
                period_end = %period_end,
                "Subscription scheduled to cancel at period end"
            );
            return Ok(());
        }

        let fetched_status = SubscriptionStatus::parse(&subscription.status);
        if record.status == SubscriptionStatus::Canceled
            && fetched_status == SubscriptionStatus::Active
        {
            // Reactivation: start is untouched and the period end must
            // not regress relative to what was already granted.
            if let Err(err) = record.apply_reactivation(period_end) {
                tracing::warn!(
                    user_id = %record.user_id,
                    subscription_id,
                    error = %err,
                    "Rejected reactivation with regressing period end"
                );
                return Err(WebhookError::Ignored(err.to_string()));
            }
            self.repository.update(&record).await?;
            tracing::info!(user_id = %record.user_id, subscription_id, "Subscription reactivated");
            return Ok(());
        }

        sync_record(&mut record, &subscription);
        self.repository.update(&record).await?;
        tracing::debug!(
            user_id = %record.user_id,
            subscription_id,
            status = %record.status,
            "Subscription fields synchronized"
        );
        Ok(())
    }

    async fn handle_deleted(&self, event: &ProviderEvent, subscription_id: &str) -> Result<(), WebhookError> {
        // The subscription no longer exists at the provider, so this is
        // the one handler that reads period data off the event payload.
        let customer_id = event
            .object_str("customer")
            .ok_or(WebhookError::MissingField("customer"))?;

        let record = self.repository.find_by_subscription_id(subscription_id).await?;
        let mut record = match record {
            Some(record) => record,
            None => {
                // Either the user already replaced the subscription or we
                // never knew it; resolve by customer to tell the cases apart.
                match self.repository.find_by_customer_id(customer_id).await? {
                    Some(record) => record,
                    None => return Err(WebhookError::UserNotFound(customer_id.to_string())),
                }
            }
        };

        let period_end = event.object_i64("current_period_end").map(Timestamp::from_unix_secs);

        if record.apply_termination(subscription_id, period_end) {
            self.repository.update(&record).await?;
            tracing::info!(
                user_id = %record.user_id,
                subscription_id,
                "Subscription terminated"
            );
        } else {
            // The record points at a different (replacement) subscription;
            // the stale deletion must not touch it.
            tracing::info!(
                user_id = %record.user_id,
                deleted_subscription_id = subscription_id,
                current_subscription_id = ?record.subscription_id,
                "Ignoring deletion of a replaced subscription"
            );
        }

        Ok(())
    }
}

#[async_trait]
impl WebhookEventHandler for SubscriptionLifecycleHandler {
    fn handles(&self) -> Vec<ProviderEventType> {
        vec![
            ProviderEventType::SubscriptionCreated,
            ProviderEventType::SubscriptionUpdated,
            ProviderEventType::SubscriptionDeleted,
        ]
    }

    async fn handle(&self, event: &ProviderEvent) -> Result<(), WebhookError> {
        let subscription_id = event.object_str("id").ok_or(WebhookError::MissingField("id"))?;

        match event.parsed_type() {
            ProviderEventType::SubscriptionCreated => self.handle_created(subscription_id).await,
            ProviderEventType::SubscriptionUpdated => self.handle_updated(subscription_id).await,
            ProviderEventType::SubscriptionDeleted => {
                self.handle_deleted(event, subscription_id).await
            }
            other => Err(WebhookError::Ignored(format!(
                "subscription handler received {}",
                other.as_str()
            ))),
        }
    }
}
