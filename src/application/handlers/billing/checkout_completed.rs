//! Handler for checkout-completed events.
//!
//! Acts as a safety net: the checkout-completion event can arrive before
//! or entirely independent of the subscription-created event, so a user
//! who just paid is activated here rather than waiting on event ordering.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::billing::{
    ProviderEvent, ProviderEventType, SubscriptionStatus, WebhookEventHandler, WebhookError,
};
use crate::ports::{
    send_detached, BillingRepository, EmailMessage, EmailSender, EmailTemplate, PaymentProvider,
};

use super::sync::{fetch_authoritative, period_bounds, resolve_by_customer};

pub struct CheckoutCompletedHandler {
    repository: Arc<dyn BillingRepository>,
    provider: Arc<dyn PaymentProvider>,
    email: Arc<dyn EmailSender>,
}

impl CheckoutCompletedHandler {
    pub fn new(
        repository: Arc<dyn BillingRepository>,
        provider: Arc<dyn PaymentProvider>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        Self { repository, provider, email }
    }
}

#[async_trait]
impl WebhookEventHandler for CheckoutCompletedHandler {
    fn handles(&self) -> Vec<ProviderEventType> {
        vec![ProviderEventType::CheckoutCompleted]
    }

    async fn handle(&self, event: &ProviderEvent) -> Result<(), WebhookError> {
        let customer_id = event
            .object_str("customer")
            .ok_or(WebhookError::MissingField("customer"))?;

        // A checkout session for a one-off payment has no subscription;
        // nothing to reconcile.
        let subscription_id = match event.object_str("subscription") {
            Some(id) => id.to_string(),
            None => {
                return Err(WebhookError::Ignored(
                    "checkout session without subscription".to_string(),
                ))
            }
        };

        let mut record = resolve_by_customer(&self.repository, customer_id).await?;
        let subscription = fetch_authoritative(&self.provider, &subscription_id).await?;
        let (start, end) = period_bounds(&subscription);

        let first_activation = !record.has_held_subscription();

        // Forced active: the user just completed payment, whatever the
        // subscription object reports mid-provisioning.
        record.sync_from_provider(
            &subscription.id,
            SubscriptionStatus::Active,
            start,
            end,
            None,
        );
        self.repository.update(&record).await?;

        tracing::info!(
            user_id = %record.user_id,
            subscription_id = %subscription.id,
            "Checkout completed, subscription activated"
        );

        if first_activation {
            send_detached(
                Arc::clone(&self.email),
                EmailMessage::new(record.email.clone(), EmailTemplate::Welcome)
                    .with_variable("plan_name", "Pro"),
            );
        }

        Ok(())
    }
}
