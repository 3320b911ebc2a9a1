//! Handlers for invoice events.
//!
//! Payment success reconfirms the subscription from freshly fetched
//! state; payment failure is a soft downgrade to past_due that destroys
//! nothing, because the provider keeps retrying the charge on its own.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::billing::{
    ProviderEvent, ProviderEventType, SubscriptionStatus, WebhookEventHandler, WebhookError,
};
use crate::ports::{BillingRepository, PaymentProvider};

use super::sync::{fetch_authoritative, period_bounds, resolve_by_customer, resolve_by_subscription};

pub struct InvoiceEventsHandler {
    repository: Arc<dyn BillingRepository>,
    provider: Arc<dyn PaymentProvider>,
}

impl InvoiceEventsHandler {
    pub fn new(repository: Arc<dyn BillingRepository>, provider: Arc<dyn PaymentProvider>) -> Self {
        Self { repository, provider }
    }

    /// Subscription id carried by the invoice, if any. Standalone
    /// invoices (one-off charges) have none and are not our concern.
    fn invoice_subscription_id(event: &ProviderEvent) -> Option<String> {
        event.object_str("subscription").map(str::to_string)
    }

    async fn handle_payment_succeeded(&self, event: &ProviderEvent) -> Result<(), WebhookError> {
        let subscription_id = match Self::invoice_subscription_id(event) {
            Some(id) => id,
            None => {
                return Err(WebhookError::Ignored(
                    "invoice without subscription".to_string(),
                ))
            }
        };

        let subscription = fetch_authoritative(&self.provider, &subscription_id).await?;
        let mut record = resolve_by_subscription(&self.repository, &subscription).await?;
        let (start, end) = period_bounds(&subscription);

        // A paid invoice means the subscription is good, whatever status
        // the race between this event and a lifecycle event left behind.
        record.sync_from_provider(&subscription.id, SubscriptionStatus::Active, start, end, None);
        self.repository.update(&record).await?;

        tracing::info!(
            user_id = %record.user_id,
            subscription_id = %subscription.id,
            period_end = %end,
            "Invoice paid, subscription confirmed active"
        );
        Ok(())
    }

    async fn handle_payment_failed(&self, event: &ProviderEvent) -> Result<(), WebhookError> {
        let customer_id = event
            .object_str("customer")
            .ok_or(WebhookError::MissingField("customer"))?;

        let mut record = resolve_by_customer(&self.repository, customer_id).await?;
        record.mark_past_due();
        self.repository.update(&record).await?;

        tracing::warn!(
            user_id = %record.user_id,
            provider_customer_id = customer_id,
            "Invoice payment failed, subscription past due"
        );
        Ok(())
    }

    /// Finalized invoices carry no state change of their own; they only
    /// confirm that a trialing/active record still mirrors the provider.
    async fn handle_finalized(&self, event: &ProviderEvent) -> Result<(), WebhookError> {
        let subscription_id = match Self::invoice_subscription_id(event) {
            Some(id) => id,
            None => {
                return Err(WebhookError::Ignored(
                    "invoice without subscription".to_string(),
                ))
            }
        };

        let subscription = fetch_authoritative(&self.provider, &subscription_id).await?;
        let mut record = resolve_by_subscription(&self.repository, &subscription).await?;

        if !matches!(record.status, SubscriptionStatus::Trial | SubscriptionStatus::Active) {
            return Err(WebhookError::Ignored(format!(
                "invoice finalized for {} record",
                record.status
            )));
        }

        let fetched_status = SubscriptionStatus::parse(&subscription.status);
        if record.status != fetched_status {
            tracing::info!(
                user_id = %record.user_id,
                stored = %record.status,
                fetched = %fetched_status,
                "Status drift detected on invoice finalization"
            );
            record.status = fetched_status;
            self.repository.update(&record).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl WebhookEventHandler for InvoiceEventsHandler {
    fn handles(&self) -> Vec<ProviderEventType> {
        vec![
            ProviderEventType::InvoicePaymentSucceeded,
            ProviderEventType::InvoicePaymentFailed,
            ProviderEventType::InvoiceFinalized,
            ProviderEventType::InvoicePaid,
        ]
    }

    async fn handle(&self, event: &ProviderEvent) -> Result<(), WebhookError> {
        match event.parsed_type() {
            // invoice.paid and invoice.payment_succeeded both certify
            // payment; they share one code path.
            ProviderEventType::InvoicePaymentSucceeded | ProviderEventType::InvoicePaid => {
                self.handle_payment_succeeded(event).await
            }
            ProviderEventType::InvoicePaymentFailed => self.handle_payment_failed(event).await,
            ProviderEventType::InvoiceFinalized => self.handle_finalized(event).await,
            other => Err(WebhookError::Ignored(format!(
                "invoice handler received {}",
                other.as_str()
            ))),
        }
    }
}
