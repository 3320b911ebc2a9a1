//! User-initiated checkout: provider customer creation plus a hosted
//! checkout session.
//!
//! The new subscription's trial length equals the user's remaining
//! app-side trial days at this moment. Trial credit is only granted to
//! records that have never held a subscription: a re-checkout after a
//! prior cancellation pays immediately, otherwise serial cancel/checkout
//! would be a free-usage loop.

use std::sync::Arc;

use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::ports::{BillingRepository, CheckoutRequest, CheckoutSession, PaymentProvider};

/// Redirect targets for the hosted checkout page.
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

pub struct CreateCheckoutHandler {
    repository: Arc<dyn BillingRepository>,
    provider: Arc<dyn PaymentProvider>,
}

impl CreateCheckoutHandler {
    pub fn new(repository: Arc<dyn BillingRepository>, provider: Arc<dyn PaymentProvider>) -> Self {
        Self { repository, provider }
    }

    pub async fn handle(
        &self,
        user_id: &UserId,
        urls: CheckoutUrls,
    ) -> Result<CheckoutSession, DomainError> {
        let mut record = self
            .repository
            .find_by_user_id(user_id)
            .await?
            .ok_or_else(|| DomainError::user_not_found(user_id))?;

        // Lazily create the provider customer on first checkout.
        let customer_id = match &record.provider_customer_id {
            Some(id) => id.clone(),
            None => {
                let customer = self.provider.create_customer(user_id, &record.email).await?;
                record.provider_customer_id = Some(customer.id.clone());
                self.repository.update(&record).await?;
                customer.id
            }
        };

        let trial_days = if record.has_held_subscription() {
            0
        } else {
            record.remaining_trial_days(Timestamp::now())
        };

        let session = self
            .provider
            .create_checkout_session(CheckoutRequest {
                customer_id: customer_id.clone(),
                success_url: urls.success_url,
                cancel_url: urls.cancel_url,
                trial_days,
            })
            .await?;

        tracing::info!(
            user_id = %user_id,
            provider_customer_id = %customer_id,
            trial_days,
            session_id = %session.id,
            "Checkout session created"
        );

        Ok(session)
    }
}
