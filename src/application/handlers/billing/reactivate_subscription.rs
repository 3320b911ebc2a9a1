//! User-initiated reactivation of a canceled subscription.
//!
//! Only possible while the grace period lasts: once `subscription_end`
//! passes, the subscription is gone at the provider too and the user must
//! purchase again.

use std::sync::Arc;

use crate::domain::billing::{SubscriptionRecord, SubscriptionStatus};
use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::ports::{
    send_detached, BillingRepository, EmailMessage, EmailSender, EmailTemplate, PaymentProvider,
};

pub struct ReactivateSubscriptionHandler {
    repository: Arc<dyn BillingRepository>,
    provider: Arc<dyn PaymentProvider>,
    email: Arc<dyn EmailSender>,
}

impl ReactivateSubscriptionHandler {
    pub fn new(
        repository: Arc<dyn BillingRepository>,
        provider: Arc<dyn PaymentProvider>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        Self { repository, provider, email }
    }

    /// Removes the pending cancellation.
    ///
    /// Preconditions: status is canceled, the period end is still in the
    /// future, and the subscription id is still on file.
    pub async fn handle(&self, user_id: &UserId) -> Result<SubscriptionRecord, DomainError> {
        let mut record = self
            .repository
            .find_by_user_id(user_id)
            .await?
            .ok_or_else(|| DomainError::user_not_found(user_id))?;

        if record.status != SubscriptionStatus::Canceled {
            return Err(DomainError::precondition(
                "Subscription is not canceled; nothing to reactivate",
            ));
        }

        let now = Timestamp::now();
        match record.subscription_end {
            Some(end) if end.is_after(&now) => {}
            _ => {
                return Err(DomainError::precondition(
                    "Subscription has already expired; a new purchase is required",
                ))
            }
        }

        let subscription_id = record.subscription_id.clone().ok_or_else(|| {
            DomainError::precondition("No subscription on file; a new purchase is required")
        })?;

        let subscription = self.provider.resume_subscription(&subscription_id).await?;
        let period_end = Timestamp::from_unix_secs(subscription.current_period_end);

        record
            .apply_reactivation(period_end)
            .map_err(|err| DomainError::new(
                crate::domain::foundation::ErrorCode::InvalidStateTransition,
                err.to_string(),
            ))?;
        self.repository.update(&record).await?;

        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription_id,
            period_end = %period_end,
            "Subscription reactivated at user request"
        );

        send_detached(
            Arc::clone(&self.email),
            EmailMessage::new(record.email.clone(), EmailTemplate::Reactivated)
                .with_variable("renews_at", period_end.to_string()),
        );

        Ok(record)
    }
}
