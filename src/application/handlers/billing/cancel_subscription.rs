//! User-initiated cancellation.
//!
//! Calls the provider synchronously, then re-syncs the record from the
//! provider's response rather than mutating fields locally; the provider
//! stays the single source of truth for period boundaries.

use std::sync::Arc;

use crate::domain::billing::{SubscriptionRecord, SubscriptionStatus};
use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::ports::{
    send_detached, BillingRepository, EmailMessage, EmailSender, EmailTemplate, PaymentProvider,
};

pub struct CancelSubscriptionHandler {
    repository: Arc<dyn BillingRepository>,
    provider: Arc<dyn PaymentProvider>,
    email: Arc<dyn EmailSender>,
}

impl CancelSubscriptionHandler {
    pub fn new(
        repository: Arc<dyn BillingRepository>,
        provider: Arc<dyn PaymentProvider>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        Self { repository, provider, email }
    }

    /// Schedules cancellation at period end.
    ///
    /// Precondition: the user has an active (or trialing) subscription.
    /// Violations surface as `PreconditionViolation` with a reason the
    /// frontend can show verbatim.
    pub async fn handle(&self, user_id: &UserId) -> Result<SubscriptionRecord, DomainError> {
        let mut record = self
            .repository
            .find_by_user_id(user_id)
            .await?
            .ok_or_else(|| DomainError::user_not_found(user_id))?;

        let subscription_id = match (&record.subscription_id, record.status) {
            (Some(id), SubscriptionStatus::Active | SubscriptionStatus::Trial) => id.clone(),
            (Some(_), SubscriptionStatus::Canceled) => {
                return Err(DomainError::precondition("Subscription is already canceled"))
            }
            _ => return Err(DomainError::precondition("No active subscription to cancel")),
        };

        let subscription = self.provider.cancel_at_period_end(&subscription_id).await?;
        let period_end = Timestamp::from_unix_secs(subscription.current_period_end);

        record.apply_cancellation(period_end);
        self.repository.update(&record).await?;

        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription_id,
            period_end = %period_end,
            "Subscription canceled at user request"
        );

        send_detached(
            Arc::clone(&self.email),
            EmailMessage::new(record.email.clone(), EmailTemplate::Cancelled)
                .with_variable("access_until", period_end.to_string()),
        );

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingRepository;
    use crate::adapters::stripe::{active_subscription, MockPaymentProvider};
    use crate::domain::foundation::ErrorCode;
    use async_trait::async_trait;

    struct NullEmail;

    #[async_trait]
    impl EmailSender for NullEmail {
        async fn send(&self, _message: EmailMessage) -> Result<(), DomainError> {
            Ok(())
        }
    }

    async fn setup(
        status: SubscriptionStatus,
        subscription_id: Option<&str>,
    ) -> (CancelSubscriptionHandler, Arc<InMemoryBillingRepository>, Arc<MockPaymentProvider>, UserId)
    {
        let repository = Arc::new(InMemoryBillingRepository::new());
        let provider = Arc::new(MockPaymentProvider::new());

        let mut record =
            SubscriptionRecord::at_signup(UserId::new(), "user@example.com", Timestamp::now());
        record.status = status;
        record.subscription_id = subscription_id.map(str::to_string);
        let user_id = record.user_id;
        repository.seed(record).await;

        let handler = CancelSubscriptionHandler::new(
            Arc::clone(&repository) as _,
            Arc::clone(&provider) as _,
            Arc::new(NullEmail),
        );
        (handler, repository, provider, user_id)
    }

    #[tokio::test]
    async fn cancel_active_subscription_resyncs_from_provider() {
        let (handler, repository, provider, user_id) =
            setup(SubscriptionStatus::Active, Some("sub_1")).await;
        let now = Timestamp::now().as_unix_secs();
        provider.seed_subscription(active_subscription("sub_1", "cus_1", now, now + 86_400 * 12)).await;

        let record = handler.handle(&user_id).await.unwrap();

        assert_eq!(record.status, SubscriptionStatus::Canceled);
        assert_eq!(record.subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(record.subscription_end.unwrap().as_unix_secs(), now + 86_400 * 12);

        let stored = repository.find_by_user_id(&user_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Canceled);
    }

    #[tokio::test]
    async fn cancel_without_subscription_is_a_precondition_violation() {
        let (handler, _, _, user_id) = setup(SubscriptionStatus::Trial, None).await;

        let err = handler.handle(&user_id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PreconditionViolation);
        assert!(err.message().contains("No active subscription"));
    }

    #[tokio::test]
    async fn cancel_twice_reports_already_canceled() {
        let (handler, _, provider, user_id) =
            setup(SubscriptionStatus::Active, Some("sub_1")).await;
        let now = Timestamp::now().as_unix_secs();
        provider.seed_subscription(active_subscription("sub_1", "cus_1", now, now + 100)).await;

        handler.handle(&user_id).await.unwrap();
        let err = handler.handle(&user_id).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::PreconditionViolation);
        assert!(err.message().contains("already canceled"));
    }

    #[tokio::test]
    async fn provider_failure_leaves_record_untouched() {
        let (handler, repository, provider, user_id) =
            setup(SubscriptionStatus::Active, Some("sub_1")).await;
        provider.set_fail_fetches(true);

        assert!(handler.handle(&user_id).await.is_err());

        let record = repository.find_by_user_id(&user_id).await.unwrap().unwrap();
        assert_eq!(record.status, SubscriptionStatus::Active);
    }
}
