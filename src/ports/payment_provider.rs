//! Payment provider port.
//!
//! Contract for the external payment gateway. The reconciler uses
//! `get_subscription` to re-fetch authoritative state instead of trusting
//! period fields embedded in a possibly-delayed event payload; the
//! user-initiated actions use the mutation operations and then re-sync
//! from the returned object.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainError, ErrorCode, UserId};

/// Port for payment provider integrations.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Creates a customer in the payment system, returning its id.
    async fn create_customer(&self, user_id: &UserId, email: &str)
        -> Result<ProviderCustomer, PaymentError>;

    /// Fetches the authoritative subscription object by id.
    ///
    /// Returns `None` for ids the provider no longer knows.
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<ProviderSubscription>, PaymentError>;

    /// Schedules cancellation at period end and returns the updated
    /// subscription object.
    async fn cancel_at_period_end(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, PaymentError>;

    /// Removes a pending cancellation and returns the updated
    /// subscription object.
    async fn resume_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, PaymentError>;

    /// Creates a hosted checkout session for a new subscription.
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Creates a billing portal session for self-service management.
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError>;
}

/// Customer as known to the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCustomer {
    pub id: String,
    pub email: String,
}

/// The authoritative subscription object fetched from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSubscription {
    /// Provider's subscription id.
    pub id: String,

    /// Provider's customer id.
    pub customer_id: String,

    /// Raw provider status string ("active", "trialing", "past_due", ...).
    pub status: String,

    /// Whether the subscription is scheduled to cancel at period end.
    pub cancel_at_period_end: bool,

    /// Current billing period bounds (Unix timestamps).
    pub current_period_start: i64,
    pub current_period_end: i64,

    /// Trial bounds, when trialing (Unix timestamps).
    pub trial_start: Option<i64>,
    pub trial_end: Option<i64>,
}

/// Request to create a checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub customer_id: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Trial length for the new subscription; zero means immediate
    /// payment (the provider rejects zero-day trials as a parameter).
    pub trial_days: i64,
}

/// Hosted checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Billing portal session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalSession {
    pub id: String,
    pub url: String,
}

/// Errors from payment provider operations.
#[derive(Debug, Clone)]
pub struct PaymentError {
    pub code: PaymentErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl PaymentError {
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::ProviderError, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(PaymentErrorCode::NotFound, format!("{} not found", resource))
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for DomainError {
    fn from(err: PaymentError) -> Self {
        let code = match err.code {
            PaymentErrorCode::NotFound => ErrorCode::SubscriptionNotFound,
            PaymentErrorCode::RateLimitExceeded => ErrorCode::RateLimited,
            _ => ErrorCode::PaymentProviderError,
        };
        DomainError::new(code, err.message)
    }
}

/// Payment error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentErrorCode {
    NetworkError,
    AuthenticationError,
    NotFound,
    RateLimitExceeded,
    ProviderError,
}

impl PaymentErrorCode {
    /// Whether the operation is worth retrying at the HTTP-client level.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentErrorCode::NetworkError | PaymentErrorCode::RateLimitExceeded)
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::AuthenticationError => "authentication_error",
            PaymentErrorCode::NotFound => "not_found",
            PaymentErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentErrorCode::ProviderError => "provider_error",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_provider_is_object_safe() {
        fn _accepts_dyn(_provider: &dyn PaymentProvider) {}
    }

    #[test]
    fn network_and_rate_limit_errors_are_retryable() {
        assert!(PaymentError::network("timeout").retryable);
        assert!(PaymentErrorCode::RateLimitExceeded.is_retryable());
        assert!(!PaymentError::provider("bad request").retryable);
        assert!(!PaymentError::not_found("subscription").retryable);
    }

    #[test]
    fn payment_error_maps_to_domain_error_codes() {
        let err: DomainError = PaymentError::not_found("subscription").into();
        assert_eq!(err.code, ErrorCode::SubscriptionNotFound);

        let err: DomainError = PaymentError::network("timeout").into();
        assert_eq!(err.code, ErrorCode::PaymentProviderError);
    }
}
