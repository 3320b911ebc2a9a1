//! Request/response DTOs for the billing API.

use serde::{Deserialize, Serialize};

use crate::application::handlers::billing::AccessDecision;
use crate::domain::billing::SubscriptionState;
use crate::domain::foundation::Timestamp;

/// Response body for the access gate endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessDecisionResponse {
    pub can_access: bool,
    pub reason: String,
    pub days_remaining: Option<i64>,
}

impl From<AccessDecision> for AccessDecisionResponse {
    fn from(decision: AccessDecision) -> Self {
        Self {
            can_access: decision.can_access,
            reason: decision.reason,
            days_remaining: decision.days_remaining,
        }
    }
}

/// Response body for the subscription status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionStatusResponse {
    pub subscription_status: String,
    pub trial_start: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,
    pub subscription_start: Option<Timestamp>,
    pub subscription_end: Option<Timestamp>,
    pub days_remaining: Option<i64>,
    pub is_expired: bool,
    pub can_access_app: bool,
    pub should_redirect_to_pricing: bool,
    pub reactivation_available: bool,
}

impl From<SubscriptionState> for SubscriptionStatusResponse {
    fn from(state: SubscriptionState) -> Self {
        Self {
            subscription_status: state.status.as_str().to_string(),
            trial_start: state.trial_start,
            trial_end: state.trial_end,
            subscription_start: state.subscription_start,
            subscription_end: state.subscription_end,
            days_remaining: state.days_remaining,
            is_expired: state.is_expired,
            can_access_app: state.can_access_app,
            should_redirect_to_pricing: state.should_redirect_to_pricing,
            reactivation_available: state.reactivation_available,
        }
    }
}

/// Request body for checkout session creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequestBody {
    pub success_url: String,
    pub cancel_url: String,
}

/// Response body for checkout session creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
}

/// Uniform error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
