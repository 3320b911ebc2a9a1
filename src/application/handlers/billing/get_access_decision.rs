//! The access gate: the read API the rest of the application calls to
//! authorize feature use.
//!
//! No caching across requests: the record may have changed via a webhook
//! a moment ago, and a stale grant is a revenue leak while a stale denial
//! locks out a paying user.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::billing::SubscriptionState;
use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::ports::BillingRepository;

/// Decision returned to request-authorization middleware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub can_access: bool,
    pub reason: String,
    pub days_remaining: Option<i64>,
}

pub struct GetAccessDecisionHandler {
    repository: Arc<dyn BillingRepository>,
}

impl GetAccessDecisionHandler {
    pub fn new(repository: Arc<dyn BillingRepository>) -> Self {
        Self { repository }
    }

    /// Reads the latest committed record and runs the calculator.
    pub async fn handle(&self, user_id: &UserId) -> Result<AccessDecision, DomainError> {
        let record = self
            .repository
            .find_by_user_id(user_id)
            .await?
            .ok_or_else(|| DomainError::user_not_found(user_id))?;

        let state = SubscriptionState::calculate(&record, Timestamp::now());

        tracing::debug!(
            user_id = %user_id,
            status = %state.status,
            can_access = state.can_access_app,
            reason = state.reason(),
            "Access decision"
        );

        Ok(AccessDecision {
            can_access: state.can_access_app,
            reason: state.reason().to_string(),
            days_remaining: state.days_remaining,
        })
    }

    /// Full derived state, for the status endpoint.
    pub async fn state(&self, user_id: &UserId) -> Result<SubscriptionState, DomainError> {
        let record = self
            .repository
            .find_by_user_id(user_id)
            .await?
            .ok_or_else(|| DomainError::user_not_found(user_id))?;
        Ok(SubscriptionState::calculate(&record, Timestamp::now()))
    }
}
