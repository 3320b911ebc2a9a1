//! Webhook error taxonomy.
//!
//! Every failure mode of the webhook pipeline maps to an HTTP status
//! code, which in turn drives the provider's retry behavior: 2xx stops
//! delivery, 4xx stops delivery as a client error, 5xx triggers the
//! provider's own redelivery schedule.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::DomainError;

/// Errors that occur during webhook processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature verification failed. Rejected before any ledger write.
    #[error("Invalid signature")]
    SignatureInvalid,

    /// Event timestamp is outside the acceptable freshness window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Failed to parse the signature header or the JSON payload.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Required field missing from the webhook payload.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// The same event id is currently being processed by another worker.
    /// The provider should redeliver later rather than risk a double
    /// mutation.
    #[error("Event {0} is already in flight")]
    InFlight(String),

    /// Event references a customer id with no matching local user.
    /// Acknowledged to stop redelivery; never "fixed" by fabricating a
    /// user record.
    #[error("No user for provider customer {0}")]
    UserNotFound(String),

    /// Re-fetching authoritative state from the provider failed.
    #[error("Provider fetch failed: {0}")]
    ProviderFetchFailed(String),

    /// Event was intentionally ignored (not an error condition).
    #[error("Event ignored: {0}")]
    Ignored(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),
}

impl WebhookError {
    /// Returns true if the provider should retry delivering this event.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::InFlight(_)
                | WebhookError::ProviderFetchFailed(_)
                | WebhookError::Database(_)
        )
    }

    /// Maps the error to the HTTP status returned to the provider.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // Auth and malformed-request failures: never retried.
            WebhookError::SignatureInvalid | WebhookError::TimestampOutOfRange => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::ParseError(_) | WebhookError::MissingField(_) => StatusCode::BAD_REQUEST,

            // Acknowledged conditions: stop delivery.
            WebhookError::Ignored(_) => StatusCode::OK,
            WebhookError::UserNotFound(_) => StatusCode::OK,

            // Another worker holds the claim: ask for redelivery without
            // flagging a reconciliation failure.
            WebhookError::InFlight(_) => StatusCode::SERVICE_UNAVAILABLE,

            // Transient failures: provider redelivers.
            WebhookError::ProviderFetchFailed(_) | WebhookError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        WebhookError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_failures_are_rejected_without_retry() {
        let err = WebhookError::SignatureInvalid;
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let err = WebhookError::TimestampOutOfRange;
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn in_flight_duplicates_ask_for_redelivery() {
        let err = WebhookError::InFlight("evt_1".to_string());
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn unknown_user_is_acknowledged() {
        // Retrying cannot materialize a missing user; stop the storm.
        let err = WebhookError::UserNotFound("cus_404".to_string());
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::OK);
    }

    #[test]
    fn provider_fetch_failure_triggers_redelivery() {
        let err = WebhookError::ProviderFetchFailed("timeout".to_string());
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn database_failure_triggers_redelivery() {
        let err = WebhookError::Database("connection lost".to_string());
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn ignored_events_return_ok() {
        let err = WebhookError::Ignored("stale period end".to_string());
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::OK);
    }

    #[test]
    fn parse_error_is_bad_request() {
        let err = WebhookError::ParseError("bad json".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
