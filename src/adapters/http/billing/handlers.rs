//! Axum handlers for the billing API.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};

use crate::application::handlers::billing::{
    CancelSubscriptionHandler, CheckoutUrls, CreateCheckoutHandler, GetAccessDecisionHandler,
    ReactivateSubscriptionHandler, WebhookService,
};
use crate::domain::billing::ProcessOutcome;
use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use crate::ports::{RateLimitDecision, RateLimiter};

use super::dto::{
    AccessDecisionResponse, CheckoutRequestBody, CheckoutResponse, ErrorResponse,
    SubscriptionStatusResponse,
};

/// Shared state for the billing routes.
#[derive(Clone)]
pub struct BillingAppState {
    pub webhook_service: Arc<WebhookService>,
    pub access: Arc<GetAccessDecisionHandler>,
    pub cancel: Arc<CancelSubscriptionHandler>,
    pub reactivate: Arc<ReactivateSubscriptionHandler>,
    pub checkout: Arc<CreateCheckoutHandler>,
    pub rate_limiter: Arc<dyn RateLimiter>,
}

/// POST /webhooks/stripe
///
/// The raw body must be read before any JSON parsing: the signature is
/// computed over the exact bytes the provider sent.
pub async fn handle_provider_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = match headers.get("stripe-signature").and_then(|v| v.to_str().ok()) {
        Some(signature) => signature,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("missing_signature", "Signature header is required")),
            )
                .into_response()
        }
    };

    match state.webhook_service.handle(&body, signature).await {
        Ok(ProcessOutcome::Processed) => {
            (StatusCode::OK, Json(serde_json::json!({"status": "processed"}))).into_response()
        }
        Ok(ProcessOutcome::Duplicate) => {
            (StatusCode::OK, Json(serde_json::json!({"status": "duplicate"}))).into_response()
        }
        Ok(ProcessOutcome::Ignored(reason)) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "ignored", "reason": reason})),
        )
            .into_response(),
        Err(err) => {
            let status = err.status_code();
            if status.is_server_error() {
                tracing::error!(error = %err, "Webhook processing failed; provider will redeliver");
            } else {
                tracing::warn!(error = %err, "Webhook rejected");
            }
            (status, Json(ErrorResponse::new("webhook_error", err.to_string()))).into_response()
        }
    }
}

/// GET /access/:user_id
pub async fn get_access_decision(
    State(state): State<BillingAppState>,
    Path(user_id): Path<String>,
) -> Response {
    let user_id = match parse_user_id(&user_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.access.handle(&user_id).await {
        Ok(decision) => (StatusCode::OK, Json(AccessDecisionResponse::from(decision))).into_response(),
        Err(err) => domain_error_response(err),
    }
}

/// GET /status/:user_id
pub async fn get_subscription_status(
    State(state): State<BillingAppState>,
    Path(user_id): Path<String>,
) -> Response {
    let user_id = match parse_user_id(&user_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.access.state(&user_id).await {
        Ok(subscription_state) => {
            (StatusCode::OK, Json(SubscriptionStatusResponse::from(subscription_state)))
                .into_response()
        }
        Err(err) => domain_error_response(err),
    }
}

/// POST /cancel/:user_id
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    Path(user_id): Path<String>,
) -> Response {
    let user_id = match parse_user_id(&user_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    if let Some(response) = check_rate_limit(&state, &user_id).await {
        return response;
    }

    match state.cancel.handle(&user_id).await {
        Ok(record) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "canceled",
                "access_until": record.subscription_end,
            })),
        )
            .into_response(),
        Err(err) => domain_error_response(err),
    }
}

/// POST /reactivate/:user_id
pub async fn reactivate_subscription(
    State(state): State<BillingAppState>,
    Path(user_id): Path<String>,
) -> Response {
    let user_id = match parse_user_id(&user_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    if let Some(response) = check_rate_limit(&state, &user_id).await {
        return response;
    }

    match state.reactivate.handle(&user_id).await {
        Ok(record) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "active",
                "renews_at": record.subscription_end,
            })),
        )
            .into_response(),
        Err(err) => domain_error_response(err),
    }
}

/// POST /checkout/:user_id
pub async fn create_checkout(
    State(state): State<BillingAppState>,
    Path(user_id): Path<String>,
    Json(body): Json<CheckoutRequestBody>,
) -> Response {
    let user_id = match parse_user_id(&user_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    if let Some(response) = check_rate_limit(&state, &user_id).await {
        return response;
    }

    let urls = CheckoutUrls {
        success_url: body.success_url,
        cancel_url: body.cancel_url,
    };
    match state.checkout.handle(&user_id, urls).await {
        Ok(session) => {
            (StatusCode::OK, Json(CheckoutResponse { checkout_url: session.url })).into_response()
        }
        Err(err) => domain_error_response(err),
    }
}

/// GET /health
pub async fn health() -> Response {
    (StatusCode::OK, Json(serde_json::json!({"status": "healthy"}))).into_response()
}

fn parse_user_id(raw: &str) -> Result<UserId, Response> {
    raw.parse::<UserId>().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("invalid_user_id", "User id must be a UUID")),
        )
            .into_response()
    })
}

async fn check_rate_limit(state: &BillingAppState, user_id: &UserId) -> Option<Response> {
    let key = format!("billing:{}", user_id);
    match state.rate_limiter.check(&key).await {
        Ok(RateLimitDecision::Allowed { .. }) => None,
        Ok(RateLimitDecision::Denied { retry_after_secs }) => Some(
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "rate_limited",
                    "retry_after": retry_after_secs,
                })),
            )
                .into_response(),
        ),
        Err(err) => {
            // Fail open: the limiter protects the provider API, it must
            // not take billing actions down with it.
            tracing::warn!(error = %err, "Rate limiter unavailable");
            None
        }
    }
}

fn domain_error_response(err: DomainError) -> Response {
    let status = match err.code {
        ErrorCode::UserNotFound | ErrorCode::SubscriptionNotFound => StatusCode::NOT_FOUND,
        ErrorCode::PreconditionViolation => StatusCode::CONFLICT,
        ErrorCode::ValidationFailed | ErrorCode::InvalidFormat => StatusCode::BAD_REQUEST,
        ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::InvalidStateTransition => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(code = %err.code, error = %err, "Billing request failed");
    }

    (status, Json(ErrorResponse::new(err.code.to_string(), err.message))).into_response()
}
