//! Axum router configuration for the billing module.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{
    cancel_subscription, create_checkout, get_access_decision, get_subscription_status,
    handle_provider_webhook, health, reactivate_subscription, BillingAppState,
};

/// Billing API routes.
///
/// ## Webhook (no auth, signature verified)
/// - `POST /webhooks/stripe`
///
/// ## Internal API (fronted by the application's own authorization)
/// - `GET  /access/:user_id` - access decision for request middleware
/// - `GET  /status/:user_id` - full subscription status
/// - `POST /cancel/:user_id`
/// - `POST /reactivate/:user_id`
/// - `POST /checkout/:user_id`
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .route("/webhooks/stripe", post(handle_provider_webhook))
        .route("/access/:user_id", get(get_access_decision))
        .route("/status/:user_id", get(get_subscription_status))
        .route("/cancel/:user_id", post(cancel_subscription))
        .route("/reactivate/:user_id", post(reactivate_subscription))
        .route("/checkout/:user_id", post(create_checkout))
        .route("/health", get(health))
}
