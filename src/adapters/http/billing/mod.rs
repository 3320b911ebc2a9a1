//! Billing HTTP module: webhook ingress plus the internal billing API.

mod dto;
mod handlers;
mod routes;

pub use dto::{
    AccessDecisionResponse, CheckoutRequestBody, CheckoutResponse, ErrorResponse,
    SubscriptionStatusResponse,
};
pub use handlers::BillingAppState;
pub use routes::billing_router;
