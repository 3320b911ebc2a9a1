//! Billing command handlers.
//!
//! The webhook-driven handlers (checkout, subscription lifecycle,
//! invoices) form the reconciler: they apply verified provider events to
//! the canonical subscription record, re-fetching authoritative state
//! from the provider instead of trusting event payloads. The remaining
//! handlers serve the internal API: the access gate and the
//! user-initiated cancel/reactivate/checkout actions.

mod cancel_subscription;
mod checkout_completed;
mod create_checkout;
mod get_access_decision;
mod invoice_events;
mod process_webhook;
mod reactivate_subscription;
mod subscription_lifecycle;
mod sync;

pub use cancel_subscription::CancelSubscriptionHandler;
pub use checkout_completed::CheckoutCompletedHandler;
pub use create_checkout::{CheckoutUrls, CreateCheckoutHandler};
pub use get_access_decision::{AccessDecision, GetAccessDecisionHandler};
pub use invoice_events::InvoiceEventsHandler;
pub use process_webhook::WebhookService;
pub use reactivate_subscription::ReactivateSubscriptionHandler;
pub use subscription_lifecycle::SubscriptionLifecycleHandler;
