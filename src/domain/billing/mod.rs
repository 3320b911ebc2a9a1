//! Billing domain - subscription lifecycle, webhook verification, and the
//! access decision.
//!
//! The canonical record of a user's billing state lives here, together
//! with the pure calculator that turns it into an access decision and the
//! idempotent machinery that applies provider webhook events to it.

mod processor;
mod provider_event;
mod record;
mod state;
mod status;
mod webhook_errors;
mod webhook_verifier;

pub use processor::{
    EventDispatcher, IdempotentWebhookProcessor, ProcessOutcome, WebhookEventHandler,
};
pub use provider_event::{ProviderEvent, ProviderEventData, ProviderEventType};
pub use record::{RecordError, SubscriptionRecord, DEFAULT_TRIAL_DAYS};
pub use state::{AccessLevel, SubscriptionState};
pub use status::SubscriptionStatus;
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{SignatureHeader, WebhookVerifier};

#[cfg(test)]
pub use provider_event::ProviderEventBuilder;
#[cfg(test)]
pub use webhook_verifier::sign_test_payload;
