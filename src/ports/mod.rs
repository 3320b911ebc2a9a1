//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `WebhookLedger` - idempotency tracking for provider webhook events
//! - `BillingRepository` - persistence for the canonical subscription record
//! - `PaymentProvider` - the external payment gateway
//! - `EmailSender` - fire-and-forget lifecycle notifications
//! - `RateLimiter` - sliding-window request limiting

mod billing_repository;
mod email_sender;
mod payment_provider;
mod rate_limiter;
mod webhook_ledger;

pub use billing_repository::BillingRepository;
pub use email_sender::{send_detached, EmailMessage, EmailSender, EmailTemplate};
pub use payment_provider::{
    CheckoutRequest, CheckoutSession, PaymentError, PaymentErrorCode, PaymentProvider,
    PortalSession, ProviderCustomer, ProviderSubscription,
};
pub use rate_limiter::{RateLimitDecision, RateLimitError, RateLimiter};
pub use webhook_ledger::{ClaimOutcome, LedgerEntry, LedgerStatus, WebhookLedger};
