//! PostgreSQL adapters.
//!
//! Schema bootstrap is owned by the deployment's migration runner; these
//! adapters assume the `subscription_records` and `webhook_events` tables
//! already exist.

mod billing_repository;
mod webhook_ledger;

pub use billing_repository::PostgresBillingRepository;
pub use webhook_ledger::PostgresWebhookLedger;
