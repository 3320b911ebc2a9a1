//! Stripe adapter - PaymentProvider implementation over the Stripe API,
//! plus a scriptable mock for tests and local development.

mod mock_provider;
mod stripe_adapter;

pub use mock_provider::{active_subscription, MockPaymentProvider};
pub use stripe_adapter::{StripeConfig, StripePaymentAdapter};
