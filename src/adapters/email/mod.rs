//! Email adapters.

mod resend_sender;
mod tracing_sender;

pub use resend_sender::{ResendConfig, ResendEmailSender};
pub use tracing_sender::TracingEmailSender;
