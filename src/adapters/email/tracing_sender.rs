//! Log-only email sender for development and tests.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::ports::{EmailMessage, EmailSender};

/// Writes the message to the log instead of delivering it.
pub struct TracingEmailSender;

#[async_trait]
impl EmailSender for TracingEmailSender {
    async fn send(&self, message: EmailMessage) -> Result<(), DomainError> {
        tracing::info!(
            recipient = %message.recipient,
            template = message.template.as_str(),
            variables = ?message.variables,
            "Email (not delivered: tracing sender)"
        );
        Ok(())
    }
}
