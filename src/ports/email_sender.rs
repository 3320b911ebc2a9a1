//! EmailSender port - fire-and-forget lifecycle notifications.
//!
//! Email failures never roll back a subscription mutation: the billing
//! state is the source of truth and the notification is best-effort.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::DomainError;

/// Lifecycle email templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailTemplate {
    /// First successful subscription activation.
    Welcome,
    /// Cancellation confirmed; access continues until period end.
    Cancelled,
    /// A pending cancellation was removed.
    Reactivated,
}

impl EmailTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::Cancelled => "cancelled",
            Self::Reactivated => "reactivated",
        }
    }
}

/// A rendered-template send request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub recipient: String,
    pub template: EmailTemplate,
    pub variables: HashMap<String, String>,
}

impl EmailMessage {
    pub fn new(recipient: impl Into<String>, template: EmailTemplate) -> Self {
        Self {
            recipient: recipient.into(),
            template,
            variables: HashMap::new(),
        }
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

/// Port for the email collaborator.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Sends one templated message.
    async fn send(&self, message: EmailMessage) -> Result<(), DomainError>;
}

/// Spawns a send in the background and logs (only) on failure.
///
/// This is the one sanctioned way to call the sender from a handler.
pub fn send_detached(sender: std::sync::Arc<dyn EmailSender>, message: EmailMessage) {
    tokio::spawn(async move {
        let recipient = message.recipient.clone();
        let template = message.template;
        if let Err(err) = sender.send(message).await {
            tracing::warn!(
                recipient = %recipient,
                template = template.as_str(),
                error = %err,
                "Lifecycle email delivery failed"
            );
        }
    });
}
