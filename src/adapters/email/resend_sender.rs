//! EmailSender implementation over the Resend HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{EmailMessage, EmailSender, EmailTemplate};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const API_URL: &str = "https://api.resend.com/emails";

/// Resend API configuration.
#[derive(Clone)]
pub struct ResendConfig {
    api_key: SecretString,
    from_address: String,
}

impl ResendConfig {
    pub fn new(api_key: impl Into<String>, from_address: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            from_address: from_address.into(),
        }
    }
}

/// Sends lifecycle emails through Resend.
pub struct ResendEmailSender {
    config: ResendConfig,
    http_client: reqwest::Client,
}

impl ResendEmailSender {
    pub fn new(config: ResendConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { config, http_client }
    }

    fn subject_for(template: EmailTemplate) -> &'static str {
        match template {
            EmailTemplate::Welcome => "Welcome aboard - your subscription is active",
            EmailTemplate::Cancelled => "Your subscription has been cancelled",
            EmailTemplate::Reactivated => "Your subscription is back on",
        }
    }

    fn body_for(message: &EmailMessage) -> String {
        let var = |key: &str| message.variables.get(key).cloned().unwrap_or_default();
        match message.template {
            EmailTemplate::Welcome => format!(
                "Thanks for subscribing to the {} plan. You now have full access.",
                var("plan_name")
            ),
            EmailTemplate::Cancelled => format!(
                "Your subscription was cancelled. You keep full access until {}.",
                var("access_until")
            ),
            EmailTemplate::Reactivated => format!(
                "Your cancellation was removed. The subscription renews at {}.",
                var("renews_at")
            ),
        }
    }
}

#[async_trait]
impl EmailSender for ResendEmailSender {
    async fn send(&self, message: EmailMessage) -> Result<(), DomainError> {
        let payload = serde_json::json!({
            "from": self.config.from_address,
            "to": [message.recipient],
            "subject": Self::subject_for(message.template),
            "text": Self::body_for(&message),
        });

        let response = self
            .http_client
            .post(API_URL)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| DomainError::new(ErrorCode::EmailDeliveryError, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::new(
                ErrorCode::EmailDeliveryError,
                format!("Resend API error ({}): {}", status, body),
            ));
        }

        tracing::debug!(template = message.template.as_str(), "Lifecycle email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodies_interpolate_variables() {
        let message = EmailMessage::new("u@example.com", EmailTemplate::Cancelled)
            .with_variable("access_until", "2026-09-01T00:00:00+00:00");

        let body = ResendEmailSender::body_for(&message);
        assert!(body.contains("2026-09-01"));
    }

    #[test]
    fn every_template_has_a_subject() {
        for template in [EmailTemplate::Welcome, EmailTemplate::Cancelled, EmailTemplate::Reactivated] {
            assert!(!ResendEmailSender::subject_for(template).is_empty());
        }
    }
}
