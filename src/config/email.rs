//! Email configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Email configuration (Resend).
///
/// With no API key configured, lifecycle emails are logged instead of
/// delivered; the billing pipeline never depends on delivery.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailConfig {
    /// Resend API key; empty disables delivery.
    #[serde(default)]
    pub resend_api_key: String,

    /// From address for lifecycle emails.
    #[serde(default = "default_from_address")]
    pub from_address: String,
}

fn default_from_address() -> String {
    "billing@example.com".to_string()
}

impl EmailConfig {
    /// Whether real delivery is configured.
    pub fn is_enabled(&self) -> bool {
        !self.resend_api_key.is_empty()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_enabled() && !self.from_address.contains('@') {
            return Err(ValidationError::Invalid("EMAIL__FROM_ADDRESS must be an address"));
        }
        Ok(())
    }
}
