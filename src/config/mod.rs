//! Application configuration module
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Values use the `SUBLEDGER_` prefix and
//! nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use subledger::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {}", config.server.socket_addr());
//! ```

mod database;
mod email;
mod error;
mod payment;
mod server;

pub use database::DatabaseConfig;
pub use email::EmailConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Payment configuration (Stripe)
    pub payment: PaymentConfig,

    /// Email configuration (Resend)
    #[serde(default)]
    pub email: EmailConfig,

    /// Redis URL for the shared rate limiter; in-memory fallback when
    /// absent.
    #[serde(default)]
    pub redis_url: Option<String>,
}

impl AppConfig {
    /// Loads configuration from environment variables.
    ///
    /// 1. Loads `.env` if present (development convenience)
    /// 2. Reads `SUBLEDGER_`-prefixed variables, `__` separating nesting
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("SUBLEDGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(ConfigError::Load)?;

        settings.try_deserialize().map_err(ConfigError::Load)
    }

    /// Validates every section; called once at boot.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.payment.validate()?;
        self.email.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/subledger".to_string(),
                max_connections: 5,
            },
            payment: PaymentConfig {
                stripe_api_key: "sk_test_abc".to_string(),
                stripe_webhook_secret: "whsec_abc".to_string(),
                stripe_price_id: "price_abc".to_string(),
            },
            email: EmailConfig::default(),
            redis_url: None,
        }
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn bad_stripe_key_fails_validation() {
        let mut config = valid_config();
        config.payment.stripe_api_key = "pk_test_wrong".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_database_url_fails_validation() {
        let mut config = valid_config();
        config.database.url = String::new();
        assert!(config.validate().is_err());
    }
}
