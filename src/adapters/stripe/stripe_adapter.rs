//! Stripe payment provider adapter.
//!
//! Implements the `PaymentProvider` port against the Stripe REST API with
//! a bounded request timeout and a single retry for transient transport
//! failures. Redelivery beyond that is the provider's job: reconciliation
//! failures surface as 5xx and Stripe retries the webhook on its own
//! schedule.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::foundation::UserId;
use crate::ports::{
    CheckoutRequest, CheckoutSession, PaymentError, PaymentErrorCode, PaymentProvider,
    PortalSession, ProviderCustomer, ProviderSubscription,
};

/// Request timeout for all Stripe API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Price id for the single subscription plan.
    price_id: String,

    /// Base URL for the Stripe API.
    api_base_url: String,
}

impl StripeConfig {
    pub fn new(api_key: impl Into<String>, price_id: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            price_id: price_id.into(),
            api_base_url: "https://api.stripe.com".to_string(),
        }
    }

    /// Points the adapter at a different base URL (stripe-mock, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

/// PaymentProvider implementation over the Stripe API.
pub struct StripePaymentAdapter {
    config: StripeConfig,
    http_client: reqwest::Client,
}

/// Subscription object as returned by the Stripe API.
#[derive(Debug, Deserialize)]
struct StripeSubscription {
    id: String,
    customer: String,
    status: String,
    #[serde(default)]
    cancel_at_period_end: bool,
    current_period_start: i64,
    current_period_end: i64,
    trial_start: Option<i64>,
    trial_end: Option<i64>,
}

impl From<StripeSubscription> for ProviderSubscription {
    fn from(sub: StripeSubscription) -> Self {
        ProviderSubscription {
            id: sub.id,
            customer_id: sub.customer,
            status: sub.status,
            cancel_at_period_end: sub.cancel_at_period_end,
            current_period_start: sub.current_period_start,
            current_period_end: sub.current_period_end,
            trial_start: sub.trial_start,
            trial_end: sub.trial_end,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: String,
}

impl StripePaymentAdapter {
    pub fn new(config: StripeConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { config, http_client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    /// Sends a form-encoded request, retrying once on transport errors.
    async fn send_form(
        &self,
        method: reqwest::Method,
        path: &str,
        params: &[(String, String)],
    ) -> Result<reqwest::Response, PaymentError> {
        let mut last_err = None;
        for attempt in 0..2 {
            let mut request = self
                .http_client
                .request(method.clone(), self.url(path))
                .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None);
            if !params.is_empty() {
                request = request.form(params);
            }

            match request.send().await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    tracing::warn!(path, attempt, error = %err, "Stripe request failed");
                    last_err = Some(err);
                }
            }
        }
        Err(PaymentError::network(
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "request failed".to_string()),
        ))
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
        context: &str,
    ) -> Result<T, PaymentError> {
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PaymentError::not_found(context));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(PaymentError::new(
                PaymentErrorCode::RateLimitExceeded,
                "Stripe rate limit exceeded",
            ));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(PaymentError::new(
                PaymentErrorCode::AuthenticationError,
                "Stripe API key rejected",
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(context, %status, error = %body, "Stripe API error");
            return Err(PaymentError::provider(format!("Stripe API error ({}): {}", status, body)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PaymentError::provider(format!("Failed to parse {}: {}", context, e)))
    }
}

#[async_trait]
impl PaymentProvider for StripePaymentAdapter {
    async fn create_customer(
        &self,
        user_id: &UserId,
        email: &str,
    ) -> Result<ProviderCustomer, PaymentError> {
        let params = vec![
            ("email".to_string(), email.to_string()),
            ("metadata[user_id]".to_string(), user_id.to_string()),
        ];

        let response = self.send_form(reqwest::Method::POST, "/v1/customers", &params).await?;
        let customer: StripeCustomer = self.parse_response(response, "customer").await?;

        Ok(ProviderCustomer {
            id: customer.id,
            email: customer.email.unwrap_or_else(|| email.to_string()),
        })
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<ProviderSubscription>, PaymentError> {
        let path = format!("/v1/subscriptions/{}", subscription_id);
        let response = self.send_form(reqwest::Method::GET, &path, &[]).await?;

        match self.parse_response::<StripeSubscription>(response, "subscription").await {
            Ok(sub) => Ok(Some(sub.into())),
            Err(err) if err.code == PaymentErrorCode::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn cancel_at_period_end(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, PaymentError> {
        let path = format!("/v1/subscriptions/{}", subscription_id);
        let params = vec![("cancel_at_period_end".to_string(), "true".to_string())];

        let response = self.send_form(reqwest::Method::POST, &path, &params).await?;
        let sub: StripeSubscription = self.parse_response(response, "subscription").await?;
        tracing::info!(subscription_id, period_end = sub.current_period_end, "Scheduled cancellation at period end");
        Ok(sub.into())
    }

    async fn resume_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, PaymentError> {
        let path = format!("/v1/subscriptions/{}", subscription_id);
        let params = vec![("cancel_at_period_end".to_string(), "false".to_string())];

        let response = self.send_form(reqwest::Method::POST, &path, &params).await?;
        let sub: StripeSubscription = self.parse_response(response, "subscription").await?;

        if sub.cancel_at_period_end {
            return Err(PaymentError::provider(
                "Subscription still scheduled for cancellation after resume",
            ));
        }
        tracing::info!(subscription_id, "Removed pending cancellation");
        Ok(sub.into())
    }

    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let mut params = vec![
            ("customer".to_string(), request.customer_id),
            ("mode".to_string(), "subscription".to_string()),
            ("line_items[0][price]".to_string(), self.config.price_id.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), request.success_url),
            ("cancel_url".to_string(), request.cancel_url),
            ("allow_promotion_codes".to_string(), "true".to_string()),
        ];
        // Stripe rejects trial_period_days=0; omit the parameter entirely
        // for immediate payment.
        if request.trial_days > 0 {
            params.push((
                "subscription_data[trial_period_days]".to_string(),
                request.trial_days.to_string(),
            ));
        }

        let response =
            self.send_form(reqwest::Method::POST, "/v1/checkout/sessions", &params).await?;
        let session: StripeSession = self.parse_response(response, "checkout session").await?;

        Ok(CheckoutSession { id: session.id, url: session.url })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError> {
        let params = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("return_url".to_string(), return_url.to_string()),
        ];

        let response =
            self.send_form(reqwest::Method::POST, "/v1/billing_portal/sessions", &params).await?;
        let session: StripeSession = self.parse_response(response, "portal session").await?;

        Ok(PortalSession { id: session.id, url: session.url })
    }
}
