//! Subledger server binary.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use subledger::adapters::email::{ResendConfig, ResendEmailSender, TracingEmailSender};
use subledger::adapters::http::billing::{billing_router, BillingAppState};
use subledger::adapters::postgres::{PostgresBillingRepository, PostgresWebhookLedger};
use subledger::adapters::rate_limiter::{InMemoryRateLimiter, RateLimitConfig, RedisRateLimiter};
use subledger::adapters::stripe::{StripeConfig, StripePaymentAdapter};
use subledger::application::handlers::billing::{
    CancelSubscriptionHandler, CheckoutCompletedHandler, CreateCheckoutHandler,
    GetAccessDecisionHandler, InvoiceEventsHandler, ReactivateSubscriptionHandler,
    SubscriptionLifecycleHandler, WebhookService,
};
use subledger::config::AppConfig;
use subledger::domain::billing::{EventDispatcher, WebhookVerifier};
use subledger::ports::{
    BillingRepository, EmailSender, PaymentProvider, RateLimiter, WebhookLedger,
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("subledger exited with error: {}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    config.validate()?;
    info!(
        environment = ?config.server.environment,
        test_mode = config.payment.is_test_mode(),
        "Configuration loaded"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    info!("Postgres connection established");

    let repository: Arc<dyn BillingRepository> =
        Arc::new(PostgresBillingRepository::new(pool.clone()));
    let ledger: Arc<dyn WebhookLedger> = Arc::new(PostgresWebhookLedger::new(pool));

    let provider: Arc<dyn PaymentProvider> = Arc::new(StripePaymentAdapter::new(
        StripeConfig::new(
            config.payment.stripe_api_key.clone(),
            config.payment.stripe_price_id.clone(),
        ),
    ));

    let email: Arc<dyn EmailSender> = if config.email.is_enabled() {
        Arc::new(ResendEmailSender::new(ResendConfig::new(
            config.email.resend_api_key.clone(),
            config.email.from_address.clone(),
        )))
    } else {
        info!("Email delivery not configured; logging lifecycle emails instead");
        Arc::new(TracingEmailSender)
    };

    let rate_limiter: Arc<dyn RateLimiter> = match &config.redis_url {
        Some(url) => {
            let limiter = RedisRateLimiter::connect(url, RateLimitConfig::default()).await?;
            info!("Redis rate limiter connected");
            Arc::new(limiter)
        }
        None => Arc::new(InMemoryRateLimiter::with_defaults()),
    };

    let dispatcher = EventDispatcher::new()
        .register(Arc::new(CheckoutCompletedHandler::new(
            Arc::clone(&repository),
            Arc::clone(&provider),
            Arc::clone(&email),
        )))
        .register(Arc::new(SubscriptionLifecycleHandler::new(
            Arc::clone(&repository),
            Arc::clone(&provider),
            Arc::clone(&email),
        )))
        .register(Arc::new(InvoiceEventsHandler::new(
            Arc::clone(&repository),
            Arc::clone(&provider),
        )));

    let state = BillingAppState {
        webhook_service: Arc::new(WebhookService::new(
            WebhookVerifier::new(config.payment.stripe_webhook_secret.clone()),
            ledger,
            dispatcher,
        )),
        access: Arc::new(GetAccessDecisionHandler::new(Arc::clone(&repository))),
        cancel: Arc::new(CancelSubscriptionHandler::new(
            Arc::clone(&repository),
            Arc::clone(&provider),
            Arc::clone(&email),
        )),
        reactivate: Arc::new(ReactivateSubscriptionHandler::new(
            Arc::clone(&repository),
            Arc::clone(&provider),
            Arc::clone(&email),
        )),
        checkout: Arc::new(CreateCheckoutHandler::new(
            Arc::clone(&repository),
            Arc::clone(&provider),
        )),
        rate_limiter,
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api/v1/billing", billing_router())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .with_state(state);

    let addr = config.server.socket_addr();
    info!(%addr, "Listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
