//! Scriptable in-memory payment provider.
//!
//! Tests seed subscriptions and flip failure switches to exercise the
//! reconciler without touching the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::UserId;
use crate::ports::{
    CheckoutRequest, CheckoutSession, PaymentError, PaymentProvider, PortalSession,
    ProviderCustomer, ProviderSubscription,
};

/// In-memory stand-in for the payment provider.
pub struct MockPaymentProvider {
    subscriptions: RwLock<HashMap<String, ProviderSubscription>>,
    customers: RwLock<HashMap<String, ProviderCustomer>>,
    last_checkout: RwLock<Option<CheckoutRequest>>,
    fail_fetches: AtomicBool,
    counter: AtomicU64,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            customers: RwLock::new(HashMap::new()),
            last_checkout: RwLock::new(None),
            fail_fetches: AtomicBool::new(false),
            counter: AtomicU64::new(1),
        }
    }

    /// Seeds (or replaces) a subscription object.
    pub async fn seed_subscription(&self, subscription: ProviderSubscription) {
        self.subscriptions
            .write()
            .await
            .insert(subscription.id.clone(), subscription);
    }

    /// Removes a subscription, as after a true termination.
    pub async fn remove_subscription(&self, subscription_id: &str) {
        self.subscriptions.write().await.remove(subscription_id);
    }

    /// The most recent checkout request, for asserting on its parameters.
    pub async fn last_checkout_request(&self) -> Option<CheckoutRequest> {
        self.last_checkout.read().await.clone()
    }

    /// Makes all provider calls fail with a network error until reset.
    pub fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    fn check_network(&self) -> Result<(), PaymentError> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            Err(PaymentError::network("simulated network failure"))
        } else {
            Ok(())
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}_{:06}", prefix, self.counter.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for MockPaymentProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_customer(
        &self,
        _user_id: &UserId,
        email: &str,
    ) -> Result<ProviderCustomer, PaymentError> {
        self.check_network()?;
        let customer = ProviderCustomer {
            id: self.next_id("cus"),
            email: email.to_string(),
        };
        self.customers
            .write()
            .await
            .insert(customer.id.clone(), customer.clone());
        Ok(customer)
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<ProviderSubscription>, PaymentError> {
        self.check_network()?;
        Ok(self.subscriptions.read().await.get(subscription_id).cloned())
    }

    async fn cancel_at_period_end(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, PaymentError> {
        self.check_network()?;
        let mut subscriptions = self.subscriptions.write().await;
        let subscription = subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| PaymentError::not_found("subscription"))?;
        subscription.cancel_at_period_end = true;
        Ok(subscription.clone())
    }

    async fn resume_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, PaymentError> {
        self.check_network()?;
        let mut subscriptions = self.subscriptions.write().await;
        let subscription = subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| PaymentError::not_found("subscription"))?;
        subscription.cancel_at_period_end = false;
        subscription.status = "active".to_string();
        Ok(subscription.clone())
    }

    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        self.check_network()?;
        let id = self.next_id("cs");
        let session = CheckoutSession {
            url: format!("https://checkout.example.com/{}?customer={}", id, request.customer_id),
            id,
        };
        *self.last_checkout.write().await = Some(request);
        Ok(session)
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        _return_url: &str,
    ) -> Result<PortalSession, PaymentError> {
        self.check_network()?;
        let id = self.next_id("bps");
        Ok(PortalSession {
            url: format!("https://portal.example.com/{}?customer={}", id, customer_id),
            id,
        })
    }
}

/// Builds a plain active subscription for test scripts.
pub fn active_subscription(
    id: &str,
    customer_id: &str,
    period_start: i64,
    period_end: i64,
) -> ProviderSubscription {
    ProviderSubscription {
        id: id.to_string(),
        customer_id: customer_id.to_string(),
        status: "active".to_string(),
        cancel_at_period_end: false,
        current_period_start: period_start,
        current_period_end: period_end,
        trial_start: None,
        trial_end: None,
    }
}
