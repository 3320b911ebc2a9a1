//! End-to-end pipeline tests: signed webhook in, access decision out.
//!
//! Runs the real verifier, ledger, dispatcher, and reconciler over the
//! in-memory adapters and the mock payment provider.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use subledger::adapters::email::TracingEmailSender;
use subledger::adapters::memory::{InMemoryBillingRepository, InMemoryWebhookLedger};
use subledger::adapters::stripe::{active_subscription, MockPaymentProvider};
use subledger::application::handlers::billing::{
    CancelSubscriptionHandler, CheckoutCompletedHandler, GetAccessDecisionHandler,
    InvoiceEventsHandler, ReactivateSubscriptionHandler, SubscriptionLifecycleHandler,
    WebhookService,
};
use subledger::domain::billing::{
    EventDispatcher, ProcessOutcome, SubscriptionRecord, SubscriptionState, SubscriptionStatus,
    WebhookVerifier,
};
use subledger::domain::foundation::{Timestamp, UserId};
use subledger::ports::LedgerStatus;

const SECRET: &str = "whsec_pipeline_test";
const DAY: i64 = 86_400;

struct Pipeline {
    service: Arc<WebhookService>,
    repository: Arc<InMemoryBillingRepository>,
    ledger: Arc<InMemoryWebhookLedger>,
    provider: Arc<MockPaymentProvider>,
    access: GetAccessDecisionHandler,
    user_id: UserId,
    now: i64,
}

async fn pipeline() -> Pipeline {
    let repository = Arc::new(InMemoryBillingRepository::new());
    let ledger = Arc::new(InMemoryWebhookLedger::new());
    let provider = Arc::new(MockPaymentProvider::new());
    let email = Arc::new(TracingEmailSender);

    let mut record =
        SubscriptionRecord::at_signup(UserId::new(), "user@example.com", Timestamp::now());
    record.provider_customer_id = Some("cus_1".to_string());
    let user_id = record.user_id;
    repository.seed(record).await;

    let dispatcher = EventDispatcher::new()
        .register(Arc::new(CheckoutCompletedHandler::new(
            Arc::clone(&repository) as _,
            Arc::clone(&provider) as _,
            Arc::clone(&email) as _,
        )))
        .register(Arc::new(SubscriptionLifecycleHandler::new(
            Arc::clone(&repository) as _,
            Arc::clone(&provider) as _,
            Arc::clone(&email) as _,
        )))
        .register(Arc::new(InvoiceEventsHandler::new(
            Arc::clone(&repository) as _,
            Arc::clone(&provider) as _,
        )));

    let service = Arc::new(WebhookService::new(
        WebhookVerifier::new(SECRET),
        Arc::clone(&ledger) as _,
        dispatcher,
    ));

    Pipeline {
        service,
        access: GetAccessDecisionHandler::new(Arc::clone(&repository) as _),
        repository,
        ledger,
        provider,
        user_id,
        now: Timestamp::now().as_unix_secs(),
    }
}

fn sign(payload: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let signed_payload = format!("{}.{}", timestamp, payload);
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(signed_payload.as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

fn event_payload(event_id: &str, event_type: &str, object: serde_json::Value) -> String {
    serde_json::json!({
        "id": event_id,
        "type": event_type,
        "created": chrono::Utc::now().timestamp(),
        "data": {"object": object},
        "livemode": false
    })
    .to_string()
}

async fn deliver(p: &Pipeline, event_id: &str, event_type: &str, object: serde_json::Value) -> ProcessOutcome {
    let payload = event_payload(event_id, event_type, object);
    p.service.handle(payload.as_bytes(), &sign(&payload)).await.unwrap()
}

async fn record_of(p: &Pipeline) -> SubscriptionRecord {
    p.repository.find_by_user_id(&p.user_id).await.unwrap().unwrap()
}

#[tokio::test]
async fn subscription_created_activates_user_through_the_full_pipeline() {
    let p = pipeline().await;
    p.provider
        .seed_subscription(active_subscription("sub_1", "cus_1", p.now, p.now + 30 * DAY))
        .await;

    let outcome = deliver(
        &p,
        "evt_created",
        "customer.subscription.created",
        serde_json::json!({"id": "sub_1", "customer": "cus_1"}),
    )
    .await;

    assert_eq!(outcome, ProcessOutcome::Processed);
    let record = record_of(&p).await;
    assert_eq!(record.status, SubscriptionStatus::Active);
    assert_eq!(record.subscription_id.as_deref(), Some("sub_1"));

    let decision = p.access.handle(&p.user_id).await.unwrap();
    assert!(decision.can_access);
    assert_eq!(decision.reason, "subscription_active");
}

#[tokio::test]
async fn replayed_succeeded_event_produces_no_second_mutation() {
    let p = pipeline().await;
    p.provider
        .seed_subscription(active_subscription("sub_1", "cus_1", p.now, p.now + 30 * DAY))
        .await;

    let object = serde_json::json!({"id": "sub_1", "customer": "cus_1"});
    let first = deliver(&p, "evt_dup", "customer.subscription.created", object.clone()).await;
    assert_eq!(first, ProcessOutcome::Processed);

    let snapshot = record_of(&p).await;

    // Provider state changes between deliveries; a replay must not apply it.
    p.provider
        .seed_subscription(active_subscription("sub_1", "cus_1", p.now, p.now + 60 * DAY))
        .await;
    let second = deliver(&p, "evt_dup", "customer.subscription.created", object).await;

    assert_eq!(second, ProcessOutcome::Duplicate);
    assert_eq!(record_of(&p).await, snapshot);
}

#[tokio::test]
async fn concurrent_deliveries_of_one_event_mutate_exactly_once() {
    let p = pipeline().await;
    p.provider
        .seed_subscription(active_subscription("sub_1", "cus_1", p.now, p.now + 30 * DAY))
        .await;

    let payload = event_payload(
        "evt_race",
        "customer.subscription.created",
        serde_json::json!({"id": "sub_1", "customer": "cus_1"}),
    );
    let header = sign(&payload);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&p.service);
        let payload = payload.clone();
        let header = header.clone();
        tasks.push(tokio::spawn(async move {
            service.handle(payload.as_bytes(), &header).await
        }));
    }

    let mut processed = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(ProcessOutcome::Processed) => processed += 1,
            Ok(ProcessOutcome::Duplicate) => {}
            Err(err) if err.is_retryable() => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
    assert_eq!(processed, 1);

    let entry = p.ledger.find("evt_race").await.unwrap().unwrap();
    assert_eq!(entry.status, LedgerStatus::Succeeded);
}

#[tokio::test]
async fn provider_outage_marks_failed_then_redelivery_succeeds() {
    let p = pipeline().await;
    let object = serde_json::json!({"id": "sub_1", "customer": "cus_1"});
    let payload = event_payload("evt_retry", "customer.subscription.created", object);
    let header = sign(&payload);

    p.provider.set_fail_fetches(true);
    let result = p.service.handle(payload.as_bytes(), &header).await;
    assert!(result.is_err());

    let entry = p.ledger.find("evt_retry").await.unwrap().unwrap();
    assert_eq!(entry.status, LedgerStatus::Failed);
    assert_eq!(entry.retry_count, 1);

    // The provider redelivers the identical payload after the outage.
    p.provider.set_fail_fetches(false);
    p.provider
        .seed_subscription(active_subscription("sub_1", "cus_1", p.now, p.now + 30 * DAY))
        .await;
    let outcome = p.service.handle(payload.as_bytes(), &header).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Processed);
    assert_eq!(record_of(&p).await.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn cancellation_keeps_access_until_the_boundary_then_blocks() {
    let p = pipeline().await;
    let mut sub = active_subscription("sub_1", "cus_1", p.now, p.now + 10 * DAY);
    p.provider.seed_subscription(sub.clone()).await;
    deliver(
        &p,
        "evt_c1",
        "customer.subscription.created",
        serde_json::json!({"id": "sub_1", "customer": "cus_1"}),
    )
    .await;

    sub.cancel_at_period_end = true;
    p.provider.seed_subscription(sub).await;
    deliver(
        &p,
        "evt_c2",
        "customer.subscription.updated",
        serde_json::json!({"id": "sub_1", "customer": "cus_1"}),
    )
    .await;

    let record = record_of(&p).await;
    assert_eq!(record.status, SubscriptionStatus::Canceled);

    // Inside the grace period.
    let state = SubscriptionState::calculate(&record, Timestamp::from_unix_secs(p.now));
    assert!(state.can_access_app);
    assert!(state.reactivation_available);
    assert_eq!(state.days_remaining, Some(10));

    // One second past the boundary, on a simulated clock.
    let state =
        SubscriptionState::calculate(&record, Timestamp::from_unix_secs(p.now + 10 * DAY + 1));
    assert!(!state.can_access_app);
    assert!(state.should_redirect_to_pricing);
    assert!(!state.reactivation_available);
}

#[tokio::test]
async fn reactivation_through_webhooks_never_regresses_the_period() {
    let p = pipeline().await;
    let start = p.now - 5 * DAY;
    let end = p.now + 25 * DAY;
    let mut sub = active_subscription("sub_1", "cus_1", start, end);
    p.provider.seed_subscription(sub.clone()).await;
    deliver(
        &p,
        "evt_r1",
        "customer.subscription.created",
        serde_json::json!({"id": "sub_1", "customer": "cus_1"}),
    )
    .await;

    sub.cancel_at_period_end = true;
    p.provider.seed_subscription(sub.clone()).await;
    deliver(
        &p,
        "evt_r2",
        "customer.subscription.updated",
        serde_json::json!({"id": "sub_1", "customer": "cus_1"}),
    )
    .await;

    // Reactivation arrives with a stale, shorter period end first.
    sub.cancel_at_period_end = false;
    sub.current_period_end = end - 10 * DAY;
    p.provider.seed_subscription(sub.clone()).await;
    let outcome = deliver(
        &p,
        "evt_r3",
        "customer.subscription.updated",
        serde_json::json!({"id": "sub_1", "customer": "cus_1"}),
    )
    .await;
    assert!(matches!(outcome, ProcessOutcome::Ignored(_)));

    let record = record_of(&p).await;
    assert_eq!(record.status, SubscriptionStatus::Canceled);
    assert_eq!(record.subscription_end.unwrap().as_unix_secs(), end);

    // Then the correct object lands.
    sub.current_period_end = end;
    p.provider.seed_subscription(sub).await;
    deliver(
        &p,
        "evt_r4",
        "customer.subscription.updated",
        serde_json::json!({"id": "sub_1", "customer": "cus_1"}),
    )
    .await;

    let record = record_of(&p).await;
    assert_eq!(record.status, SubscriptionStatus::Active);
    assert_eq!(record.subscription_start.unwrap().as_unix_secs(), start);
    assert_eq!(record.subscription_end.unwrap().as_unix_secs(), end);
}

#[tokio::test]
async fn stale_deletion_for_replaced_subscription_is_a_no_op() {
    let p = pipeline().await;
    p.provider
        .seed_subscription(active_subscription("sub_B", "cus_1", p.now, p.now + 30 * DAY))
        .await;
    deliver(
        &p,
        "evt_d1",
        "customer.subscription.created",
        serde_json::json!({"id": "sub_B", "customer": "cus_1"}),
    )
    .await;

    let before = record_of(&p).await;
    assert_eq!(before.subscription_id.as_deref(), Some("sub_B"));

    let outcome = deliver(
        &p,
        "evt_d2",
        "customer.subscription.deleted",
        serde_json::json!({"id": "sub_A", "customer": "cus_1", "current_period_end": p.now - DAY}),
    )
    .await;

    assert_eq!(outcome, ProcessOutcome::Processed);
    assert_eq!(record_of(&p).await, before);
}

#[tokio::test]
async fn deletion_of_the_current_subscription_terminates_it() {
    let p = pipeline().await;
    p.provider
        .seed_subscription(active_subscription("sub_A", "cus_1", p.now, p.now + 30 * DAY))
        .await;
    deliver(
        &p,
        "evt_t1",
        "customer.subscription.created",
        serde_json::json!({"id": "sub_A", "customer": "cus_1"}),
    )
    .await;

    deliver(
        &p,
        "evt_t2",
        "customer.subscription.deleted",
        serde_json::json!({"id": "sub_A", "customer": "cus_1", "current_period_end": p.now}),
    )
    .await;

    let record = record_of(&p).await;
    assert_eq!(record.status, SubscriptionStatus::Canceled);
    assert!(record.subscription_id.is_none());
}

#[tokio::test]
async fn payment_failure_blocks_access_but_offers_reactivation() {
    let p = pipeline().await;
    p.provider
        .seed_subscription(active_subscription("sub_1", "cus_1", p.now, p.now + 30 * DAY))
        .await;
    deliver(
        &p,
        "evt_p1",
        "customer.subscription.created",
        serde_json::json!({"id": "sub_1", "customer": "cus_1"}),
    )
    .await;

    deliver(
        &p,
        "evt_p2",
        "invoice.payment_failed",
        serde_json::json!({"id": "in_1", "customer": "cus_1", "subscription": "sub_1"}),
    )
    .await;

    let record = record_of(&p).await;
    assert_eq!(record.status, SubscriptionStatus::PastDue);

    let state = SubscriptionState::calculate(&record, Timestamp::now());
    assert!(!state.can_access_app);
    assert!(state.reactivation_available);

    // The retried charge eventually succeeds.
    deliver(
        &p,
        "evt_p3",
        "invoice.payment_succeeded",
        serde_json::json!({"id": "in_1", "customer": "cus_1", "subscription": "sub_1"}),
    )
    .await;

    assert_eq!(record_of(&p).await.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn unknown_customer_is_acknowledged_without_fabricating_a_user() {
    let p = pipeline().await;
    let outcome = deliver(
        &p,
        "evt_u1",
        "invoice.payment_failed",
        serde_json::json!({"id": "in_1", "customer": "cus_ghost"}),
    )
    .await;

    assert!(matches!(outcome, ProcessOutcome::Ignored(_)));
    // Acknowledged terminally: a replay short-circuits.
    let outcome = deliver(
        &p,
        "evt_u1",
        "invoice.payment_failed",
        serde_json::json!({"id": "in_1", "customer": "cus_ghost"}),
    )
    .await;
    assert_eq!(outcome, ProcessOutcome::Duplicate);
}

#[tokio::test]
async fn trial_and_admin_access_scenarios() {
    let now = Timestamp::now();

    // Trial with five days left.
    let mut record = SubscriptionRecord::at_signup(UserId::new(), "a@b.se", now);
    record.trial_start = Some(now.add_days(-2));
    record.trial_end = Some(now.add_days(5));
    let state = SubscriptionState::calculate(&record, now);
    assert!(state.can_access_app);
    assert_eq!(state.days_remaining, Some(5));

    // Admin with an expired trial still gets in.
    record.is_admin = true;
    record.trial_end = Some(now.add_days(-30));
    let state = SubscriptionState::calculate(&record, now);
    assert!(state.can_access_app);
    assert!(!state.should_redirect_to_pricing);
}

#[tokio::test]
async fn user_initiated_cancel_then_reactivate_round_trip() {
    let p = pipeline().await;
    let email = Arc::new(TracingEmailSender);
    let cancel = CancelSubscriptionHandler::new(
        Arc::clone(&p.repository) as _,
        Arc::clone(&p.provider) as _,
        Arc::clone(&email) as _,
    );
    let reactivate = ReactivateSubscriptionHandler::new(
        Arc::clone(&p.repository) as _,
        Arc::clone(&p.provider) as _,
        email,
    );

    p.provider
        .seed_subscription(active_subscription("sub_1", "cus_1", p.now, p.now + 20 * DAY))
        .await;
    deliver(
        &p,
        "evt_a1",
        "customer.subscription.created",
        serde_json::json!({"id": "sub_1", "customer": "cus_1"}),
    )
    .await;

    let record = cancel.handle(&p.user_id).await.unwrap();
    assert_eq!(record.status, SubscriptionStatus::Canceled);
    assert!(p.access.handle(&p.user_id).await.unwrap().can_access);

    let record = reactivate.handle(&p.user_id).await.unwrap();
    assert_eq!(record.status, SubscriptionStatus::Active);
    assert_eq!(record.subscription_start.unwrap().as_unix_secs(), p.now);

    // A second reactivation has nothing to do.
    assert!(reactivate.handle(&p.user_id).await.is_err());
}
