//! Idempotent webhook processing.
//!
//! Coordinates the idempotency ledger and the typed event handlers so
//! that each provider event mutates the subscription record at most once,
//! no matter how many times or in what order it is delivered.
//!
//! ## Race handling
//!
//! The ledger's unique constraint on the event id is the only
//! coordination primitive: of N concurrent deliveries of the same event,
//! exactly one claims the row and runs a handler; the others observe the
//! existing row and back off.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::ports::{ClaimOutcome, WebhookLedger};

use super::provider_event::{ProviderEvent, ProviderEventType};
use super::webhook_errors::WebhookError;

/// How long a `processing` row may sit before a redelivery is allowed to
/// reclaim it (a worker that died mid-event must not wedge the event
/// forever).
pub const DEFAULT_CLAIM_STALE_AFTER: Duration = Duration::from_secs(300);

/// Handler for one or more provider event types.
///
/// Implementations must be idempotent at the record level: the ledger
/// prevents double processing of one event id, but the same logical
/// change can arrive under several event ids.
#[async_trait]
pub trait WebhookEventHandler: Send + Sync {
    /// The event types this handler processes.
    fn handles(&self) -> Vec<ProviderEventType>;

    /// Applies the event to the canonical record.
    ///
    /// `Err(WebhookError::Ignored(_))` acknowledges the event without a
    /// mutation; other errors mark the ledger row failed and surface a
    /// retryable response to the provider.
    async fn handle(&self, event: &ProviderEvent) -> Result<(), WebhookError>;
}

/// Fixed table routing event types to handlers.
pub struct EventDispatcher {
    handlers: HashMap<ProviderEventType, Arc<dyn WebhookEventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    /// Registers a handler for every type it declares.
    ///
    /// Later registrations win; the table is built once at startup.
    pub fn register(mut self, handler: Arc<dyn WebhookEventHandler>) -> Self {
        for event_type in handler.handles() {
            self.handlers.insert(event_type, Arc::clone(&handler));
        }
        self
    }

    /// Routes an event to its handler.
    ///
    /// Unhandled types resolve to `Ignored`: acknowledging them is the
    /// only response that terminates delivery, since no future retry can
    /// make an unknown type known.
    pub async fn dispatch(&self, event: &ProviderEvent) -> Result<(), WebhookError> {
        let event_type = event.parsed_type();
        match self.handlers.get(&event_type) {
            Some(handler) => handler.handle(event).await,
            None => {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "Acknowledging unhandled webhook event type"
                );
                Err(WebhookError::Ignored(format!(
                    "no handler for event type {}",
                    event.event_type
                )))
            }
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal outcome of processing one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A handler ran and the ledger row is marked succeeded.
    Processed,
    /// The event id had already succeeded; nothing was done.
    Duplicate,
    /// The event was acknowledged without a mutation (unknown type,
    /// stale payload, missing user).
    Ignored(String),
}

/// Entry point for verified events: claim, dispatch, record the result.
pub struct IdempotentWebhookProcessor {
    ledger: Arc<dyn WebhookLedger>,
    dispatcher: EventDispatcher,
    claim_stale_after: Duration,
}

impl IdempotentWebhookProcessor {
    pub fn new(ledger: Arc<dyn WebhookLedger>, dispatcher: EventDispatcher) -> Self {
        Self {
            ledger,
            dispatcher,
            claim_stale_after: DEFAULT_CLAIM_STALE_AFTER,
        }
    }

    /// Overrides the staleness threshold for reclaiming in-flight rows.
    pub fn with_claim_stale_after(mut self, stale_after: Duration) -> Self {
        self.claim_stale_after = stale_after;
        self
    }

    /// Processes one verified event exactly once.
    pub async fn process(&self, event: ProviderEvent) -> Result<ProcessOutcome, WebhookError> {
        match self
            .ledger
            .claim_or_get_status(&event.id, &event.event_type, self.claim_stale_after)
            .await?
        {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::AlreadySucceeded => {
                tracing::debug!(event_id = %event.id, "Duplicate delivery of succeeded event");
                return Ok(ProcessOutcome::Duplicate);
            }
            ClaimOutcome::InFlight => {
                return Err(WebhookError::InFlight(event.id));
            }
        }

        match self.dispatcher.dispatch(&event).await {
            Ok(()) => {
                self.ledger.mark_succeeded(&event.id).await?;
                Ok(ProcessOutcome::Processed)
            }
            Err(WebhookError::Ignored(reason)) => {
                // Ignored is terminal: record success so redeliveries
                // short-circuit.
                self.ledger.mark_succeeded(&event.id).await?;
                Ok(ProcessOutcome::Ignored(reason))
            }
            Err(WebhookError::UserNotFound(customer_id)) => {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    provider_customer_id = %customer_id,
                    "Webhook references a customer with no local user; acknowledging for manual investigation"
                );
                self.ledger.mark_succeeded(&event.id).await?;
                Ok(ProcessOutcome::Ignored(format!(
                    "no local user for customer {}",
                    customer_id
                )))
            }
            Err(err) => {
                if let Err(mark_err) = self.ledger.mark_failed(&event.id, &err.to_string()).await {
                    tracing::error!(
                        event_id = %event.id,
                        error = %mark_err,
                        "Failed to mark ledger row failed"
                    );
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryWebhookLedger;
    use crate::domain::billing::ProviderEventBuilder;
    use crate::ports::LedgerStatus;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingHandler {
        types: Vec<ProviderEventType>,
        calls: AtomicU32,
        fail: bool,
    }

    impl CountingHandler {
        fn new(types: Vec<ProviderEventType>) -> Arc<Self> {
            Arc::new(Self { types, calls: AtomicU32::new(0), fail: false })
        }

        fn failing(types: Vec<ProviderEventType>) -> Arc<Self> {
            Arc::new(Self { types, calls: AtomicU32::new(0), fail: true })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WebhookEventHandler for CountingHandler {
        fn handles(&self) -> Vec<ProviderEventType> {
            self.types.clone()
        }

        async fn handle(&self, _event: &ProviderEvent) -> Result<(), WebhookError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(WebhookError::ProviderFetchFailed("simulated".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn processor_with(
        handler: Arc<CountingHandler>,
    ) -> (IdempotentWebhookProcessor, Arc<InMemoryWebhookLedger>) {
        let ledger = Arc::new(InMemoryWebhookLedger::new());
        let dispatcher = EventDispatcher::new().register(handler);
        (IdempotentWebhookProcessor::new(Arc::clone(&ledger) as _, dispatcher), ledger)
    }

    #[tokio::test]
    async fn new_event_is_processed_and_marked_succeeded() {
        let handler = CountingHandler::new(vec![ProviderEventType::InvoicePaid]);
        let (processor, ledger) = processor_with(Arc::clone(&handler));

        let event = ProviderEventBuilder::new().id("evt_1").event_type("invoice.paid").build();
        let outcome = processor.process(event).await.unwrap();

        assert_eq!(outcome, ProcessOutcome::Processed);
        assert_eq!(handler.calls(), 1);
        let entry = ledger.find("evt_1").await.unwrap().unwrap();
        assert_eq!(entry.status, LedgerStatus::Succeeded);
    }

    #[tokio::test]
    async fn succeeded_event_is_never_reprocessed() {
        let handler = CountingHandler::new(vec![ProviderEventType::InvoicePaid]);
        let (processor, _ledger) = processor_with(Arc::clone(&handler));

        let event = ProviderEventBuilder::new().id("evt_dup").event_type("invoice.paid").build();
        processor.process(event.clone()).await.unwrap();
        let outcome = processor.process(event).await.unwrap();

        assert_eq!(outcome, ProcessOutcome::Duplicate);
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn failed_event_is_reclaimable() {
        let handler = CountingHandler::failing(vec![ProviderEventType::InvoicePaid]);
        let (processor, ledger) = processor_with(Arc::clone(&handler));

        let event = ProviderEventBuilder::new().id("evt_f").event_type("invoice.paid").build();
        assert!(processor.process(event.clone()).await.is_err());

        let entry = ledger.find("evt_f").await.unwrap().unwrap();
        assert_eq!(entry.status, LedgerStatus::Failed);
        assert_eq!(entry.retry_count, 1);

        // A redelivery claims the failed row and runs the handler again.
        assert!(processor.process(event).await.is_err());
        assert_eq!(handler.calls(), 2);
        let entry = ledger.find("evt_f").await.unwrap().unwrap();
        assert_eq!(entry.retry_count, 2);
    }

    #[tokio::test]
    async fn unhandled_type_is_acknowledged_and_recorded() {
        let handler = CountingHandler::new(vec![ProviderEventType::InvoicePaid]);
        let (processor, ledger) = processor_with(Arc::clone(&handler));

        let event = ProviderEventBuilder::new()
            .id("evt_u")
            .event_type("customer.subscription.paused")
            .build();
        let outcome = processor.process(event).await.unwrap();

        assert!(matches!(outcome, ProcessOutcome::Ignored(_)));
        assert_eq!(handler.calls(), 0);
        // Recorded as succeeded so redeliveries short-circuit.
        let entry = ledger.find("evt_u").await.unwrap().unwrap();
        assert_eq!(entry.status, LedgerStatus::Succeeded);
    }

    #[tokio::test]
    async fn concurrent_duplicates_yield_exactly_one_claim() {
        let handler = CountingHandler::new(vec![ProviderEventType::InvoicePaid]);
        let (processor, _ledger) = processor_with(Arc::clone(&handler));
        let processor = Arc::new(processor);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let processor = Arc::clone(&processor);
            let event =
                ProviderEventBuilder::new().id("evt_race").event_type("invoice.paid").build();
            tasks.push(tokio::spawn(async move { processor.process(event).await }));
        }

        let mut processed = 0;
        let mut backed_off = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(ProcessOutcome::Processed) => processed += 1,
                Ok(ProcessOutcome::Duplicate) | Err(WebhookError::InFlight(_)) => backed_off += 1,
                other => panic!("unexpected outcome: {:?}", other),
            }
        }

        assert_eq!(processed, 1);
        assert_eq!(backed_off, 7);
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn dispatcher_routes_by_declared_types() {
        let checkout = CountingHandler::new(vec![ProviderEventType::CheckoutCompleted]);
        let invoices = CountingHandler::new(vec![
            ProviderEventType::InvoicePaid,
            ProviderEventType::InvoicePaymentFailed,
        ]);
        let dispatcher = EventDispatcher::new()
            .register(Arc::clone(&checkout) as _)
            .register(Arc::clone(&invoices) as _);

        let event = ProviderEventBuilder::new().event_type("invoice.payment_failed").build();
        dispatcher.dispatch(&event).await.unwrap();

        assert_eq!(checkout.calls(), 0);
        assert_eq!(invoices.calls(), 1);
    }
}
