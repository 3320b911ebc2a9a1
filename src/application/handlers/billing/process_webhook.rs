//! Webhook ingress orchestration: verify, claim, dispatch, record.
//!
//! The raw body is verified before JSON decoding and before any ledger
//! interaction; a forged request never leaves a trace in the ledger.

use std::sync::Arc;

use crate::domain::billing::{
    EventDispatcher, IdempotentWebhookProcessor, ProcessOutcome, WebhookError, WebhookVerifier,
};
use crate::ports::WebhookLedger;

/// Front door for provider webhook deliveries.
pub struct WebhookService {
    verifier: WebhookVerifier,
    processor: IdempotentWebhookProcessor,
}

impl WebhookService {
    pub fn new(
        verifier: WebhookVerifier,
        ledger: Arc<dyn WebhookLedger>,
        dispatcher: EventDispatcher,
    ) -> Self {
        Self {
            verifier,
            processor: IdempotentWebhookProcessor::new(ledger, dispatcher),
        }
    }

    /// Handles one delivery: raw body plus signature header in, terminal
    /// outcome or mapped error out.
    pub async fn handle(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<ProcessOutcome, WebhookError> {
        let event = self.verifier.verify_and_parse(payload, signature_header)?;

        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            livemode = event.livemode,
            "Webhook signature verified"
        );

        self.processor.process(event).await
    }
}
