//! In-memory implementation of the webhook idempotency ledger.
//!
//! Mirrors the claim semantics of the Postgres implementation: a single
//! lock around the map plays the role of the unique constraint, so
//! exactly one concurrent claimant wins.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::foundation::DomainError;
use crate::ports::{ClaimOutcome, LedgerEntry, LedgerStatus, WebhookLedger};

/// Ledger backed by a mutex-guarded map. Not for multi-process use.
pub struct InMemoryWebhookLedger {
    entries: Mutex<HashMap<String, LedgerEntry>>,
}

impl InMemoryWebhookLedger {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryWebhookLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookLedger for InMemoryWebhookLedger {
    async fn claim_or_get_status(
        &self,
        event_id: &str,
        event_type: &str,
        stale_after: Duration,
    ) -> Result<ClaimOutcome, DomainError> {
        let mut entries = self.entries.lock().await;
        let now = Utc::now();

        match entries.get_mut(event_id) {
            None => {
                entries.insert(
                    event_id.to_string(),
                    LedgerEntry {
                        event_id: event_id.to_string(),
                        event_type: event_type.to_string(),
                        status: LedgerStatus::Processing,
                        received_at: now,
                        processed_at: None,
                        retry_count: 0,
                        error_message: None,
                    },
                );
                Ok(ClaimOutcome::Claimed)
            }
            Some(entry) => match entry.status {
                LedgerStatus::Succeeded => Ok(ClaimOutcome::AlreadySucceeded),
                LedgerStatus::Failed => {
                    entry.status = LedgerStatus::Processing;
                    entry.received_at = now;
                    Ok(ClaimOutcome::Claimed)
                }
                LedgerStatus::Processing => {
                    let age = now.signed_duration_since(entry.received_at);
                    if age.num_seconds() >= stale_after.as_secs() as i64 {
                        // The previous claimant is presumed dead.
                        entry.received_at = now;
                        Ok(ClaimOutcome::Claimed)
                    } else {
                        Ok(ClaimOutcome::InFlight)
                    }
                }
            },
        }
    }

    async fn mark_succeeded(&self, event_id: &str) -> Result<(), DomainError> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(event_id) {
            Some(entry) => {
                entry.status = LedgerStatus::Succeeded;
                entry.processed_at = Some(Utc::now());
                entry.error_message = None;
                Ok(())
            }
            None => Err(DomainError::database(format!(
                "No ledger row to mark succeeded: {}",
                event_id
            ))),
        }
    }

    async fn mark_failed(&self, event_id: &str, error: &str) -> Result<(), DomainError> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(event_id) {
            Some(entry) => {
                entry.status = LedgerStatus::Failed;
                entry.processed_at = Some(Utc::now());
                entry.retry_count += 1;
                entry.error_message = Some(error.to_string());
                Ok(())
            }
            None => Err(DomainError::database(format!(
                "No ledger row to mark failed: {}",
                event_id
            ))),
        }
    }

    async fn find(&self, event_id: &str) -> Result<Option<LedgerEntry>, DomainError> {
        Ok(self.entries.lock().await.get(event_id).cloned())
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DomainError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| e.received_at >= cutoff);
        Ok((before - entries.len()) as u64)
    }
}
