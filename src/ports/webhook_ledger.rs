//! WebhookLedger port - idempotency tracking for provider webhook events.
//!
//! The provider delivers at least once, unordered, and redelivers on any
//! non-2xx response. The ledger turns that into at-most-one mutation per
//! event id: a row is claimed before any handler runs, and a terminal
//! `succeeded` row short-circuits every later delivery.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::foundation::DomainError;

/// Processing status of a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerStatus {
    /// A worker holds the claim and is (or was) processing the event.
    Processing,
    /// Terminal: the event was applied; never reprocessed.
    Succeeded,
    /// The last attempt failed; the row is re-claimable.
    Failed,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(Self::Processing),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One row per provider event id.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub event_id: String,
    pub event_type: String,
    pub status: LedgerStatus,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub error_message: Option<String>,
}

/// Result of attempting to claim an event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller owns the event and must mark it succeeded or failed.
    /// Covers fresh ids, re-claimed failed rows, and reclaimed stale
    /// `processing` rows.
    Claimed,
    /// The event already succeeded; respond 200 and do nothing.
    AlreadySucceeded,
    /// Another worker claimed the event recently; ask the provider to
    /// redeliver later.
    InFlight,
}

/// Port for the idempotency ledger.
///
/// Implementations must make `claim_or_get_status` atomic under
/// concurrency: for a given event id, exactly one concurrent caller
/// observes `Claimed`. The Postgres implementation leans on the unique
/// constraint over the event id; no other locking is required.
#[async_trait]
pub trait WebhookLedger: Send + Sync {
    /// Attempts to claim the event id by inserting a `processing` row.
    ///
    /// On conflict, failed rows and `processing` rows older than
    /// `stale_after` are atomically re-claimed; otherwise the existing
    /// row's status decides the outcome.
    async fn claim_or_get_status(
        &self,
        event_id: &str,
        event_type: &str,
        stale_after: Duration,
    ) -> Result<ClaimOutcome, DomainError>;

    /// Terminal success transition.
    async fn mark_succeeded(&self, event_id: &str) -> Result<(), DomainError>;

    /// Failure transition: increments `retry_count`, records the error,
    /// and leaves the row re-claimable.
    async fn mark_failed(&self, event_id: &str, error: &str) -> Result<(), DomainError>;

    /// Looks up a ledger row for inspection.
    async fn find(&self, event_id: &str) -> Result<Option<LedgerEntry>, DomainError>;

    /// Deletes rows received before the cutoff (retention policy).
    ///
    /// Returns the number of rows deleted.
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DomainError>;
}
