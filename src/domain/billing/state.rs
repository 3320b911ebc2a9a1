//! Derived subscription state - the pure access decision.
//!
//! `SubscriptionState::calculate` is a pure function over the canonical
//! record and the current time. It is computed on demand for every
//! request and never cached: a webhook may have changed the record a
//! millisecond ago.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

use super::record::{SubscriptionRecord, DEFAULT_TRIAL_DAYS};
use super::status::SubscriptionStatus;

/// Coarse access tier derived from the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    FullAccess,
    LimitedAccess,
    NoAccess,
    AdminAccess,
}

/// Complete derived state for one user at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub status: SubscriptionStatus,
    pub access_level: AccessLevel,
    pub trial_start: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,
    pub subscription_start: Option<Timestamp>,
    pub subscription_end: Option<Timestamp>,
    /// Whole days until the relevant boundary, floored; `None` when there
    /// is no boundary (admin, active with no period end).
    pub days_remaining: Option<i64>,
    pub is_expired: bool,
    pub can_access_app: bool,
    pub should_redirect_to_pricing: bool,
    pub reactivation_available: bool,
}

impl SubscriptionState {
    /// Computes the derived state from the canonical record.
    ///
    /// Admin accounts short-circuit everything. For everyone else the
    /// decision depends only on the status and the relevant boundary
    /// timestamp compared against `now`.
    pub fn calculate(record: &SubscriptionRecord, now: Timestamp) -> Self {
        if record.is_admin {
            return Self::admin(record);
        }

        match record.status {
            SubscriptionStatus::Trial => Self::for_trial(record, now),
            SubscriptionStatus::Active => Self::for_active(record, now),
            SubscriptionStatus::Canceled => Self::for_canceled(record, now),
            SubscriptionStatus::PastDue => Self::blocked(record, SubscriptionStatus::PastDue, true),
            SubscriptionStatus::Unpaid => Self::blocked(record, SubscriptionStatus::Unpaid, false),
            SubscriptionStatus::Incomplete => {
                Self::blocked(record, SubscriptionStatus::Incomplete, false)
            }
            SubscriptionStatus::IncompleteExpired => {
                Self::blocked(record, SubscriptionStatus::IncompleteExpired, false)
            }
            // A stored `admin` status without the flag set is treated as
            // the flag: operators are never locked out by a stale column.
            SubscriptionStatus::Admin => Self::admin(record),
        }
    }

    /// Human-readable reason string for the access decision, consumed by
    /// the access gate API.
    pub fn reason(&self) -> &'static str {
        match (self.status, self.can_access_app) {
            (SubscriptionStatus::Admin, _) => "admin",
            (SubscriptionStatus::Trial, true) => "trial_active",
            (SubscriptionStatus::Trial, false) => "trial_expired",
            (SubscriptionStatus::Active, true) => "subscription_active",
            (SubscriptionStatus::Active, false) => "subscription_expired",
            (SubscriptionStatus::Canceled, true) => "canceled_grace_period",
            (SubscriptionStatus::Canceled, false) => "subscription_expired",
            (SubscriptionStatus::PastDue, _) => "payment_past_due",
            (SubscriptionStatus::Unpaid, _) => "payment_unpaid",
            (SubscriptionStatus::Incomplete, _) => "payment_incomplete",
            (SubscriptionStatus::IncompleteExpired, _) => "payment_incomplete_expired",
        }
    }

    fn admin(record: &SubscriptionRecord) -> Self {
        Self {
            status: SubscriptionStatus::Admin,
            access_level: AccessLevel::AdminAccess,
            trial_start: record.trial_start,
            trial_end: record.trial_end,
            subscription_start: record.subscription_start,
            subscription_end: record.subscription_end,
            days_remaining: None,
            is_expired: false,
            can_access_app: true,
            should_redirect_to_pricing: false,
            reactivation_available: false,
        }
    }

    fn for_trial(record: &SubscriptionRecord, now: Timestamp) -> Self {
        // Missing trial stamps mean a record created before the trial
        // columns were populated: treat as a fresh 7-day trial.
        let trial_start = record.trial_start.unwrap_or(now);
        let trial_end = match (record.trial_start, record.trial_end) {
            (_, Some(end)) => end,
            (Some(start), None) => start.add_days(DEFAULT_TRIAL_DAYS),
            (None, None) => now.add_days(DEFAULT_TRIAL_DAYS),
        };

        let is_expired = !now.is_before(&trial_end);
        Self {
            status: SubscriptionStatus::Trial,
            access_level: if is_expired { AccessLevel::NoAccess } else { AccessLevel::FullAccess },
            trial_start: Some(trial_start),
            trial_end: Some(trial_end),
            subscription_start: None,
            subscription_end: None,
            days_remaining: Some(days_until(now, trial_end)),
            is_expired,
            can_access_app: !is_expired,
            should_redirect_to_pricing: is_expired,
            reactivation_available: false,
        }
    }

    fn for_active(record: &SubscriptionRecord, now: Timestamp) -> Self {
        let (is_expired, days_remaining) = match record.subscription_end {
            Some(end) => (!now.is_before(&end), Some(days_until(now, end))),
            // No period end on file: the provider has not reported one
            // yet, so the subscription is treated as current.
            None => (false, None),
        };

        Self {
            status: SubscriptionStatus::Active,
            access_level: if is_expired { AccessLevel::NoAccess } else { AccessLevel::FullAccess },
            trial_start: None,
            trial_end: None,
            subscription_start: record.subscription_start,
            subscription_end: record.subscription_end,
            days_remaining,
            is_expired,
            can_access_app: !is_expired,
            should_redirect_to_pricing: is_expired,
            reactivation_available: false,
        }
    }

    /// Canceled users keep full access until `subscription_end`, and may
    /// reactivate during exactly that window. A canceled record with no
    /// end date on file has nothing left to grant.
    fn for_canceled(record: &SubscriptionRecord, now: Timestamp) -> Self {
        let (can_access, days_remaining) = match record.subscription_end {
            Some(end) if now.is_before(&end) => (true, Some(days_until(now, end))),
            Some(_) => (false, Some(0)),
            None => (false, Some(0)),
        };

        Self {
            status: SubscriptionStatus::Canceled,
            access_level: if can_access { AccessLevel::FullAccess } else { AccessLevel::NoAccess },
            trial_start: None,
            trial_end: None,
            subscription_start: record.subscription_start,
            subscription_end: record.subscription_end,
            days_remaining,
            is_expired: !can_access,
            can_access_app: can_access,
            should_redirect_to_pricing: !can_access,
            reactivation_available: can_access,
        }
    }

    fn blocked(
        record: &SubscriptionRecord,
        status: SubscriptionStatus,
        reactivation_available: bool,
    ) -> Self {
        Self {
            status,
            access_level: AccessLevel::NoAccess,
            trial_start: None,
            trial_end: None,
            subscription_start: record.subscription_start,
            subscription_end: record.subscription_end,
            days_remaining: Some(0),
            is_expired: true,
            can_access_app: false,
            should_redirect_to_pricing: true,
            reactivation_available,
        }
    }
}

/// Whole days until `end`, floored, never negative.
fn days_until(now: Timestamp, end: Timestamp) -> i64 {
    (now.seconds_until(&end).max(0)) / 86_400
}
