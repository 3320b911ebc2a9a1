//! The canonical subscription record - single source of truth for a
//! user's billing state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::{Timestamp, UserId};

use super::status::SubscriptionStatus;

/// Default length of the app-side trial granted at signup.
pub const DEFAULT_TRIAL_DAYS: i64 = 7;

/// Errors raised by guarded mutations on the record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// A reactivation carried a period end earlier than the one already
    /// granted; applying it would shorten paid-for access.
    #[error("Period end regression: fetched {fetched} is earlier than stored {stored}")]
    PeriodEndRegression { stored: Timestamp, fetched: Timestamp },
}

/// One row per user, mutated in place by the reconciler.
///
/// All mutations that could violate a billing invariant go through the
/// guarded methods below; handlers never assign the fields directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Owning user.
    pub user_id: UserId,

    /// Recipient address for lifecycle emails.
    pub email: String,

    /// Current lifecycle status.
    pub status: SubscriptionStatus,

    /// Provider subscription id, absent until first checkout completes.
    pub subscription_id: Option<String>,

    /// Start of the current paid period.
    pub subscription_start: Option<Timestamp>,

    /// End of the current paid period; canceled users keep access until
    /// this instant.
    pub subscription_end: Option<Timestamp>,

    /// App-side trial window.
    pub trial_start: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,

    /// Provider customer id, created lazily at first checkout.
    pub provider_customer_id: Option<String>,

    /// Operator flag; bypasses all billing logic.
    pub is_admin: bool,
}

impl SubscriptionRecord {
    /// Creates the record for a freshly signed-up user: trialing, with a
    /// 7-day window starting now.
    pub fn at_signup(user_id: UserId, email: impl Into<String>, now: Timestamp) -> Self {
        Self {
            user_id,
            email: email.into(),
            status: SubscriptionStatus::Trial,
            subscription_id: None,
            subscription_start: None,
            subscription_end: None,
            trial_start: Some(now),
            trial_end: Some(now.add_days(DEFAULT_TRIAL_DAYS)),
            provider_customer_id: None,
            is_admin: false,
        }
    }

    /// Whole days of app-side trial left, floored, never negative.
    pub fn remaining_trial_days(&self, now: Timestamp) -> i64 {
        match self.trial_end {
            Some(end) if end.is_after(&now) => now.seconds_until(&end) / 86_400,
            _ => 0,
        }
    }

    /// True once the record has ever been attached to a provider
    /// subscription, even one that later ended.
    pub fn has_held_subscription(&self) -> bool {
        self.subscription_id.is_some() || self.subscription_start.is_some()
    }

    /// Synchronizes status and period bounds from a freshly fetched
    /// provider subscription object.
    ///
    /// This is the ordinary-update path; the cancellation and
    /// reactivation paths have dedicated methods with stricter guards.
    pub fn sync_from_provider(
        &mut self,
        subscription_id: &str,
        status: SubscriptionStatus,
        period_start: Timestamp,
        period_end: Timestamp,
        trial_end: Option<Timestamp>,
    ) {
        self.subscription_id = Some(subscription_id.to_string());
        self.status = status;
        self.subscription_start = Some(period_start);
        self.subscription_end = Some(period_end);
        if let Some(te) = trial_end {
            self.trial_end = Some(te);
        }
    }

    /// Applies a provider-confirmed cancellation.
    ///
    /// The subscription id is kept: access persists until period end and
    /// reactivation must remain possible. An explicit cancellation is the
    /// one path allowed to move `subscription_end` earlier.
    pub fn apply_cancellation(&mut self, period_end: Timestamp) {
        self.status = SubscriptionStatus::Canceled;
        self.subscription_end = Some(period_end);
    }

    /// Applies a provider-confirmed reactivation (canceled -> active).
    ///
    /// `subscription_start` is left untouched, and the fetched period end
    /// must not be earlier than what the user was already granted.
    pub fn apply_reactivation(&mut self, fetched_period_end: Timestamp) -> Result<(), RecordError> {
        if let Some(stored) = self.subscription_end {
            if fetched_period_end.is_before(&stored) {
                return Err(RecordError::PeriodEndRegression {
                    stored,
                    fetched: fetched_period_end,
                });
            }
        }
        self.status = SubscriptionStatus::Active;
        self.subscription_end = Some(fetched_period_end);
        Ok(())
    }

    /// Marks the record past due after a failed invoice payment.
    ///
    /// Non-destructive: subscription id and period bounds are kept so a
    /// later successful retry restores the previous state.
    pub fn mark_past_due(&mut self) {
        self.status = SubscriptionStatus::PastDue;
    }

    /// Applies a subscription termination, but only when the deleted id
    /// matches the stored one.
    ///
    /// A user who canceled their old subscription and immediately checked
    /// out a new one may receive the deletion for the old id after the
    /// record already points at the replacement; that event must be a
    /// no-op. Returns whether the record was mutated.
    pub fn apply_termination(&mut self, deleted_subscription_id: &str, period_end: Option<Timestamp>) -> bool {
        match &self.subscription_id {
            Some(current) if current == deleted_subscription_id => {
                self.status = SubscriptionStatus::Canceled;
                self.subscription_id = None;
                if let Some(end) = period_end {
                    self.subscription_end = Some(end);
                }
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SubscriptionRecord {
        SubscriptionRecord::at_signup(UserId::new(), "user@example.com", Timestamp::now())
    }

    #[test]
    fn signup_record_starts_trialing_with_seven_day_window() {
        let now = Timestamp::now();
        let rec = SubscriptionRecord::at_signup(UserId::new(), "a@b.se", now);

        assert_eq!(rec.status, SubscriptionStatus::Trial);
        assert_eq!(rec.trial_start, Some(now));
        assert_eq!(rec.trial_end, Some(now.add_days(7)));
        assert!(rec.subscription_id.is_none());
        assert!(!rec.is_admin);
    }

    #[test]
    fn remaining_trial_days_floors() {
        let now = Timestamp::now();
        let mut rec = record();
        // 5 days minus one second left: floor to 4.
        rec.trial_end = Some(now.add_days(5).add_secs(-1));
        assert_eq!(rec.remaining_trial_days(now), 4);
    }

    #[test]
    fn remaining_trial_days_zero_after_expiry() {
        let now = Timestamp::now();
        let mut rec = record();
        rec.trial_end = Some(now.add_days(-1));
        assert_eq!(rec.remaining_trial_days(now), 0);
    }

    #[test]
    fn sync_from_provider_sets_all_period_fields() {
        let now = Timestamp::now();
        let mut rec = record();

        rec.sync_from_provider(
            "sub_123",
            SubscriptionStatus::Active,
            now,
            now.add_days(30),
            None,
        );

        assert_eq!(rec.subscription_id.as_deref(), Some("sub_123"));
        assert_eq!(rec.status, SubscriptionStatus::Active);
        assert_eq!(rec.subscription_start, Some(now));
        assert_eq!(rec.subscription_end, Some(now.add_days(30)));
    }

    #[test]
    fn cancellation_keeps_subscription_id() {
        let now = Timestamp::now();
        let mut rec = record();
        rec.sync_from_provider("sub_123", SubscriptionStatus::Active, now, now.add_days(30), None);

        rec.apply_cancellation(now.add_days(30));

        assert_eq!(rec.status, SubscriptionStatus::Canceled);
        assert_eq!(rec.subscription_id.as_deref(), Some("sub_123"));
        assert_eq!(rec.subscription_end, Some(now.add_days(30)));
    }

    #[test]
    fn reactivation_preserves_start_and_rejects_regression() {
        let now = Timestamp::now();
        let start = now.add_days(-10);
        let mut rec = record();
        rec.sync_from_provider("sub_123", SubscriptionStatus::Active, start, now.add_days(20), None);
        rec.apply_cancellation(now.add_days(20));

        // Regressing period end is refused.
        let err = rec.apply_reactivation(now.add_days(10)).unwrap_err();
        assert!(matches!(err, RecordError::PeriodEndRegression { .. }));
        assert_eq!(rec.status, SubscriptionStatus::Canceled);
        assert_eq!(rec.subscription_end, Some(now.add_days(20)));

        // Equal or later period end is accepted; start never moves.
        rec.apply_reactivation(now.add_days(20)).unwrap();
        assert_eq!(rec.status, SubscriptionStatus::Active);
        assert_eq!(rec.subscription_start, Some(start));
        assert_eq!(rec.subscription_end, Some(now.add_days(20)));
    }

    #[test]
    fn past_due_is_non_destructive() {
        let now = Timestamp::now();
        let mut rec = record();
        rec.sync_from_provider("sub_123", SubscriptionStatus::Active, now, now.add_days(30), None);

        rec.mark_past_due();

        assert_eq!(rec.status, SubscriptionStatus::PastDue);
        assert_eq!(rec.subscription_id.as_deref(), Some("sub_123"));
        assert_eq!(rec.subscription_end, Some(now.add_days(30)));
    }

    #[test]
    fn termination_for_matching_id_clears_subscription() {
        let now = Timestamp::now();
        let mut rec = record();
        rec.sync_from_provider("sub_A", SubscriptionStatus::Active, now, now.add_days(30), None);

        assert!(rec.apply_termination("sub_A", Some(now)));
        assert_eq!(rec.status, SubscriptionStatus::Canceled);
        assert!(rec.subscription_id.is_none());
        assert_eq!(rec.subscription_end, Some(now));
    }

    #[test]
    fn termination_for_replaced_subscription_is_ignored() {
        let now = Timestamp::now();
        let mut rec = record();
        rec.sync_from_provider("sub_B", SubscriptionStatus::Active, now, now.add_days(30), None);

        let before = rec.clone();
        assert!(!rec.apply_termination("sub_A", Some(now.add_days(-1))));
        assert_eq!(rec, before);
    }

    #[test]
    fn has_held_subscription_tracks_history() {
        let now = Timestamp::now();
        let mut rec = record();
        assert!(!rec.has_held_subscription());

        rec.sync_from_provider("sub_A", SubscriptionStatus::Active, now, now.add_days(30), None);
        rec.apply_termination("sub_A", None);

        // Id is cleared but the period stamps remain.
        assert!(rec.has_held_subscription());
    }
}
