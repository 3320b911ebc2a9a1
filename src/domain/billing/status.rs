//! Subscription status values as synchronized from the payment provider.

use serde::{Deserialize, Serialize};

/// Current state of a user's subscription in the billing lifecycle.
///
/// The variants mirror the provider's subscription statuses plus two
/// app-side states: `Trial` (no provider subscription yet) and `Admin`
/// (bypasses billing entirely).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// App-side trial, before any paid subscription exists.
    Trial,

    /// Paid and current.
    Active,

    /// Cancellation requested; access continues until period end.
    Canceled,

    /// Payment failed, provider is retrying.
    PastDue,

    /// Payment retries exhausted.
    Unpaid,

    /// Initial payment never completed.
    Incomplete,

    /// Initial payment window elapsed without completion.
    IncompleteExpired,

    /// Operator account, unlimited access.
    Admin,
}

impl SubscriptionStatus {
    /// Parses a status string as stored or delivered by the provider.
    ///
    /// Unknown values fall back to `Trial` with a logged warning rather
    /// than failing: a new provider status must never take the billing
    /// pipeline down.
    pub fn parse(s: &str) -> Self {
        match s {
            "trial" => Self::Trial,
            // The provider reports in-trial paid subscriptions as "trialing".
            "trialing" => Self::Trial,
            "active" => Self::Active,
            "canceled" => Self::Canceled,
            "past_due" => Self::PastDue,
            "unpaid" => Self::Unpaid,
            "incomplete" => Self::Incomplete,
            "incomplete_expired" => Self::IncompleteExpired,
            "admin" => Self::Admin,
            other => {
                tracing::warn!(status = other, "Unknown subscription status, treating as trial");
                Self::Trial
            }
        }
    }

    /// Returns the canonical string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Active => "active",
            Self::Canceled => "canceled",
            Self::PastDue => "past_due",
            Self::Unpaid => "unpaid",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_statuses() {
        assert_eq!(SubscriptionStatus::parse("active"), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::parse("canceled"), SubscriptionStatus::Canceled);
        assert_eq!(SubscriptionStatus::parse("past_due"), SubscriptionStatus::PastDue);
        assert_eq!(SubscriptionStatus::parse("unpaid"), SubscriptionStatus::Unpaid);
        assert_eq!(SubscriptionStatus::parse("incomplete"), SubscriptionStatus::Incomplete);
        assert_eq!(
            SubscriptionStatus::parse("incomplete_expired"),
            SubscriptionStatus::IncompleteExpired
        );
        assert_eq!(SubscriptionStatus::parse("admin"), SubscriptionStatus::Admin);
    }

    #[test]
    fn provider_trialing_maps_to_trial() {
        assert_eq!(SubscriptionStatus::parse("trialing"), SubscriptionStatus::Trial);
    }

    #[test]
    fn unknown_status_falls_back_to_trial() {
        assert_eq!(SubscriptionStatus::parse("paused"), SubscriptionStatus::Trial);
        assert_eq!(SubscriptionStatus::parse(""), SubscriptionStatus::Trial);
    }

    #[test]
    fn as_str_roundtrips() {
        for status in [
            SubscriptionStatus::Trial,
            SubscriptionStatus::Active,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Unpaid,
            SubscriptionStatus::Incomplete,
            SubscriptionStatus::IncompleteExpired,
            SubscriptionStatus::Admin,
        ] {
            assert_eq!(SubscriptionStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&SubscriptionStatus::IncompleteExpired).unwrap();
        assert_eq!(json, "\"incomplete_expired\"");
    }
}
