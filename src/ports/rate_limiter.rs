//! Rate limiting port.
//!
//! A sliding-window counter behind an interface: single-instance
//! deployments use the in-memory implementation, multi-instance ones the
//! Redis-backed implementation with TTL. No global mutable state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateLimitDecision {
    /// Request allowed; one slot consumed.
    Allowed {
        /// Requests left in the current window.
        remaining: u32,
    },
    /// Request denied.
    Denied {
        /// Seconds until a slot frees up.
        retry_after_secs: u64,
    },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

/// Errors from the rate limiter backend.
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit storage error: {0}")]
    Storage(String),
}

/// Port for sliding-window rate limiting.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Checks whether `key` may make another request, consuming a slot
    /// when allowed.
    async fn check(&self, key: &str) -> Result<RateLimitDecision, RateLimitError>;

    /// Clears the window for a key (operator action).
    async fn reset(&self, key: &str) -> Result<(), RateLimitError>;
}
