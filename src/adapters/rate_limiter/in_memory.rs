//! In-memory sliding-window rate limiter.
//!
//! Keeps per-key request timestamps and counts only those inside the
//! window, so a burst does not get a fresh allowance at an arbitrary
//! window boundary. Single-process only; multi-instance deployments use
//! the Redis implementation.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ports::{RateLimitDecision, RateLimitError, RateLimiter};

use super::RateLimitConfig;

pub struct InMemoryRateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, Vec<u64>>>,
}

impl InMemoryRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: &str) -> Result<RateLimitDecision, RateLimitError> {
        let now = Self::now_secs();
        let window_start = now.saturating_sub(self.config.window_secs);

        let mut windows = self.windows.lock().await;
        let stamps = windows.entry(key.to_string()).or_default();

        stamps.retain(|&t| t > window_start);

        if stamps.len() >= self.config.max_requests as usize {
            let oldest = stamps.iter().min().copied().unwrap_or(now);
            let retry_after_secs = (oldest + self.config.window_secs).saturating_sub(now).max(1);
            return Ok(RateLimitDecision::Denied { retry_after_secs });
        }

        stamps.push(now);
        let remaining = self.config.max_requests - stamps.len() as u32;
        Ok(RateLimitDecision::Allowed { remaining })
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        self.windows.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_secs: u64) -> InMemoryRateLimiter {
        InMemoryRateLimiter::new(RateLimitConfig { max_requests, window_secs })
    }

    #[tokio::test]
    async fn allows_up_to_the_limit_then_denies() {
        let limiter = limiter(3, 300);

        for expected_remaining in [2, 1, 0] {
            match limiter.check("user:1").await.unwrap() {
                RateLimitDecision::Allowed { remaining } => {
                    assert_eq!(remaining, expected_remaining)
                }
                other => panic!("expected allow, got {:?}", other),
            }
        }

        let decision = limiter.check("user:1").await.unwrap();
        assert!(!decision.is_allowed());
        if let RateLimitDecision::Denied { retry_after_secs } = decision {
            assert!(retry_after_secs >= 1);
        }
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = limiter(1, 300);

        assert!(limiter.check("user:1").await.unwrap().is_allowed());
        assert!(limiter.check("user:2").await.unwrap().is_allowed());
        assert!(!limiter.check("user:1").await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn reset_restores_the_allowance() {
        let limiter = limiter(1, 300);

        assert!(limiter.check("user:1").await.unwrap().is_allowed());
        assert!(!limiter.check("user:1").await.unwrap().is_allowed());

        limiter.reset("user:1").await.unwrap();
        assert!(limiter.check("user:1").await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn zero_length_window_never_blocks() {
        let limiter = limiter(1, 0);

        assert!(limiter.check("user:1").await.unwrap().is_allowed());
        assert!(limiter.check("user:1").await.unwrap().is_allowed());
    }
}
