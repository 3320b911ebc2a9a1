//! Redis-backed sliding-window rate limiter.
//!
//! Each key is a sorted set of request timestamps scored in milliseconds.
//! A check trims entries older than the window, counts the rest, and on
//! success records the request and refreshes the key's TTL so idle keys
//! expire on their own. Shared across instances; the small read-then-add
//! race can overshoot the limit by at most the number of instances.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::ports::{RateLimitDecision, RateLimitError, RateLimiter};

use super::RateLimitConfig;

pub struct RedisRateLimiter {
    connection: MultiplexedConnection,
    config: RateLimitConfig,
}

impl RedisRateLimiter {
    /// Connects to Redis at the given URL.
    pub async fn connect(url: &str, config: RateLimitConfig) -> Result<Self, RateLimitError> {
        let client = redis::Client::open(url)
            .map_err(|e| RateLimitError::Storage(format!("Invalid Redis URL: {}", e)))?;
        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| RateLimitError::Storage(format!("Redis connection failed: {}", e)))?;
        Ok(Self { connection, config })
    }

    fn redis_key(key: &str) -> String {
        format!("ratelimit:{}", key)
    }

    fn now_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, key: &str) -> Result<RateLimitDecision, RateLimitError> {
        let mut conn = self.connection.clone();
        let redis_key = Self::redis_key(key);
        let now_ms = Self::now_millis();
        let window_ms = self.config.window_secs * 1000;
        let window_start_ms = now_ms.saturating_sub(window_ms);

        let (count,): (u32,) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&redis_key)
            .arg(0)
            .arg(window_start_ms)
            .ignore()
            .zcard(&redis_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Storage(e.to_string()))?;

        if count >= self.config.max_requests {
            let oldest: Vec<(String, u64)> = conn
                .zrange_withscores(&redis_key, 0, 0)
                .await
                .map_err(|e| RateLimitError::Storage(e.to_string()))?;
            let retry_after_secs = oldest
                .first()
                .map(|(_, score)| (score + window_ms).saturating_sub(now_ms) / 1000)
                .unwrap_or(self.config.window_secs)
                .max(1);
            return Ok(RateLimitDecision::Denied { retry_after_secs });
        }

        // Member must be unique per request; the score carries the time.
        let member = format!("{}-{}", now_ms, uuid::Uuid::new_v4());
        redis::pipe()
            .atomic()
            .zadd(&redis_key, member, now_ms)
            .ignore()
            .expire(&redis_key, self.config.window_secs as usize)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| RateLimitError::Storage(e.to_string()))?;

        Ok(RateLimitDecision::Allowed {
            remaining: self.config.max_requests - count - 1,
        })
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(Self::redis_key(key))
            .await
            .map_err(|e| RateLimitError::Storage(e.to_string()))?;
        Ok(())
    }
}
