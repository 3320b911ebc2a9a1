//! Rate limiter adapters: a sliding-window counter kept in memory for
//! single-instance deployments, and a Redis sorted-set variant with TTL
//! for multi-instance ones.

mod in_memory;
mod redis;

pub use in_memory::InMemoryRateLimiter;
pub use redis::RedisRateLimiter;

/// Window configuration shared by both implementations.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // 100 requests per 5 minutes, the limit applied to billing
        // actions per user.
        Self { max_requests: 100, window_secs: 300 }
    }
}
