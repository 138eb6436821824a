use std::sync::Arc;

use async_trait::async_trait;
use repo_insight_common::redis::RedisCache;
use tracing::warn;

const RATE_LIMITED_DETAIL: &str = "Too many requests. Please try again later.";

/// Per-key hit counter that resets after a fixed window.
#[async_trait]
pub trait WindowCounter: Send + Sync {
    /// Count one hit and return the total for the current window, or `None` when the
    /// backend is unavailable.
    async fn incr_with_expiry(&self, key: &str, window_secs: u64) -> Option<i64>;
}

#[async_trait]
impl WindowCounter for RedisCache {
    async fn incr_with_expiry(&self, key: &str, window_secs: u64) -> Option<i64> {
        RedisCache::incr_with_expiry(self, key, window_secs).await
    }
}

/// Fixed-window per-client limiter on a counter keyed `rate_limit:<ip>`.
///
/// Fails open: when the counter is unavailable every request is allowed.
#[derive(Clone)]
pub struct RateLimiter {
    counter: Arc<dyn WindowCounter>,
    max_requests: i64,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(counter: Arc<dyn WindowCounter>, max_requests: i64, window_secs: u64) -> Self {
        Self {
            counter,
            max_requests,
            window_secs,
        }
    }

    pub async fn check(&self, client: &str) -> Result<(), String> {
        let key = format!("rate_limit:{client}");
        let Some(count) = self.counter.incr_with_expiry(&key, self.window_secs).await else {
            warn!(client, "rate limiter unavailable, allowing request");
            return Ok(());
        };
        if count > self.max_requests {
            warn!(client, count, limit = self.max_requests, "rate limit exceeded");
            return Err(RATE_LIMITED_DETAIL.to_string());
        }
        Ok(())
    }
}
