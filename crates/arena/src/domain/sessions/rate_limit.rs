//! Rate limiting (spec.md §4.8): fixed-window counters backed by the
//! Ephemeral Cache so they survive restarts the same way invoice intents do.
//! Unlike the payment pipeline's claim primitives, a missed increment here
//! just lets one extra request through a window — best-effort is the
//! documented tradeoff, not a correctness bug.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::infra::cache::Cache;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    pub const fn per_minutes(max_requests: u32, minutes: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(minutes * 60),
        }
    }
}

/// spec.md §4.8 named buckets.
pub const GLOBAL: RateLimitConfig = RateLimitConfig::per_minutes(100, 15);
pub const AUTH: RateLimitConfig = RateLimitConfig::per_minutes(10, 15);
pub const PAYMENTS: RateLimitConfig = RateLimitConfig::per_minutes(5, 1);
pub const GAME_SUBMIT: RateLimitConfig = RateLimitConfig::per_minutes(20, 1);
pub const ADMIN_BOOTSTRAP: RateLimitConfig = RateLimitConfig::per_minutes(5, 15);

pub struct RateLimiter {
    cache: Arc<dyn Cache>,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Increments the window counter for `(bucket, identity)` and reports
    /// whether this request should be allowed. `identity` is typically the
    /// caller's IP for anonymous buckets or user ID for authenticated ones.
    pub async fn check(&self, bucket: &str, identity: &str, config: RateLimitConfig) -> bool {
        let window_index = OffsetDateTime::now_utc().unix_timestamp() as u64 / config.window.as_secs().max(1);
        let key = format!("ratelimit:{bucket}:{identity}:{window_index}");

        let count = match self.cache.get(&key).await {
            Some(bytes) if bytes.len() == 4 => u32::from_le_bytes(bytes.try_into().unwrap()),
            _ => 0,
        };

        if count >= config.max_requests {
            return false;
        }

        self.cache.set(&key, (count + 1).to_le_bytes().to_vec(), config.window).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::cache::InProcessCache;

    #[tokio::test]
    async fn allows_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new(Arc::new(InProcessCache::new(100)));
        let config = RateLimitConfig::per_minutes(3, 1);

        for _ in 0..3 {
            assert!(limiter.check("test", "1.2.3.4", config).await);
        }
        assert!(!limiter.check("test", "1.2.3.4", config).await);
    }

    #[tokio::test]
    async fn buckets_are_independent_per_identity() {
        let limiter = RateLimiter::new(Arc::new(InProcessCache::new(100)));
        let config = RateLimitConfig::per_minutes(1, 1);

        assert!(limiter.check("test", "a", config).await);
        assert!(!limiter.check("test", "a", config).await);
        assert!(limiter.check("test", "b", config).await);
    }
}
