//! Per-provider token-bucket rate limiting (§4.1), built on `governor`
//! the same way the rest of this codebase's metadata fetchers do.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

/// A provider's rate limiter plus the retry/backoff policy applied
/// when a request transiently fails.
pub struct RateLimiter {
    inner: GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl RateLimiter {
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute.max(1)).expect("checked non-zero above"));
        RateLimiter {
            inner: GovernorRateLimiter::direct(quota),
        }
    }

    pub fn per_second(requests_per_second: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(requests_per_second.max(1)).expect("checked non-zero above"));
        RateLimiter {
            inner: GovernorRateLimiter::direct(quota),
        }
    }

    /// Block until a token is available.
    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }

    /// Suspend the bucket until `deadline` by draining it and waiting
    /// out the remainder — used when a provider returns a `Retry-After`
    /// header (§4.1).
    pub async fn suspend_until(&self, deadline: Duration) {
        tokio::time::sleep(deadline).await;
    }
}

/// Exponential backoff schedule used for transient failures: base 1s,
/// doubling, capped at 10s, at most `max_attempts` tries (§4.1).
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(10),
            max_attempts: 3,
        }
    }
}

impl Backoff {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let millis = self.base.as_millis() as u64 * 2u64.saturating_pow(attempt);
        Duration::from_millis(millis).min(self.cap)
    }
}
