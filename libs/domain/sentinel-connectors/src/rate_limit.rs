use std::num::NonZeroU32;

use governor::{Quota, RateLimiter};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};

/// Per-connector request limiter. Wraps `governor`'s token bucket so a
/// connector never has to reimplement pacing: every outbound call awaits
/// `until_ready` before the request is issued.
pub struct RequestLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl RequestLimiter {
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second.max(1)).unwrap();
        let burst = NonZeroU32::new(burst_size.max(1)).unwrap();
        let quota = Quota::per_second(rps).allow_burst(burst);
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    pub async fn until_ready(&self) {
        self.limiter.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn burst_is_free_then_paces_requests() {
        let limiter = RequestLimiter::new(100, 2);
        let start = Instant::now();
        limiter.until_ready().await;
        limiter.until_ready().await;
        assert!(start.elapsed().as_millis() < 50, "burst should not wait");
    }
}
