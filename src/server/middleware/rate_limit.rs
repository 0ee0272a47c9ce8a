use governor::{
    clock::QuantaClock,
    middleware::NoOpMiddleware,
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use std::{
    net::IpAddr,
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

/// A rate limiter for connection admissions, keyed by peer IP.
///
/// A client host that reconnects faster than the configured rate is
/// held at admission until a slot frees up; connections are delayed,
/// never dropped.
#[derive(Clone)]
pub struct ConnectionRateLimiter {
    /// The underlying rate limiter instance, shared across instances.
    limiter: Arc<RateLimiter<IpAddr, DashMapStateStore<IpAddr>, QuantaClock, NoOpMiddleware>>,
}

impl ConnectionRateLimiter {
    /// Creates a new `ConnectionRateLimiter` with a specified rate limit.
    ///
    /// # Arguments
    ///
    /// * `per_second` - The maximum number of admissions allowed per second.
    ///
    /// # Panics
    ///
    /// This function will panic if `per_second` is zero; configuration
    /// validation rejects that value before a limiter is built.
    pub fn new(per_second: u32) -> Self {
        let burst_size = NonZeroU32::new(per_second)
            .expect("Rate limit must be greater than 0");

        let quota = Quota::with_period(Duration::from_secs(1))
            .unwrap()
            .allow_burst(burst_size);

        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
        }
    }

    /// Waits until a connection from `ip` may be admitted.
    ///
    /// Returns `true` when the admission is allowed.
    pub async fn check(&self, ip: IpAddr) -> bool {
        self.limiter.until_key_ready(&ip).await;
        true
    }
}
