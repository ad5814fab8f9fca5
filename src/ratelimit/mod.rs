//! Fixed-window admission control in front of the API.
//!
//! Each caller IP gets an integer counter per time window; the counter
//! key self-expires with the window. Two instances run in sequence: a
//! global limiter across the whole API and a stricter one on payment
//! creation.

pub mod counter;
pub mod middleware;

pub use counter::{CounterStore, MemoryCounterStore};
pub use middleware::{global_rate_limit, payment_rate_limit};

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::RateWindowConfig;
use crate::error::AppError;

pub(crate) fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

/// Fixed-window request limiter over a shared counter store.
///
/// Windows are aligned to the epoch, not to a caller's first request, so
/// a caller straddling a window boundary can land up to twice `limit`
/// requests in a short span. Accepted behavior of the fixed-window
/// scheme, not a defect.
pub struct RateLimiter {
    scope: String,
    window_ms: u64,
    limit: u64,
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(scope: &str, config: &RateWindowConfig, store: Arc<dyn CounterStore>) -> Self {
        Self {
            scope: scope.to_string(),
            window_ms: config.window_ms,
            limit: config.limit,
            store,
        }
    }

    /// Admit or reject one request from `identity`.
    ///
    /// Exactly `limit` requests per window pass; the next one is rejected
    /// with `TooManyRequests`.
    pub async fn check(&self, identity: &str) -> Result<(), AppError> {
        let key = self.window_key(identity, epoch_ms());
        let count = self.store.incr(&key, window_ttl_secs(self.window_ms)).await;

        if count > self.limit {
            tracing::warn!(
                scope = %self.scope,
                identity = %identity,
                count,
                limit = self.limit,
                "rate limit exceeded"
            );
            return Err(AppError::TooManyRequests);
        }
        Ok(())
    }

    // e.g. "ratelimit:payment:192.168.1.1:29251830"
    fn window_key(&self, identity: &str, now_ms: u64) -> String {
        let window_id = now_ms / self.window_ms;
        format!("ratelimit:{}:{}:{}", self.scope, identity, window_id)
    }
}

/// Counter TTL covering the window it belongs to, rounded up to whole
/// seconds.
fn window_ttl_secs(window_ms: u64) -> u64 {
    window_ms.div_ceil(1000)
}
