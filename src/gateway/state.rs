//! Shared gateway state.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::Database;
use crate::queue::JobQueue;
use crate::ratelimit::{MemoryCounterStore, RateLimiter};

/// Application state shared across request handlers and middleware.
///
/// Wrapped in one outer `Arc` by the router; the inner `Arc`s exist so
/// the worker pool and maintenance tasks can hold the database and queue
/// independently of the HTTP server's lifetime.
pub struct AppState {
    pub config: AppConfig,
    pub db: Arc<Database>,
    pub queue: Arc<JobQueue>,
    pub global_limiter: RateLimiter,
    pub payment_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: AppConfig, db: Arc<Database>, queue: Arc<JobQueue>) -> Self {
        // Both limiters share one counter store; the scope prefix keeps
        // their windows apart.
        let counters = Arc::new(MemoryCounterStore::new());
        let global_limiter = RateLimiter::new("global", &config.rate_limit.global, counters.clone());
        let payment_limiter = RateLimiter::new("payment", &config.rate_limit.payment, counters);

        Self {
            config,
            db,
            queue,
            global_limiter,
            payment_limiter,
        }
    }
}
