//! Health check handler.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use super::super::state::AppState;
use super::super::types::ApiResponse;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp_ms: u64,
}

/// Rate-gates the database ping and remembers its last verdict.
///
/// Requests inside the interval reuse the stored verdict, so a failed
/// ping keeps reporting unhealthy until the next real check instead of
/// flipping back to healthy for free.
struct HealthCache {
    last_check_ms: AtomicU64,
    healthy: AtomicBool,
}

impl HealthCache {
    const fn new() -> Self {
        Self {
            last_check_ms: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    /// True when the interval has elapsed and this caller won the race to
    /// perform the next ping.
    fn claim_ping(&self, now_ms: u64, interval_ms: u64) -> bool {
        let last = self.last_check_ms.load(Ordering::Relaxed);
        now_ms.saturating_sub(last) > interval_ms
            && self
                .last_check_ms
                .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
    }

    fn record(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    fn last_verdict(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }
}

/// `GET /health`, public.
///
/// Pings the database at most once per interval; requests inside the
/// interval reuse the last verdict so a health-check storm cannot eat
/// pool connections.
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    static CACHE: HealthCache = HealthCache::new();
    const CHECK_INTERVAL_MS: u64 = 5000;

    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let healthy = if CACHE.claim_ping(now_ms, CHECK_INTERVAL_MS) {
        let verdict = match state.db.health_check().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "health check: database ping failed");
                false
            }
        };
        CACHE.record(verdict);
        verdict
    } else {
        CACHE.last_verdict()
    };

    if healthy {
        (
            StatusCode::OK,
            Json(ApiResponse::ok(HealthResponse {
                status: "healthy",
                version: env!("GIT_HASH"),
                timestamp_ms: now_ms,
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::err("Service unavailable")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_ping_sticks_until_next_check() {
        let cache = HealthCache::new();

        assert!(cache.claim_ping(10_000, 5000));
        cache.record(false);

        // Inside the interval nobody re-pings and the bad verdict holds.
        assert!(!cache.claim_ping(12_000, 5000));
        assert!(!cache.last_verdict());

        // After the interval the next caller pings again and can clear it.
        assert!(cache.claim_ping(20_000, 5000));
        cache.record(true);
        assert!(cache.last_verdict());
    }

    #[test]
    fn test_only_one_caller_claims_the_ping() {
        let cache = HealthCache::new();
        assert!(cache.claim_ping(10_000, 5000));
        assert!(!cache.claim_ping(10_000, 5000));
    }
}
