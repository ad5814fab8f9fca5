//! HTTP gateway.
//!
//! Router composition and middleware ordering. A request travels:
//! CORS → request trace → global rate limit → API-key auth → (payment
//! creation only) payment rate limit → idempotency guard → handler.

pub mod handlers;
pub mod state;
pub mod trace;
pub mod types;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::auth::api_key_auth;
use crate::idempotency::idempotency_middleware;
use crate::ratelimit::{global_rate_limit, payment_rate_limit};
use state::AppState;

/// Build the application router.
///
/// Split from `run_server` so integration tests can drive the router
/// without binding a socket.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Payment creation carries the strict limiter and the idempotency
    // guard on top of everything the group below applies. Layers run
    // outermost-last, so the rate limit check precedes the guard.
    let payment_create = Router::new()
        .route("/payments", post(handlers::create_payment))
        .layer(from_fn_with_state(state.clone(), idempotency_middleware))
        .layer(from_fn_with_state(state.clone(), payment_rate_limit));

    let api = Router::new()
        .merge(payment_create)
        .route("/payments/{id}", get(handlers::get_payment))
        .route("/accounts", post(handlers::create_account))
        .route("/accounts/{id}", get(handlers::get_account))
        .layer(from_fn_with_state(state.clone(), api_key_auth));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api)
        .layer(from_fn_with_state(state.clone(), global_rate_limit))
        .layer(from_fn(trace::trace_request))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until shutdown is requested.
pub async fn run_server(state: Arc<AppState>, port: u16) -> std::io::Result<()> {
    let addr = format!("{}:{}", state.config.gateway.host, port);
    let app = build_router(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "gateway listening");

    // ConnectInfo carries the peer address the rate limiters key on.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown requested, draining connections");
}
