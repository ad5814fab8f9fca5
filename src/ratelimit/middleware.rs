//! Rate-limit middleware for Axum.
//!
//! Thin wrappers binding the two configured limiter instances to routes.
//! The caller identity is the peer IP, so the server must be started with
//! `into_make_service_with_connect_info::<SocketAddr>()`.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::AppError;
use crate::gateway::state::AppState;

/// Applied to every API route.
pub async fn global_rate_limit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    state.global_limiter.check(&addr.ip().to_string()).await?;
    Ok(next.run(request).await)
}

/// Applied to payment creation only, on top of the global limiter.
pub async fn payment_rate_limit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    state.payment_limiter.check(&addr.ip().to_string()).await?;
    Ok(next.run(request).await)
}
