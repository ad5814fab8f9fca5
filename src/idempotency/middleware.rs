//! Idempotency middleware for Axum.
//!
//! Buffers the request body, claims the client-supplied `Idempotency-Key`
//! through an insert-if-absent, and settles the claim from the response.
//! Duplicate deliveries replay the stored outcome instead of re-executing
//! the handler.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::store::{IdempotencyRecord, IdempotencyStatus, IdempotencyStore};
use crate::error::AppError;
use crate::gateway::state::AppState;

/// Cap on buffered request and response bodies. Payment payloads are a few
/// hundred bytes; anything near this limit is not a legitimate request.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Matches the VARCHAR(255) key column.
const MAX_KEY_LEN: usize = 255;

/// Bound on the claim loop. Each pass either claims the key, resolves
/// against the record that beat us, or clears a dead record and retries.
const CLAIM_ATTEMPTS: usize = 3;

/// Axum middleware implementing exactly-once semantics per key.
///
/// Requests without the header pass through untouched. Works per route, so
/// it must be layered onto the mutating endpoints only.
pub async fn idempotency_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    // Step 1: No header means no guard; execute unconditionally.
    let key = match extract_idempotency_key(request.headers())? {
        Some(k) => k.to_string(),
        None => return Ok(next.run(request).await),
    };

    // Step 2: Buffer the body. The hash decides whether a reused key
    // carries the same payload as the first delivery.
    let (parts, body) = request.into_parts();
    let body_bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AppError::Validation("Request body too large".to_string()))?;
    let body_hash = body_sha256_hex(&body_bytes);
    let method = parts.method.as_str().to_string();
    let path = parts.uri.path().to_string();

    // Step 3: Claim the key, or resolve against the record that holds it.
    let pool = state.db.pool();
    let ttl_hours = state.config.idempotency.ttl_hours;
    let mut claimed = false;
    for _ in 0..CLAIM_ATTEMPTS {
        match IdempotencyStore::find(pool, &key).await? {
            None => {
                if IdempotencyStore::try_create(pool, &key, &method, &path, &body_hash, ttl_hours)
                    .await?
                    .is_some()
                {
                    claimed = true;
                    break;
                }
                // Lost the insert race; loop around and read what won.
            }
            Some(record) => {
                if record.is_expired() {
                    IdempotencyStore::delete(pool, &key).await?;
                    continue;
                }
                if record.request_body_hash != body_hash {
                    return Err(AppError::IdempotencyConflict(
                        "Idempotency key reused with different request body".to_string(),
                    ));
                }
                match record.status {
                    IdempotencyStatus::Completed => {
                        tracing::debug!(key = %key, "replaying stored idempotent response");
                        return replay_response(&record);
                    }
                    IdempotencyStatus::InProgress => {
                        return Err(AppError::IdempotencyConflict(
                            "Request is already being processed".to_string(),
                        ));
                    }
                    IdempotencyStatus::Failed => {
                        // Failed attempts are retryable under the same key.
                        IdempotencyStore::delete(pool, &key).await?;
                    }
                }
            }
        }
    }
    if !claimed {
        return Err(AppError::IdempotencyConflict(
            "Request is already being processed".to_string(),
        ));
    }

    // Step 4: Execute the handler with the buffered body restored.
    let request = Request::from_parts(parts, Body::from(body_bytes));
    let response = next.run(request).await;

    // Step 5: Settle the claim. Success outcomes store the response for
    // replay; error outcomes are recorded FAILED so the caller can retry.
    let (resp_parts, resp_body) = response.into_parts();
    let resp_bytes = axum::body::to_bytes(resp_body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to buffer response body: {}", e)))?;
    let status_code = resp_parts.status.as_u16() as i32;

    if status_code < 400 {
        let body_json: serde_json::Value =
            serde_json::from_slice(&resp_bytes).unwrap_or(serde_json::Value::Null);
        IdempotencyStore::mark_completed(pool, &key, status_code, body_json).await?;
    } else {
        IdempotencyStore::mark_failed(pool, &key, status_code).await?;
    }

    Ok(Response::from_parts(resp_parts, Body::from(resp_bytes)))
}

/// Extract and validate the `Idempotency-Key` header.
///
/// Returns `Ok(None)` when the header is absent, which disables the guard
/// for that request.
pub fn extract_idempotency_key(headers: &HeaderMap) -> Result<Option<&str>, AppError> {
    let Some(value) = headers.get("Idempotency-Key") else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map_err(|_| AppError::Validation("Idempotency-Key header is not valid text".to_string()))?;
    if key.is_empty() {
        return Err(AppError::Validation(
            "Idempotency-Key must not be empty".to_string(),
        ));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(AppError::Validation(format!(
            "Idempotency-Key must be at most {} characters",
            MAX_KEY_LEN
        )));
    }
    Ok(Some(key))
}

/// Hex-encoded SHA-256 of the raw request body bytes.
pub fn body_sha256_hex(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// Rebuild the stored response verbatim: same status code, same JSON body.
fn replay_response(record: &IdempotencyRecord) -> Result<Response, AppError> {
    let status = StatusCode::from_u16(record.status_code.unwrap_or(200) as u16)
        .map_err(|_| AppError::Internal("Stored response has an invalid status code".to_string()))?;
    let body = record
        .response_body
        .clone()
        .unwrap_or(serde_json::Value::Null);
    let bytes = serde_json::to_vec(&body)
        .map_err(|e| AppError::Internal(format!("Failed to serialize stored response: {}", e)))?;

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .map_err(|e| AppError::Internal(format!("Failed to build replay response: {}", e)))
}
