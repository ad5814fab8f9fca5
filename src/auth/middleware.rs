//! Bearer-token authentication middleware.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use uuid::Uuid;

use super::hash_api_key;
use super::repository::ApiKeyRepository;
use crate::error::AppError;
use crate::gateway::state::AppState;

/// Identity attached to the request by this middleware; handlers read it
/// through an `Extension` extractor.
#[derive(Debug, Clone, Copy)]
pub struct AuthedMerchant {
    pub account_id: Uuid,
}

/// Axum middleware authenticating `Authorization: Bearer sk_test_...`.
///
/// The incoming key is hashed and the hash compared against active rows in
/// `api_keys`; the raw key is never stored or logged beyond its prefix.
pub async fn api_key_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    // Step 1: Extract the bearer token.
    let token = extract_bearer_token(request.headers())?;

    // Step 2: Hash and look up. A miss is 403, not 401: the header was
    // well-formed, the credential is just wrong.
    let key_hash = hash_api_key(token);
    let record = ApiKeyRepository::find_active_by_hash(state.db.pool(), &key_hash)
        .await?
        .ok_or_else(|| {
            let prefix: String = token.chars().take(14).collect();
            tracing::warn!(prefix = %prefix, "rejected unknown API key");
            AppError::InvalidApiKey
        })?;

    // Step 3: Attach the merchant identity and continue.
    request.extensions_mut().insert(AuthedMerchant {
        account_id: record.account_id,
    });
    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AppError::MissingApiKey)?
        .to_str()
        .map_err(|_| AppError::MissingApiKey)?;

    match value.split_once(' ') {
        Some(("Bearer", token)) if !token.is_empty() => Ok(token),
        _ => Err(AppError::MissingApiKey),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_valid_bearer() {
        let headers = headers_with("Bearer sk_test_deadbeef");
        assert_eq!(extract_bearer_token(&headers).unwrap(), "sk_test_deadbeef");
    }

    #[test]
    fn test_missing_header_rejected() {
        let headers = HeaderMap::new();
        assert!(matches!(
            extract_bearer_token(&headers),
            Err(AppError::MissingApiKey)
        ));
    }

    #[test]
    fn test_wrong_scheme_rejected() {
        let headers = headers_with("Basic dXNlcjpwYXNz");
        assert!(extract_bearer_token(&headers).is_err());
    }

    #[test]
    fn test_empty_token_rejected() {
        let headers = headers_with("Bearer ");
        assert!(extract_bearer_token(&headers).is_err());
    }

    #[test]
    fn test_bare_token_rejected() {
        let headers = headers_with("sk_test_deadbeef");
        assert!(extract_bearer_token(&headers).is_err());
    }
}
