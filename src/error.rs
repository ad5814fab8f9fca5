//! Application error types.
//!
//! One tagged error enum carries an explicit code and HTTP status for every
//! failure the system can surface, matched exhaustively at the boundary.
//! Workers additionally classify errors as permanent (terminal payment
//! failure) or transient (eligible for retry).

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::gateway::types::ApiResponse;

/// When set, 5xx responses carry the real error message instead of a
/// generic one. Enabled for the dev environment at startup.
static VERBOSE_ERRORS: OnceCell<bool> = OnceCell::new();

pub fn set_verbose_errors(verbose: bool) {
    let _ = VERBOSE_ERRORS.set(verbose);
}

fn verbose_errors() -> bool {
    *VERBOSE_ERRORS.get().unwrap_or(&false)
}

#[derive(Error, Debug, Clone)]
pub enum AppError {
    // === Validation / auth errors ===
    #[error("{0}")]
    Validation(String),

    #[error("Missing or invalid Authorization header")]
    MissingApiKey,

    #[error("Invalid or revoked API key")]
    InvalidApiKey,

    // === Ledger errors ===
    #[error("Transfer amount must be positive")]
    InvalidAmount,

    #[error("Source and destination account cannot be the same")]
    SameAccount,

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Currency mismatch: {0}")]
    CurrencyMismatch(String),

    #[error("Insufficient balance")]
    InsufficientBalance,

    // === Payment / idempotency errors ===
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("{0}")]
    IdempotencyConflict(String),

    #[error("Settlement account not configured")]
    SettlementUnconfigured,

    // === Admission control ===
    #[error("Too many requests")]
    TooManyRequests,

    // === System errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::MissingApiKey => "UNAUTHORIZED",
            AppError::InvalidApiKey => "FORBIDDEN",
            AppError::InvalidAmount => "INVALID_AMOUNT",
            AppError::SameAccount => "SAME_ACCOUNT",
            AppError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            AppError::CurrencyMismatch(_) => "CURRENCY_MISMATCH",
            AppError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            AppError::PaymentNotFound(_) => "PAYMENT_NOT_FOUND",
            AppError::IdempotencyConflict(_) => "IDEMPOTENCY_CONFLICT",
            AppError::SettlementUnconfigured => "SETTLEMENT_UNCONFIGURED",
            AppError::TooManyRequests => "TOO_MANY_REQUESTS",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for the boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Validation(_) | AppError::InvalidAmount | AppError::SameAccount => 400,
            AppError::MissingApiKey => 401,
            AppError::InvalidApiKey => 403,
            AppError::AccountNotFound(_) | AppError::PaymentNotFound(_) => 404,
            AppError::IdempotencyConflict(_) => 409,
            AppError::CurrencyMismatch(_) | AppError::InsufficientBalance => 422,
            AppError::TooManyRequests => 429,
            AppError::SettlementUnconfigured | AppError::Database(_) | AppError::Internal(_) => 500,
        }
    }

    /// Permanent errors put a payment into terminal FAILED immediately;
    /// transient ones are handed back to the queue's retry policy.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, AppError::Database(_) | AppError::Internal(_))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // 5xx detail goes to the log, never to the client (unless dev).
        let message = if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "internal error");
            if verbose_errors() {
                self.to_string()
            } else {
                "Internal server error".to_string()
            }
        } else {
            self.to_string()
        };

        let body = ApiResponse::<()>::err_with_code(message, self.code());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::InvalidAmount.code(), "INVALID_AMOUNT");
        assert_eq!(
            AppError::InsufficientBalance.code(),
            "INSUFFICIENT_BALANCE"
        );
        assert_eq!(AppError::TooManyRequests.code(), "TOO_MANY_REQUESTS");
        assert_eq!(AppError::MissingApiKey.code(), "UNAUTHORIZED");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(AppError::Validation("bad".into()).http_status(), 400);
        assert_eq!(AppError::MissingApiKey.http_status(), 401);
        assert_eq!(AppError::InvalidApiKey.http_status(), 403);
        assert_eq!(AppError::PaymentNotFound("x".into()).http_status(), 404);
        assert_eq!(AppError::IdempotencyConflict("dup".into()).http_status(), 409);
        assert_eq!(AppError::InsufficientBalance.http_status(), 422);
        assert_eq!(AppError::TooManyRequests.http_status(), 429);
        assert_eq!(AppError::Database("down".into()).http_status(), 500);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            AppError::InvalidAmount.to_string(),
            "Transfer amount must be positive"
        );
        assert_eq!(AppError::InsufficientBalance.to_string(), "Insufficient balance");
    }

    #[test]
    fn test_permanence_split() {
        assert!(AppError::InsufficientBalance.is_permanent());
        assert!(AppError::CurrencyMismatch("USD vs EUR".into()).is_permanent());
        assert!(AppError::SettlementUnconfigured.is_permanent());
        assert!(!AppError::Database("pool timeout".into()).is_permanent());
        assert!(!AppError::Internal("oops".into()).is_permanent());
    }

    #[test]
    fn test_sqlx_conversion() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.code(), "DATABASE_ERROR");
        assert!(!err.is_permanent());
    }
}
