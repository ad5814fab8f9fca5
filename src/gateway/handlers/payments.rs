//! Payment endpoints.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};

use super::super::state::AppState;
use super::super::types::{ApiResponse, CreatePaymentRequest, parse_id};
use crate::auth::AuthedMerchant;
use crate::error::AppError;
use crate::idempotency::extract_idempotency_key;
use crate::payment::{NewPayment, Payment, PaymentService};

/// `POST /api/v1/payments` → 202 with the PENDING payment.
///
/// Acceptance only: settlement happens asynchronously in the worker pool;
/// callers poll `GET /payments/:id` for the terminal state.
pub async fn create_payment(
    State(state): State<Arc<AppState>>,
    Extension(merchant): Extension<AuthedMerchant>,
    headers: HeaderMap,
    Json(body): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Payment>>), AppError> {
    body.validate()?;
    let idempotency_key = extract_idempotency_key(&headers)?.map(str::to_string);

    let payment = PaymentService::create_and_queue(
        state.db.pool(),
        &state.queue,
        NewPayment {
            merchant_id: merchant.account_id,
            amount: body.amount,
            currency: body.currency,
            source: body.source,
            description: body.description,
            idempotency_key,
        },
    )
    .await?;

    Ok((StatusCode::ACCEPTED, Json(ApiResponse::ok(payment))))
}

/// `GET /api/v1/payments/:id` → 200 with the payment, or 404.
pub async fn get_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Payment>>, AppError> {
    let payment_id = parse_id(&id, "payment")?;
    let payment = PaymentService::get_by_id(state.db.pool(), payment_id).await?;
    Ok(Json(ApiResponse::ok(payment)))
}
