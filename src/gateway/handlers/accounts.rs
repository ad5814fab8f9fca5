//! Account endpoints. Account CRUD sits outside the ledger core: balances
//! are readable here but only ever mutated through transfers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use super::super::state::AppState;
use super::super::types::{ApiResponse, CreateAccountRequest, parse_id};
use crate::error::AppError;
use crate::ledger::{Account, AccountStore};

/// `POST /api/v1/accounts` → 201 with the new zero-balance account.
///
/// `allow_negative` is not part of the request: the settlement account is
/// provisioned by the seed tool, never over the API.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Account>>), AppError> {
    body.validate()?;
    let account =
        AccountStore::create(state.db.pool(), body.name.trim(), &body.currency, false).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(account))))
}

/// `GET /api/v1/accounts/:id` → 200 with the account, or 404.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Account>>, AppError> {
    let account_id = parse_id(&id, "account")?;
    let account = AccountStore::get_by_id(state.db.pool(), account_id)
        .await?
        .ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))?;
    Ok(Json(ApiResponse::ok(account)))
}
