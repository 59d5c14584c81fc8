//! `/wallet/*` (spec.md §6): balance, the deposit invoice flow, and the
//! transaction ledger.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::extractors::{enforce_rate_limit, verify_csrf, AuthedUser};
use crate::domain::sessions::rate_limit::PAYMENTS;
use crate::domain::wallet::service::{BalanceView, DepositInvoice, DepositStatusView};
use crate::domain::wallet::store::Transaction;
use crate::startup::AppState;

pub async fn balance(
    State(state): State<Arc<AppState>>,
    AuthedUser(user): AuthedUser,
) -> Result<Json<BalanceView>, ApiError> {
    Ok(Json(state.wallet.balance(&user.id).await?))
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount_sats: i64,
}

pub async fn deposit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AuthedUser(user): AuthedUser,
    Json(body): Json<DepositRequest>,
) -> Result<Json<DepositInvoice>, ApiError> {
    verify_csrf(&headers)?;
    enforce_rate_limit(&state, "payments", &user.id, PAYMENTS).await?;
    Ok(Json(state.wallet.deposit(&user.id, body.amount_sats).await?))
}

pub async fn deposit_status(
    State(state): State<Arc<AppState>>,
    AuthedUser(user): AuthedUser,
    Path(hash): Path<String>,
) -> Result<Json<DepositStatusView>, ApiError> {
    Ok(Json(state.wallet.deposit_status(&user.id, &hash).await?))
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

pub async fn transactions(
    State(state): State<Arc<AppState>>,
    AuthedUser(user): AuthedUser,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let rows = state
        .wallet
        .transactions(&user.id, query.limit.unwrap_or(50), query.offset.unwrap_or(0))
        .await?;
    Ok(Json(rows))
}
