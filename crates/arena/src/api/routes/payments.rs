//! `/payments/*` (spec.md §6): the fixed-sats tournament buy-in invoice flow
//! and the signed LNbits webhook that (together with client polling on
//! `/payments/status/:hash`) settles it.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::extractors::{enforce_rate_limit, verify_csrf, AuthedUser, ClientIp};
use crate::domain::payments::buy_in::{BuyInInvoice, BuyInStatusView};
use crate::domain::payments::webhook::{WebhookBody, WebhookOutcome, SIGNATURE_HEADERS};
use crate::domain::sessions::rate_limit::PAYMENTS;
use crate::domain::Error;
use crate::startup::AppState;

pub async fn buy_in(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AuthedUser(user): AuthedUser,
) -> Result<Json<BuyInInvoice>, ApiError> {
    verify_csrf(&headers)?;
    enforce_rate_limit(&state, "payments", &user.id, PAYMENTS).await?;
    Ok(Json(state.buy_in.create(&user.id).await?))
}

pub async fn status(
    State(state): State<Arc<AppState>>,
    AuthedUser(user): AuthedUser,
    Path(hash): Path<String>,
) -> Result<Json<BuyInStatusView>, ApiError> {
    Ok(Json(state.buy_in.status(&user.id, &hash).await?))
}

/// Signed, no-session endpoint (spec.md §4.4, §4.8): verifies the HMAC over
/// the raw body against each candidate signature header before the JSON is
/// even parsed, then dispatches to whichever intent (buy-in or deposit) the
/// payment hash matches.
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ClientIp(ip): ClientIp,
    body: Bytes,
) -> Result<Json<WebhookOutcome>, ApiError> {
    let signature = SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()));
    let Some(signature) = signature else {
        return Err(ApiError::InvalidSignature);
    };

    let secret = state.settings.lightning_settings.webhook_secret.as_bytes();
    if !crate::domain::payments::webhook::verify_signature(secret, &body, signature) {
        log::warn!("webhook signature rejected from {ip}");
        return Err(ApiError::InvalidSignature);
    }

    let parsed: WebhookBody = serde_json::from_slice(&body)
        .map_err(|e| Error::BadRequest(format!("invalid webhook body: {e}")))?;

    Ok(Json(state.webhook.handle(&parsed).await?))
}
