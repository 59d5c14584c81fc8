//! `/auth/lnurl/*`: wallet-based login as an alternative to username/password
//! (spec.md §9 open question 4). Not part of spec.md §6's HTTP table, which is
//! scoped to the password flow, but `domain::sessions::lnurl::LnurlAuth` is a
//! fully built service with nothing to call it — this wires it up the same
//! way `routes::auth` wires `SessionStore`.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::domain::sessions::LnurlChallengeView;
use crate::startup::AppState;

#[derive(Debug, Serialize)]
pub struct AuthView {
    pub user_id: String,
    pub token: String,
}

pub async fn challenge(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LnurlChallengeView>, ApiError> {
    Ok(Json(state.lnurl.mint_challenge().await?))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub k1: String,
    pub sig: String,
    pub key: String,
}

pub async fn verify(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.lnurl.verify(&body.k1, &body.sig, &body.key).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub k1: String,
}

pub async fn complete(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CompleteRequest>,
) -> Result<Json<AuthView>, ApiError> {
    let (token, user) = state.lnurl.complete(&body.k1).await?;
    Ok(Json(AuthView { user_id: user.id, token }))
}
