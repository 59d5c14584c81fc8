//! `/auth/*` (spec.md §6): username/password registration and login, the
//! current-user lookup, and session teardown. The LNURL-auth flow lives
//! alongside this in `routes::lnurl`, since it mints sessions through a
//! different challenge/verify/complete cycle (spec.md §9 open question 4).

use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::extractors::{bearer_token, enforce_rate_limit, AuthedUser, ClientIp};
use crate::domain::sessions::rate_limit::AUTH;
use crate::domain::users::password::{hash_password, verify_password};
use crate::domain::users::User;
use crate::domain::Error;
use crate::startup::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthView {
    pub user_id: String,
    pub token: String,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<AuthView>, ApiError> {
    enforce_rate_limit(&state, "auth", &ip, AUTH).await?;

    arena_core::validate_username(&body.username).map_err(Error::from)?;
    let display_name = body.display_name.unwrap_or_else(|| body.username.clone());
    arena_core::validate_display_name(&display_name).map_err(Error::from)?;

    let password_hash = hash_password(&body.password)
        .map_err(|e| Error::Internal(anyhow::anyhow!("password hashing failed: {e}")))?;

    let user = state
        .users
        .register_with_password(&body.username, &password_hash, &display_name)
        .await?;
    let token = state.sessions.create(&user.id).await?;

    Ok(Json(AuthView { user_id: user.id, token }))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthView>, ApiError> {
    enforce_rate_limit(&state, "auth", &ip, AUTH).await?;

    let user = state
        .users
        .find_by_username(&body.username)
        .await?
        .ok_or(Error::Unauthorized)?;
    let hash = user.password_hash.as_deref().ok_or(Error::Unauthorized)?;
    let matches = verify_password(&body.password, hash)
        .map_err(|e| Error::Internal(anyhow::anyhow!("password verification failed: {e}")))?;
    if !matches {
        return Err(Error::Unauthorized.into());
    }

    let token = state.sessions.create(&user.id).await?;
    Ok(Json(AuthView { user_id: user.id, token }))
}

pub async fn me(AuthedUser(user): AuthedUser) -> Json<User> {
    Json(user)
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AuthedUser(_user): AuthedUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(token) = bearer_token(&headers) {
        state.sessions.destroy(token).await?;
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn logout_all(
    State(state): State<Arc<AppState>>,
    AuthedUser(user): AuthedUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.sessions.destroy_all_for_user(&user.id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
