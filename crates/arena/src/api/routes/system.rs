//! `/csrf-token` and `/health` (spec.md §6): the two endpoints that need no
//! session and exist purely to support the access-control substrate and
//! operational monitoring.

use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::extractors::{csrf_set_cookie_header, read_cookie, CSRF_COOKIE_NAME};
use crate::domain::sessions::csrf::CsrfGuard;
use crate::startup::AppState;

/// Mints a CSRF token on first visit, or echoes the one already set, per
/// spec.md §4.8 ("on first request server mints a 64-hex CSRF token").
pub async fn csrf_token(headers: HeaderMap) -> impl IntoResponse {
    let token = read_cookie(&headers, CSRF_COOKIE_NAME).unwrap_or_else(CsrfGuard::mint);
    (
        [(axum::http::header::SET_COOKIE, csrf_set_cookie_header(&token))],
        Json(json!({ "csrfToken": token })),
    )
}

/// `{status, sessionStore}` (spec.md §6): pings the Persistent Store and
/// reports whether any background task (tournament engine ticks, cache
/// sweeper) has died, following the teacher's `background_threads` liveness
/// check in `routes/system/health_check.rs`.
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    state.db.ping().await.map_err(crate::domain::Error::from)?;

    let dead: Vec<&str> = state
        .background_tasks
        .iter()
        .filter(|(_, handle)| handle.is_finished())
        .map(|(name, _)| name.as_str())
        .collect();

    if !dead.is_empty() {
        return Err(ApiError::Domain(crate::domain::Error::Internal(anyhow::anyhow!(
            "background tasks died: {}",
            dead.join(", ")
        ))));
    }

    Ok(Json(json!({
        "status": "ok",
        "sessionStore": state.cache.len().await,
    })))
}
