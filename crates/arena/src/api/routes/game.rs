//! `/game/*` (spec.md §6): the attempt-pricing snapshot, the
//! `StartAttempt`/`SubmitScore` state machine, and the caller's own stats.

use axum::{extract::State, http::HeaderMap, Json};
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::extractors::{enforce_rate_limit, verify_csrf, AuthedUser};
use crate::domain::sessions::rate_limit::GAME_SUBMIT;
use crate::domain::tournament::{
    AttemptPricingView, GameStatsView, StartAttemptView, SubmitScoreRequest, SubmitScoreView,
};
use crate::startup::AppState;

pub async fn attempts(
    State(state): State<Arc<AppState>>,
    AuthedUser(user): AuthedUser,
) -> Result<Json<AttemptPricingView>, ApiError> {
    Ok(Json(state.tournaments.attempt_pricing(&user.id).await?))
}

pub async fn start_attempt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AuthedUser(user): AuthedUser,
) -> Result<Json<StartAttemptView>, ApiError> {
    verify_csrf(&headers)?;
    enforce_rate_limit(&state, "game_submit", &user.id, GAME_SUBMIT).await?;
    Ok(Json(state.attempts.start_attempt(&user.id).await?))
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AuthedUser(user): AuthedUser,
    Json(body): Json<SubmitScoreRequest>,
) -> Result<Json<SubmitScoreView>, ApiError> {
    verify_csrf(&headers)?;
    enforce_rate_limit(&state, "game_submit", &user.id, GAME_SUBMIT).await?;
    Ok(Json(state.attempts.submit_score(&user.id, body).await?))
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    AuthedUser(user): AuthedUser,
) -> Result<Json<GameStatsView>, ApiError> {
    Ok(Json(state.tournaments.game_stats(&user.id).await?))
}
