//! `/tournaments/current*` (spec.md §6): today's tournament, its leaderboard,
//! and the caller's own entry within it.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::extractors::AuthedUser;
use crate::domain::tournament::{EntryView, LeaderboardRow, TournamentView};
use crate::startup::AppState;

pub async fn current(State(state): State<Arc<AppState>>) -> Result<Json<TournamentView>, ApiError> {
    Ok(Json(state.tournaments.current().await?))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    limit: Option<i64>,
}

pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardRow>>, ApiError> {
    let rows = state.tournaments.leaderboard(query.limit.unwrap_or(20)).await?;
    Ok(Json(rows))
}

pub async fn entry(
    State(state): State<Arc<AppState>>,
    AuthedUser(user): AuthedUser,
) -> Result<Json<EntryView>, ApiError> {
    Ok(Json(state.tournaments.entry_for(&user.id).await?))
}
