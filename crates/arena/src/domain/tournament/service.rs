//! Read-only tournament views consumed by the HTTP layer: today's
//! tournament/jackpot, leaderboard, a caller's Entry snapshot, and the
//! attempt-pricing summary shown before `StartAttempt`.

use serde::Serialize;
use std::sync::Arc;

use super::store::{Entry, LeaderboardRow, TournamentStore};
use crate::domain::Error;
use crate::infra::oracle::Oracle;

#[derive(Debug, Clone, Serialize)]
pub struct TournamentView {
    pub id: uuid::Uuid,
    pub tournament_date: String,
    pub buy_in_sats: i64,
    pub prize_pool_sats: i64,
    pub jackpot_usd: f64,
    pub status: String,
    pub payout_percentages: [f64; 3],
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
    pub entry: Entry,
    pub attempts_remaining: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptPricingView {
    pub attempts_used: i64,
    pub attempts_remaining: i64,
    pub cost_sats: i64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameStatsView {
    pub best_score: i64,
    pub attempts_used: i64,
    pub attempts_remaining: i64,
    pub attempt_1_score: Option<i64>,
    pub attempt_2_score: Option<i64>,
    pub attempt_3_score: Option<i64>,
    pub rank: Option<i64>,
}

pub struct TournamentQueryService {
    store: TournamentStore,
    oracle: Arc<dyn Oracle>,
    attempt_cost_usd: f64,
}

impl TournamentQueryService {
    pub fn new(store: TournamentStore, oracle: Arc<dyn Oracle>, attempt_cost_usd: f64) -> Self {
        Self {
            store,
            oracle,
            attempt_cost_usd,
        }
    }

    pub async fn current(&self) -> Result<TournamentView, Error> {
        let tournament = self
            .store
            .get_current_open()
            .await?
            .ok_or_else(|| Error::NotFound)?;
        let rate = self
            .oracle
            .btc_usd_rate()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;
        Ok(TournamentView {
            id: tournament.id,
            tournament_date: tournament.tournament_date,
            buy_in_sats: tournament.buy_in_sats,
            prize_pool_sats: tournament.prize_pool_sats,
            jackpot_usd: (tournament.prize_pool_sats as f64 / 100_000_000.0) * rate,
            status: tournament.status,
            payout_percentages: arena_core::PAYOUT_PERCENTAGES,
        })
    }

    pub async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardRow>, Error> {
        let tournament = self
            .store
            .get_current_open()
            .await?
            .ok_or_else(|| Error::NotFound)?;
        self.store.leaderboard(tournament.id, limit.clamp(1, 100)).await
    }

    pub async fn entry_for(&self, user_id: &str) -> Result<EntryView, Error> {
        let tournament = self
            .store
            .get_current_open()
            .await?
            .ok_or_else(|| Error::NotFound)?;
        let entry = self
            .store
            .get_entry(tournament.id, user_id)
            .await?
            .ok_or_else(|| Error::NotFound)?;
        let attempts_remaining = entry.max_attempts - entry.attempts_used;
        Ok(EntryView {
            entry,
            attempts_remaining,
        })
    }

    pub async fn attempt_pricing(&self, user_id: &str) -> Result<AttemptPricingView, Error> {
        let tournament = self
            .store
            .get_current_open()
            .await?
            .ok_or_else(|| Error::NotFound)?;
        let entry = self.store.get_entry(tournament.id, user_id).await?;
        let (attempts_used, attempts_remaining) = match &entry {
            Some(entry) => (entry.attempts_used, entry.max_attempts - entry.attempts_used),
            None => (0, arena_core::MAX_ATTEMPTS as i64),
        };
        let rate = self
            .oracle
            .btc_usd_rate()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;
        let cost_sats = ((self.attempt_cost_usd / rate) * 100_000_000.0).round() as i64;
        Ok(AttemptPricingView {
            attempts_used,
            attempts_remaining,
            cost_sats,
            cost_usd: self.attempt_cost_usd,
        })
    }

    /// `/game/stats` (spec.md §6): the caller's Entry plus their current
    /// leaderboard rank, or no rank if they have not posted a score yet.
    pub async fn game_stats(&self, user_id: &str) -> Result<GameStatsView, Error> {
        let tournament = self
            .store
            .get_current_open()
            .await?
            .ok_or_else(|| Error::NotFound)?;
        let entry = self
            .store
            .get_entry(tournament.id, user_id)
            .await?
            .ok_or_else(|| Error::NotFound)?;
        let rank = self.store.leaderboard_rank(tournament.id, user_id).await?;

        Ok(GameStatsView {
            best_score: entry.best_score,
            attempts_used: entry.attempts_used,
            attempts_remaining: entry.max_attempts - entry.attempts_used,
            attempt_1_score: entry.attempt_1_score,
            attempt_2_score: entry.attempt_2_score,
            attempt_3_score: entry.attempt_3_score,
            rank,
        })
    }
}
