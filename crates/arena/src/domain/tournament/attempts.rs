//! Attempt & Score state machine (spec.md §4.5): `StartAttempt` and
//! `SubmitScore`, with the `ActiveAttempt` handle living only in the
//! Ephemeral Cache (1h TTL, single-use, deleted on first submit).

use arena_core::{validate_submission_shape, AttemptSlot, TransactionType};
use log::{info, warn};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use super::anticheat::{self, Submission};
use super::store::TournamentStore;
use crate::domain::Error;
use crate::infra::cache::Cache;
use crate::infra::oracle::Oracle;

const ACTIVE_ATTEMPT_TTL: std::time::Duration = std::time::Duration::from_secs(60 * 60);

fn active_attempt_key(attempt_id: &str) -> String {
    format!("attempt:{attempt_id}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ActiveAttempt {
    user_id: String,
    entry_id: Uuid,
    tournament_id: Uuid,
    attempt_number: u32,
    started_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartAttemptView {
    pub attempt_id: String,
    pub attempt_number: u32,
    pub attempts_remaining: u32,
    pub cost_sats: i64,
    pub cost_usd: f64,
    pub new_balance_sats: i64,
    pub current_jackpot_usd: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitScoreView {
    pub best_score: i64,
    pub attempt_number: Option<u32>,
    pub is_new_best: bool,
    pub attempt_1_score: Option<i64>,
    pub attempt_2_score: Option<i64>,
    pub attempt_3_score: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitScoreRequest {
    pub attempt_id: Option<String>,
    pub score: i64,
    pub level: i64,
    pub duration_ms: i64,
    pub frame_count: Option<i64>,
    pub input_log: Option<Vec<i64>>,
}

pub struct AttemptService {
    store: TournamentStore,
    cache: Arc<dyn Cache>,
    wallet: Arc<crate::domain::wallet::WalletStore>,
    oracle: Arc<dyn Oracle>,
    attempt_cost_usd: f64,
}

impl AttemptService {
    pub fn new(
        store: TournamentStore,
        cache: Arc<dyn Cache>,
        wallet: Arc<crate::domain::wallet::WalletStore>,
        oracle: Arc<dyn Oracle>,
        attempt_cost_usd: f64,
    ) -> Self {
        Self {
            store,
            cache,
            wallet,
            oracle,
            attempt_cost_usd,
        }
    }

    /// `StartAttempt` (spec.md §4.5): debit-then-guard, with a refund if the
    /// attempt-cap guard loses a race despite the earlier check.
    pub async fn start_attempt(&self, user_id: &str) -> Result<StartAttemptView, Error> {
        let tournament = self
            .store
            .get_current_open()
            .await?
            .ok_or_else(|| Error::BadRequest("no open tournament".to_string()))?;

        let entry = self.store.get_or_create_entry(tournament.id, user_id).await?;
        if entry.attempts_used >= entry.max_attempts {
            return Err(Error::Conflict("MAX_ATTEMPTS", "attempt cap reached".to_string()));
        }

        let rate = self
            .oracle
            .btc_usd_rate()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;
        let cost_sats = ((self.attempt_cost_usd / rate) * 100_000_000.0).round() as i64;

        let attempt_number = (entry.attempts_used + 1) as u32;
        let balance_after_debit = self
            .wallet
            .debit(
                user_id,
                cost_sats,
                TransactionType::BuyIn,
                &format!("Game attempt {attempt_number}"),
                None,
            )
            .await?;

        let Some(updated_entry) = self.store.increment_attempt(entry.id).await? else {
            self.wallet
                .credit(
                    user_id,
                    cost_sats,
                    TransactionType::Refund,
                    "attempt cap hit concurrently",
                    None,
                )
                .await?;
            return Err(Error::Internal(anyhow::anyhow!(
                "attempt cap reached concurrently for entry {}",
                entry.id
            )));
        };

        self.store.update_prize_pool(tournament.id, cost_sats).await?;

        let attempt_id = hex::encode(random_128_bits());
        let active = ActiveAttempt {
            user_id: user_id.to_string(),
            entry_id: entry.id,
            tournament_id: tournament.id,
            attempt_number,
            started_at: OffsetDateTime::now_utc(),
        };
        let payload = serde_json::to_vec(&active).map_err(|e| Error::Internal(e.into()))?;
        self.cache
            .set(&active_attempt_key(&attempt_id), payload, ACTIVE_ATTEMPT_TTL)
            .await;

        Ok(StartAttemptView {
            attempt_id,
            attempt_number,
            attempts_remaining: (updated_entry.max_attempts - updated_entry.attempts_used) as u32,
            cost_sats,
            cost_usd: self.attempt_cost_usd,
            new_balance_sats: balance_after_debit,
            current_jackpot_usd: ((tournament.prize_pool_sats + cost_sats) as f64 / 100_000_000.0) * rate,
        })
    }

    /// `SubmitScore` (spec.md §4.5). A request without `attempt_id` is a
    /// legacy submission: it updates `best_score` only, does not debit, and
    /// does not bind to a specific attempt column.
    pub async fn submit_score(&self, user_id: &str, req: SubmitScoreRequest) -> Result<SubmitScoreView, Error> {
        validate_submission_shape(
            req.score,
            req.level,
            req.duration_ms,
            req.frame_count,
            req.input_log.as_ref().map(|log| log.len()),
        )?;

        let tournament = self
            .store
            .get_current_open()
            .await?
            .ok_or_else(|| Error::BadRequest("no open tournament".to_string()))?;
        let entry = self
            .store
            .get_entry(tournament.id, user_id)
            .await?
            .ok_or_else(|| Error::Forbidden)?;

        let attempt_slot = match req.attempt_id.as_deref() {
            Some(attempt_id) => Some(self.consume_active_attempt(attempt_id, user_id, entry.id).await?),
            None => None,
        };

        let gate = anticheat::evaluate(&Submission {
            score: req.score,
            level: req.level,
            duration_ms: req.duration_ms,
            frame_count: req.frame_count,
            input_log: req.input_log.as_deref(),
        });

        if !gate.valid {
            let correlator = anticheat::redacted_correlator(user_id, OffsetDateTime::now_utc().unix_timestamp());
            warn!(
                "anti-cheat rejected submission correlator={correlator} errors={:?}",
                gate.errors
            );
            return Err(Error::BadRequest("VALIDATION_FAILED".to_string()));
        }
        if !gate.warnings.is_empty() {
            info!("anti-cheat warnings on accepted submission: {:?}", gate.warnings);
        }

        let input_hash = req.input_log.as_ref().map(|log| {
            let canonical = log.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",");
            let digest = sha2::Sha256::digest(canonical.as_bytes());
            hex::encode(digest)[..64.min(hex::encode(digest).len())].to_string()
        });

        self.store
            .insert_game_session(entry.id, req.score, req.level, req.duration_ms, input_hash.as_deref())
            .await?;

        let previous_best = entry.best_score;
        let updated = match attempt_slot {
            Some(slot) => self.store.record_attempt_score(entry.id, slot, req.score).await?,
            None => self.store.record_legacy_best_score(entry.id, req.score).await?,
        };

        Ok(SubmitScoreView {
            best_score: updated.best_score,
            attempt_number: attempt_slot.map(|slot| slot.as_u32()),
            is_new_best: updated.best_score > previous_best,
            attempt_1_score: updated.attempt_1_score,
            attempt_2_score: updated.attempt_2_score,
            attempt_3_score: updated.attempt_3_score,
        })
    }

    async fn consume_active_attempt(
        &self,
        attempt_id: &str,
        user_id: &str,
        entry_id: Uuid,
    ) -> Result<AttemptSlot, Error> {
        let key = active_attempt_key(attempt_id);
        let Some(raw) = self.cache.get(&key).await else {
            return Err(Error::BadRequest("INVALID_ATTEMPT".to_string()));
        };
        // Single-use claim (spec.md §4.5, §8 I6): `del`'s `bool` is the race
        // winner primitive, same as the deposit settlement claim. A second
        // concurrent caller that also passed the `get` above must lose here.
        if !self.cache.del(&key).await {
            return Err(Error::BadRequest("INVALID_ATTEMPT".to_string()));
        }

        let active: ActiveAttempt = serde_json::from_slice(&raw).map_err(|e| Error::Internal(e.into()))?;
        if active.user_id != user_id || active.entry_id != entry_id {
            return Err(Error::Forbidden);
        }

        AttemptSlot::from_k(active.attempt_number)
            .ok_or_else(|| Error::Internal(anyhow::anyhow!("invalid attempt_number {}", active.attempt_number)))
    }
}

fn random_128_bits() -> [u8; 16] {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_attempt_key_is_namespaced() {
        assert_eq!(active_attempt_key("abc"), "attempt:abc");
    }
}
