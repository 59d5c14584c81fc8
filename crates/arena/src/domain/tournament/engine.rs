//! Tournament Engine (spec.md §4.7): the scheduler driving the daily
//! lifecycle via three recurring ticks. Grounded on the teacher's
//! `CacheSweeper` shape (`tokio::select!` against a `CancellationToken`,
//! `TaskTracker`-spawned loop) reused here for three independent interval
//! timers instead of one.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use arena_core::{HOUSE_FEE, PAYOUT_PERCENTAGES};
use log::{error, info, warn};
use time::{Duration as TimeDuration, OffsetDateTime};
use tokio_util::sync::CancellationToken;

use super::store::TournamentStore;
use crate::domain::Error;
use crate::infra::lightning::Ln;

const RETRY_TICK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30 * 60);
const PAYOUT_RETRY_AGE: TimeDuration = TimeDuration::minutes(5);
const PAYOUT_ALERT_THRESHOLD: u32 = 5;

pub struct TournamentEngine {
    store: TournamentStore,
    ln: Arc<dyn Ln>,
    buy_in_sats: i64,
    is_processing: AtomicBool,
    consecutive_payout_failures: AtomicU32,
}

impl TournamentEngine {
    pub fn new(store: TournamentStore, ln: Arc<dyn Ln>, buy_in_sats: i64) -> Self {
        Self {
            store,
            ln,
            buy_in_sats,
            is_processing: AtomicBool::new(false),
            consecutive_payout_failures: AtomicU32::new(0),
        }
    }

    /// `CreateDailyTournament` (spec.md §4.7): idempotent upsert for today's
    /// UTC date.
    pub async fn create_daily_tournament(&self) -> Result<(), Error> {
        let today = OffsetDateTime::now_utc().date();
        match self.store.create_tournament(today, self.buy_in_sats).await? {
            Some(tournament) => info!("created daily tournament {} for {}", tournament.id, today),
            None => info!("tournament for {today} already exists, skipping"),
        }
        Ok(())
    }

    /// `CloseTournament` (spec.md §4.7): guarded by a process-local flag so
    /// reentrant ticks (or an overlapping manual trigger) are skipped rather
    /// than double-processing payouts.
    pub async fn close_tournament(&self) -> Result<(), Error> {
        if self
            .is_processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("close_tournament already in progress, skipping reentrant tick");
            return Ok(());
        }

        let result = self.close_tournament_inner().await;
        self.is_processing.store(false, Ordering::SeqCst);
        result
    }

    async fn close_tournament_inner(&self) -> Result<(), Error> {
        let Some(tournament) = self.store.get_current_open().await? else {
            info!("no open tournament to close");
            return Ok(());
        };

        let winners = self.store.top_winners(tournament.id, 3).await?;
        let distributable = (tournament.prize_pool_sats as f64 * (1.0 - HOUSE_FEE)).floor() as i64;

        let mut payouts = Vec::with_capacity(winners.len());
        for (place, winner) in winners.iter().enumerate() {
            let place = (place + 1) as i64;
            let pct = PAYOUT_PERCENTAGES[(place - 1) as usize];
            let amount = (distributable as f64 * pct).floor() as i64;
            let Some(destination) = winner.destination.clone() else {
                warn!(
                    "winner place {place} user {} has no payout destination, skipping",
                    winner.user_id
                );
                continue;
            };
            let payout = self
                .store
                .create_payout(tournament.id, &winner.user_id, place, amount, &destination)
                .await?;
            payouts.push(payout);
        }

        for payout in &payouts {
            self.process_payout(payout).await;
        }

        self.store.close(tournament.id).await?;
        info!("closed tournament {} with {} payouts", tournament.id, payouts.len());
        Ok(())
    }

    /// `RetryFailedPayouts` (spec.md §4.7): re-invokes `ProcessPayout` for
    /// every payout still pending past the grace window.
    pub async fn retry_failed_payouts(&self) -> Result<(), Error> {
        let pending = self.store.pending_payouts_older_than(PAYOUT_RETRY_AGE).await?;
        for payout in &pending {
            self.process_payout(payout).await;
        }
        Ok(())
    }

    /// `ProcessPayout` (spec.md §4.7): audit-logs the attempt, pays via the
    /// Lightning Adapter, and marks the row paid on success. Failures are
    /// non-fatal: the row stays `pending` for the retry tick.
    async fn process_payout(&self, payout: &super::store::Payout) {
        info!(
            "PAYOUT attempt id={} user_prefix={} place={} sats={} destination={} score=n/a",
            payout.id,
            &payout.user_id[..payout.user_id.len().min(8)],
            payout.place,
            payout.amount_sats,
            redact_destination(&payout.destination),
        );

        let memo = format!("Satoshi Arena Place {} Prize", payout.place);
        match self.ln.pay_to_address(&payout.destination, payout.amount_sats, &memo).await {
            Ok(payment_hash) => {
                self.consecutive_payout_failures.store(0, Ordering::SeqCst);
                if let Err(e) = self.store.mark_paid(payout.id, &payment_hash).await {
                    error!("payout {} paid but failed to persist: {e}", payout.id);
                    return;
                }
                info!(
                    "PAYOUT SUCCESS id={} hash_prefix={}",
                    payout.id,
                    &payment_hash[..payment_hash.len().min(12)]
                );
            }
            Err(e) => {
                warn!("PAYOUT FAILED id={} reason={e}", payout.id);
                let failures = self.consecutive_payout_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= PAYOUT_ALERT_THRESHOLD {
                    error!("PAYOUT-ALERT {failures} consecutive payout failures");
                }
            }
        }
    }
}

fn redact_destination(destination: &str) -> String {
    if destination.len() <= 8 {
        "***".to_string()
    } else {
        format!("{}...{}", &destination[..4], &destination[destination.len() - 4..])
    }
}

/// Spawns the three recurring ticks described in spec.md §4.7, stoppable via
/// `token`. Mirrors the teacher's `CacheSweeper` loop shape: a `tokio::select!`
/// between the cancellation signal and each interval timer.
pub fn spawn_ticks(engine: Arc<TournamentEngine>, token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut daily_create = tokio::time::interval(std::time::Duration::from_secs(60));
        let mut daily_close = tokio::time::interval(std::time::Duration::from_secs(60));
        let mut retry = tokio::time::interval(RETRY_TICK_INTERVAL);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("tournament engine ticks shutting down");
                    break;
                }
                _ = daily_create.tick() => {
                    if at_utc_time(0, 0) {
                        if let Err(e) = engine.create_daily_tournament().await {
                            error!("create_daily_tournament failed: {e}");
                        }
                    }
                }
                _ = daily_close.tick() => {
                    if at_utc_time(23, 59) {
                        if let Err(e) = engine.close_tournament().await {
                            error!("close_tournament failed: {e}");
                        }
                    }
                }
                _ = retry.tick() => {
                    if let Err(e) = engine.retry_failed_payouts().await {
                        error!("retry_failed_payouts failed: {e}");
                    }
                }
            }
        }
    })
}

fn at_utc_time(hour: u8, minute: u8) -> bool {
    let now = OffsetDateTime::now_utc();
    now.hour() == hour && now.minute() == minute
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_destination_keeps_endpoints_only() {
        let redacted = redact_destination("lnbc1qxyzabc1234");
        assert!(redacted.starts_with("lnbc"));
        assert!(redacted.contains("..."));
    }

    #[test]
    fn redact_short_destination_is_fully_masked() {
        assert_eq!(redact_destination("abc"), "***");
    }
}
