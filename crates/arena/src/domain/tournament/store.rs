//! Persistent Store: tournaments, entries, game sessions, payouts.
//!
//! CRUD shape grounded on `coordinator/src/domain/competitions/store.rs`; the
//! atomic-upsert (`GetOrCreateEntry`) and guarded-increment (`IncrementAttempt`)
//! patterns mirror `get_and_reserve_ticket`'s begin/guard/commit-or-rollback
//! shape. Attempt-indexed writes (`RecordAttemptScore`) select a fixed `CASE`
//! branch by a validated `AttemptSlot`, never interpolating `k` textually
//! (spec.md §4.1, §9).

use arena_core::{AttemptSlot, TournamentStatus};
use sqlx::{sqlite::SqliteRow, FromRow, Row};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::domain::Error;
use crate::infra::db::{parse_optional_datetime, parse_required_datetime, DBConnection};

#[derive(Debug, Clone, serde::Serialize)]
pub struct Tournament {
    pub id: Uuid,
    pub tournament_date: String,
    pub buy_in_sats: i64,
    pub prize_pool_sats: i64,
    pub status: String,
    pub start_time: OffsetDateTime,
    pub end_time: Option<OffsetDateTime>,
}

impl FromRow<'_, SqliteRow> for Tournament {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.get("id");
        Ok(Tournament {
            id: Uuid::parse_str(&id).map_err(|e| sqlx::Error::ColumnDecode {
                index: "id".to_string(),
                source: Box::new(e),
            })?,
            tournament_date: row.get("tournament_date"),
            buy_in_sats: row.get("buy_in_sats"),
            prize_pool_sats: row.get("prize_pool_sats"),
            status: row.get("status"),
            start_time: parse_required_datetime(row, "start_time")?,
            end_time: parse_optional_datetime(row, "end_time")?,
        })
    }
}

impl Tournament {
    pub fn is_open(&self) -> bool {
        self.status == TournamentStatus::Open.as_str()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Entry {
    pub id: Uuid,
    pub tournament_id: Uuid,
    pub user_id: String,
    pub attempts_used: i64,
    pub max_attempts: i64,
    pub attempt_1_score: Option<i64>,
    pub attempt_2_score: Option<i64>,
    pub attempt_3_score: Option<i64>,
    pub best_score: i64,
}

impl FromRow<'_, SqliteRow> for Entry {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.get("id");
        let tournament_id: String = row.get("tournament_id");
        Ok(Entry {
            id: Uuid::parse_str(&id).map_err(|e| sqlx::Error::ColumnDecode {
                index: "id".to_string(),
                source: Box::new(e),
            })?,
            tournament_id: Uuid::parse_str(&tournament_id).map_err(|e| sqlx::Error::ColumnDecode {
                index: "tournament_id".to_string(),
                source: Box::new(e),
            })?,
            user_id: row.get("user_id"),
            attempts_used: row.get("attempts_used"),
            max_attempts: row.get("max_attempts"),
            attempt_1_score: row.get("attempt_1_score"),
            attempt_2_score: row.get("attempt_2_score"),
            attempt_3_score: row.get("attempt_3_score"),
            best_score: row.get("best_score"),
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LeaderboardRow {
    pub user_id: String,
    pub display_name: String,
    pub best_score: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WinnerRow {
    pub user_id: String,
    pub display_name: String,
    pub destination: Option<String>,
    pub best_score: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Payout {
    pub id: Uuid,
    pub tournament_id: Uuid,
    pub user_id: String,
    pub place: i64,
    pub amount_sats: i64,
    pub destination: String,
    pub status: String,
    pub payment_hash: Option<String>,
    pub created_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for Payout {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.get("id");
        let tournament_id: String = row.get("tournament_id");
        Ok(Payout {
            id: Uuid::parse_str(&id).map_err(|e| sqlx::Error::ColumnDecode {
                index: "id".to_string(),
                source: Box::new(e),
            })?,
            tournament_id: Uuid::parse_str(&tournament_id).map_err(|e| sqlx::Error::ColumnDecode {
                index: "tournament_id".to_string(),
                source: Box::new(e),
            })?,
            user_id: row.get("user_id"),
            place: row.get("place"),
            amount_sats: row.get("amount_sats"),
            destination: row.get("destination"),
            status: row.get("status"),
            payment_hash: row.get("payment_hash"),
            created_at: parse_required_datetime(row, "created_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TournamentStore {
    db: DBConnection,
}

impl TournamentStore {
    pub fn new(db: DBConnection) -> Self {
        Self { db }
    }

    /// `CreateTournament` (spec.md §4.1): idempotent on date, returns `None`
    /// if one already exists.
    pub async fn create_tournament(
        &self,
        date: Date,
        buy_in_sats: i64,
    ) -> Result<Option<Tournament>, Error> {
        let date_str = date.to_string();
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM tournaments WHERE tournament_date = ?")
                .bind(&date_str)
                .fetch_optional(self.db.read())
                .await?;
        if existing.is_some() {
            return Ok(None);
        }

        let id = Uuid::now_v7();
        let now = OffsetDateTime::now_utc();
        let result = sqlx::query(
            "INSERT INTO tournaments (id, tournament_date, buy_in_sats, prize_pool_sats, status, start_time, created_at, updated_at)
             VALUES (?, ?, ?, 0, 'open', ?, ?, ?)
             ON CONFLICT(tournament_date) DO NOTHING",
        )
        .bind(id.to_string())
        .bind(&date_str)
        .bind(buy_in_sats)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(self.db.write())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Ok(Some(self.get(id).await?))
    }

    pub async fn get(&self, id: Uuid) -> Result<Tournament, Error> {
        sqlx::query_as::<_, Tournament>(
            "SELECT id, tournament_date, buy_in_sats, prize_pool_sats, status, start_time, end_time
             FROM tournaments WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.db.read())
        .await?
        .ok_or(Error::NotFound)
    }

    pub async fn get_current_open(&self) -> Result<Option<Tournament>, Error> {
        Ok(sqlx::query_as::<_, Tournament>(
            "SELECT id, tournament_date, buy_in_sats, prize_pool_sats, status, start_time, end_time
             FROM tournaments WHERE status = 'open' ORDER BY start_time DESC LIMIT 1",
        )
        .fetch_optional(self.db.read())
        .await?)
    }

    pub async fn list_open(&self) -> Result<Vec<Tournament>, Error> {
        Ok(sqlx::query_as::<_, Tournament>(
            "SELECT id, tournament_date, buy_in_sats, prize_pool_sats, status, start_time, end_time
             FROM tournaments WHERE status = 'open' ORDER BY start_time ASC",
        )
        .fetch_all(self.db.read())
        .await?)
    }

    /// `GetOrCreateEntry` (spec.md §4.1): atomic upsert returning the row,
    /// relied on by the attempt state machine to avoid check-then-act races.
    pub async fn get_or_create_entry(&self, tournament_id: Uuid, user_id: &str) -> Result<Entry, Error> {
        let now = OffsetDateTime::now_utc();
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO entries (id, tournament_id, user_id, attempts_used, max_attempts, best_score, created_at, updated_at)
             VALUES (?, ?, ?, 0, ?, 0, ?, ?)
             ON CONFLICT(tournament_id, user_id) DO NOTHING",
        )
        .bind(id.to_string())
        .bind(tournament_id.to_string())
        .bind(user_id)
        .bind(arena_core::MAX_ATTEMPTS as i64)
        .bind(now)
        .bind(now)
        .execute(self.db.write())
        .await?;

        sqlx::query_as::<_, Entry>(
            "SELECT id, tournament_id, user_id, attempts_used, max_attempts,
                    attempt_1_score, attempt_2_score, attempt_3_score, best_score
             FROM entries WHERE tournament_id = ? AND user_id = ?",
        )
        .bind(tournament_id.to_string())
        .bind(user_id)
        .fetch_optional(self.db.read())
        .await?
        .ok_or(Error::NotFound)
    }

    /// `IncrementAttempt` (spec.md §4.1): the single serialization point
    /// enforcing the attempt cap. Returns `None` when the guard fails.
    pub async fn increment_attempt(&self, entry_id: Uuid) -> Result<Option<Entry>, Error> {
        let now = OffsetDateTime::now_utc();
        let result = sqlx::query(
            "UPDATE entries SET attempts_used = attempts_used + 1, updated_at = ?
             WHERE id = ? AND attempts_used < max_attempts",
        )
        .bind(now)
        .bind(entry_id.to_string())
        .execute(self.db.write())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Ok(Some(
            sqlx::query_as::<_, Entry>(
                "SELECT id, tournament_id, user_id, attempts_used, max_attempts,
                        attempt_1_score, attempt_2_score, attempt_3_score, best_score
                 FROM entries WHERE id = ?",
            )
            .bind(entry_id.to_string())
            .fetch_one(self.db.read())
            .await?,
        ))
    }

    /// `RecordAttemptScore` (spec.md §4.1): writes the k-th attempt column via
    /// a fixed `CASE` branch selected by `AttemptSlot`, never interpolating
    /// `k` textually, and bumps `best_score`.
    pub async fn record_attempt_score(&self, entry_id: Uuid, slot: AttemptSlot, score: i64) -> Result<Entry, Error> {
        let now = OffsetDateTime::now_utc();
        let query = match slot {
            AttemptSlot::First => {
                "UPDATE entries SET attempt_1_score = ?, best_score = MAX(best_score, ?), updated_at = ? WHERE id = ?"
            }
            AttemptSlot::Second => {
                "UPDATE entries SET attempt_2_score = ?, best_score = MAX(best_score, ?), updated_at = ? WHERE id = ?"
            }
            AttemptSlot::Third => {
                "UPDATE entries SET attempt_3_score = ?, best_score = MAX(best_score, ?), updated_at = ? WHERE id = ?"
            }
        };
        sqlx::query(query)
            .bind(score)
            .bind(score)
            .bind(now)
            .bind(entry_id.to_string())
            .execute(self.db.write())
            .await?;

        sqlx::query_as::<_, Entry>(
            "SELECT id, tournament_id, user_id, attempts_used, max_attempts,
                    attempt_1_score, attempt_2_score, attempt_3_score, best_score
             FROM entries WHERE id = ?",
        )
        .bind(entry_id.to_string())
        .fetch_optional(self.db.read())
        .await?
        .ok_or(Error::NotFound)
    }

    /// Legacy submit path (spec.md §4.5 item "A submission without
    /// `attempt_id`"): updates `best_score` only, no attempt column, no debit.
    pub async fn record_legacy_best_score(&self, entry_id: Uuid, score: i64) -> Result<Entry, Error> {
        let now = OffsetDateTime::now_utc();
        sqlx::query("UPDATE entries SET best_score = MAX(best_score, ?), updated_at = ? WHERE id = ?")
            .bind(score)
            .bind(now)
            .bind(entry_id.to_string())
            .execute(self.db.write())
            .await?;

        sqlx::query_as::<_, Entry>(
            "SELECT id, tournament_id, user_id, attempts_used, max_attempts,
                    attempt_1_score, attempt_2_score, attempt_3_score, best_score
             FROM entries WHERE id = ?",
        )
        .bind(entry_id.to_string())
        .fetch_optional(self.db.read())
        .await?
        .ok_or(Error::NotFound)
    }

    pub async fn get_entry(&self, tournament_id: Uuid, user_id: &str) -> Result<Option<Entry>, Error> {
        Ok(sqlx::query_as::<_, Entry>(
            "SELECT id, tournament_id, user_id, attempts_used, max_attempts,
                    attempt_1_score, attempt_2_score, attempt_3_score, best_score
             FROM entries WHERE tournament_id = ? AND user_id = ?",
        )
        .bind(tournament_id.to_string())
        .bind(user_id)
        .fetch_optional(self.db.read())
        .await?)
    }

    /// `UpdatePrizePool` (spec.md §4.1): atomic addition.
    pub async fn update_prize_pool(&self, tournament_id: Uuid, delta_sats: i64) -> Result<(), Error> {
        sqlx::query("UPDATE tournaments SET prize_pool_sats = prize_pool_sats + ?, updated_at = ? WHERE id = ?")
            .bind(delta_sats)
            .bind(OffsetDateTime::now_utc())
            .bind(tournament_id.to_string())
            .execute(self.db.write())
            .await?;
        Ok(())
    }

    /// Buy-in settlement (spec.md §4.4): in one store transaction, treat an
    /// already-existing Entry as success (idempotent under webhook replay),
    /// otherwise create the Entry and credit the prize pool.
    pub async fn settle_buy_in(&self, tournament_id: Uuid, user_id: &str, amount_sats: i64) -> Result<(), Error> {
        let now = OffsetDateTime::now_utc();
        let mut tx = self.db.write().begin().await?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM entries WHERE tournament_id = ? AND user_id = ?")
                .bind(tournament_id.to_string())
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;

        if existing.is_some() {
            tx.commit().await?;
            return Ok(());
        }

        sqlx::query(
            "INSERT INTO entries (id, tournament_id, user_id, attempts_used, max_attempts, best_score, created_at, updated_at)
             VALUES (?, ?, ?, 0, ?, 0, ?, ?)",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(tournament_id.to_string())
        .bind(user_id)
        .bind(arena_core::MAX_ATTEMPTS as i64)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE tournaments SET prize_pool_sats = prize_pool_sats + ?, updated_at = ? WHERE id = ?")
            .bind(amount_sats)
            .bind(now)
            .bind(tournament_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn leaderboard(&self, tournament_id: Uuid, limit: i64) -> Result<Vec<LeaderboardRow>, Error> {
        let rows = sqlx::query(
            "SELECT entries.user_id as user_id, users.display_name as display_name, entries.best_score as best_score
             FROM entries JOIN users ON users.id = entries.user_id
             WHERE entries.tournament_id = ?
             ORDER BY entries.best_score DESC
             LIMIT ?",
        )
        .bind(tournament_id.to_string())
        .bind(limit)
        .fetch_all(self.db.read())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| LeaderboardRow {
                user_id: row.get("user_id"),
                display_name: row.get("display_name"),
                best_score: row.get("best_score"),
            })
            .collect())
    }

    /// 1-indexed leaderboard rank for `user_id`, or `None` if they have not
    /// posted a score (`best_score == 0`), counting every entry strictly ahead
    /// plus one.
    pub async fn leaderboard_rank(&self, tournament_id: Uuid, user_id: &str) -> Result<Option<i64>, Error> {
        let best_score: Option<i64> = sqlx::query_scalar(
            "SELECT best_score FROM entries WHERE tournament_id = ? AND user_id = ?",
        )
        .bind(tournament_id.to_string())
        .bind(user_id)
        .fetch_optional(self.db.read())
        .await?;

        let Some(best_score) = best_score else {
            return Ok(None);
        };
        if best_score == 0 {
            return Ok(None);
        }

        let ahead: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM entries WHERE tournament_id = ? AND best_score > ?",
        )
        .bind(tournament_id.to_string())
        .bind(best_score)
        .fetch_one(self.db.read())
        .await?;

        Ok(Some(ahead + 1))
    }

    /// Top-3 entries ordered by `best_score DESC` with a user join for display
    /// name + Lightning payout destination (spec.md §4.7 step 3). The
    /// destination is the user's `linking_key` when present (LNURL-auth users
    /// carry their own Lightning identity); otherwise `None` and the caller
    /// must classify the payout as `INVALID_ADDRESS`.
    pub async fn top_winners(&self, tournament_id: Uuid, n: i64) -> Result<Vec<WinnerRow>, Error> {
        let rows = sqlx::query(
            "SELECT entries.user_id as user_id, users.display_name as display_name,
                    users.linking_key as destination, entries.best_score as best_score
             FROM entries JOIN users ON users.id = entries.user_id
             WHERE entries.tournament_id = ? AND entries.best_score > 0
             ORDER BY entries.best_score DESC
             LIMIT ?",
        )
        .bind(tournament_id.to_string())
        .bind(n)
        .fetch_all(self.db.read())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| WinnerRow {
                user_id: row.get("user_id"),
                display_name: row.get("display_name"),
                destination: row.get("destination"),
                best_score: row.get("best_score"),
            })
            .collect())
    }

    pub async fn insert_game_session(
        &self,
        entry_id: Uuid,
        score: i64,
        level: i64,
        duration_ms: i64,
        input_hash: Option<&str>,
    ) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO game_sessions (id, entry_id, score, level, duration_ms, input_hash, verified, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(entry_id.to_string())
        .bind(score)
        .bind(level)
        .bind(duration_ms)
        .bind(input_hash)
        .bind(OffsetDateTime::now_utc())
        .execute(self.db.write())
        .await?;
        Ok(())
    }

    /// Marks the open tournament `completed`. A no-op (returns `false`) if it
    /// is already completed, so `CloseTournament` can exit early (spec.md
    /// §4.7 step 1).
    pub async fn close(&self, tournament_id: Uuid) -> Result<bool, Error> {
        let now = OffsetDateTime::now_utc();
        let result = sqlx::query(
            "UPDATE tournaments SET status = 'completed', end_time = ?, updated_at = ? WHERE id = ? AND status = 'open'",
        )
        .bind(now)
        .bind(now)
        .bind(tournament_id.to_string())
        .execute(self.db.write())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn create_payout(
        &self,
        tournament_id: Uuid,
        user_id: &str,
        place: i64,
        amount_sats: i64,
        destination: &str,
    ) -> Result<Payout, Error> {
        let id = Uuid::now_v7();
        let now = OffsetDateTime::now_utc();
        sqlx::query(
            "INSERT INTO payouts (id, tournament_id, user_id, place, amount_sats, destination, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)",
        )
        .bind(id.to_string())
        .bind(tournament_id.to_string())
        .bind(user_id)
        .bind(place)
        .bind(amount_sats)
        .bind(destination)
        .bind(now)
        .execute(self.db.write())
        .await?;

        Ok(Payout {
            id,
            tournament_id,
            user_id: user_id.to_string(),
            place,
            amount_sats,
            destination: destination.to_string(),
            status: "pending".to_string(),
            payment_hash: None,
            created_at: now,
        })
    }

    pub async fn pending_payouts_older_than(&self, age: time::Duration) -> Result<Vec<Payout>, Error> {
        let cutoff = OffsetDateTime::now_utc() - age;
        Ok(sqlx::query_as::<_, Payout>(
            "SELECT id, tournament_id, user_id, place, amount_sats, destination, status, payment_hash, created_at
             FROM payouts WHERE status = 'pending' AND created_at < ?",
        )
        .bind(cutoff)
        .fetch_all(self.db.read())
        .await?)
    }

    pub async fn mark_paid(&self, payout_id: Uuid, payment_hash: &str) -> Result<(), Error> {
        sqlx::query("UPDATE payouts SET status = 'paid', payment_hash = ?, paid_at = ? WHERE id = ?")
            .bind(payment_hash)
            .bind(OffsetDateTime::now_utc())
            .bind(payout_id.to_string())
            .execute(self.db.write())
            .await?;
        Ok(())
    }
}
