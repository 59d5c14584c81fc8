//! Persistent Store: wallets and the append-only transaction journal.
//!
//! Grounded on the transactional guard pattern of
//! `coordinator/src/domain/competitions/store.rs::get_and_reserve_ticket`
//! (begin / guarded update / check rows_affected / commit-or-rollback),
//! applied here to `credit`/`debit` (spec.md §4.1 `CreditWallet`/`DebitWallet`).

use arena_core::TransactionType;
use sqlx::{sqlite::SqliteRow, FromRow, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::Error;
use crate::infra::db::{parse_required_datetime, DBConnection};

#[derive(Debug, Clone, serde::Serialize)]
pub struct Wallet {
    pub user_id: String,
    pub balance_sats: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for Wallet {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Wallet {
            user_id: row.get("user_id"),
            balance_sats: row.get("balance_sats"),
            created_at: parse_required_datetime(row, "created_at")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub amount_sats: i64,
    pub description: String,
    pub reference: Option<String>,
    pub created_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for Transaction {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Transaction {
            id: row.get("id"),
            user_id: row.get("user_id"),
            transaction_type: row.get("type"),
            amount_sats: row.get("amount_sats"),
            description: row.get("description"),
            reference: row.get("reference"),
            created_at: parse_required_datetime(row, "created_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct WalletStore {
    db: DBConnection,
}

impl WalletStore {
    pub fn new(db: DBConnection) -> Self {
        Self { db }
    }

    pub async fn get(&self, user_id: &str) -> Result<Wallet, Error> {
        sqlx::query_as::<_, Wallet>(
            "SELECT user_id, balance_sats, created_at, updated_at FROM wallets WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.db.read())
        .await?
        .ok_or(Error::NotFound)
    }

    /// `CreditWallet` (spec.md §4.1): append a Transaction then increment the
    /// materialized balance, in one transaction. Returns the new balance.
    pub async fn credit(
        &self,
        user_id: &str,
        amount_sats: i64,
        transaction_type: TransactionType,
        description: &str,
        reference: Option<&str>,
    ) -> Result<i64, Error> {
        if amount_sats <= 0 {
            return Err(Error::BadRequest("credit amount must be positive".into()));
        }
        let now = OffsetDateTime::now_utc();
        let mut tx = self.db.write().begin().await?;

        sqlx::query(
            "INSERT INTO transactions (id, user_id, type, amount_sats, description, reference, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(user_id)
        .bind(transaction_type.as_str())
        .bind(amount_sats)
        .bind(description)
        .bind(reference)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE wallets SET balance_sats = balance_sats + ?, updated_at = ? WHERE user_id = ?")
            .bind(amount_sats)
            .bind(now)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let balance: i64 = sqlx::query_scalar("SELECT balance_sats FROM wallets WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(balance)
    }

    /// `DebitWallet` (spec.md §4.1): guarded by `balance >= amount`; fails with
    /// `InsufficientFunds` otherwise, reporting the pre-debit balance in the
    /// error so the caller can return a 400 snapshot without a second read.
    pub async fn debit(
        &self,
        user_id: &str,
        amount_sats: i64,
        transaction_type: TransactionType,
        description: &str,
        reference: Option<&str>,
    ) -> Result<i64, Error> {
        if amount_sats <= 0 {
            return Err(Error::BadRequest("debit amount must be positive".into()));
        }
        let now = OffsetDateTime::now_utc();
        let mut tx = self.db.write().begin().await?;

        let current_balance: i64 =
            sqlx::query_scalar("SELECT balance_sats FROM wallets WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(Error::NotFound)?;

        if current_balance < amount_sats {
            tx.rollback().await?;
            return Err(Error::InsufficientFunds {
                balance: current_balance,
                needed: amount_sats,
            });
        }

        let result = sqlx::query(
            "UPDATE wallets SET balance_sats = balance_sats - ?, updated_at = ? WHERE user_id = ? AND balance_sats >= ?",
        )
        .bind(amount_sats)
        .bind(now)
        .bind(user_id)
        .bind(amount_sats)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(Error::InsufficientFunds {
                balance: current_balance,
                needed: amount_sats,
            });
        }

        sqlx::query(
            "INSERT INTO transactions (id, user_id, type, amount_sats, description, reference, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(user_id)
        .bind(transaction_type.as_str())
        .bind(-amount_sats)
        .bind(description)
        .bind(reference)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let balance: i64 = sqlx::query_scalar("SELECT balance_sats FROM wallets WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(balance)
    }

    pub async fn list_transactions(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, Error> {
        Ok(sqlx::query_as::<_, Transaction>(
            "SELECT id, user_id, type, amount_sats, description, reference, created_at
             FROM transactions WHERE user_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.db.read())
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::users::store::UserStore;
    use crate::infra::db::{DBConnection, DatabasePoolConfig, DatabaseType};

    async fn test_db() -> DBConnection {
        DBConnection::new(":memory:", "test", DatabasePoolConfig::testing(), DatabaseType::Arena)
            .await
            .expect("failed to open test db")
    }

    #[tokio::test]
    async fn credit_then_debit_updates_balance_and_journal() {
        let db = test_db().await;
        let users = UserStore::new(db.clone());
        let user = users
            .register_with_password("player", "hash", "Player")
            .await
            .unwrap();
        let wallet_store = WalletStore::new(db);

        let balance = wallet_store
            .credit(&user.id, 1000, TransactionType::Deposit, "top up", Some("h1"))
            .await
            .unwrap();
        assert_eq!(balance, 1000);

        let balance = wallet_store
            .debit(&user.id, 400, TransactionType::BuyIn, "attempt 1", None)
            .await
            .unwrap();
        assert_eq!(balance, 600);

        let txs = wallet_store.list_transactions(&user.id, 10, 0).await.unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs.iter().map(|t| t.amount_sats).sum::<i64>(), 600);
    }

    #[tokio::test]
    async fn debit_beyond_balance_is_rejected_without_mutation() {
        let db = test_db().await;
        let users = UserStore::new(db.clone());
        let user = users
            .register_with_password("pauper", "hash", "Pauper")
            .await
            .unwrap();
        let wallet_store = WalletStore::new(db);

        let err = wallet_store
            .debit(&user.id, 1, TransactionType::BuyIn, "attempt", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { balance: 0, needed: 1 }));

        let wallet = wallet_store.get(&user.id).await.unwrap();
        assert_eq!(wallet.balance_sats, 0);
    }
}
