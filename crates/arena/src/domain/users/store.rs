//! Persistent Store: users. Grounded on `coordinator/src/domain/users/store.rs`'s
//! CRUD shape (manual `FromRow`, parameterized queries, `NotFound` mapping);
//! rewritten for the username/password + LNURL-auth identity model of §3 rather
//! than the teacher's nostr-pubkey identity.

use sqlx::{sqlite::SqliteRow, FromRow, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::Error;
use crate::infra::db::{parse_required_datetime, DBConnection};

#[derive(Debug, Clone, serde::Serialize)]
pub struct User {
    pub id: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub linking_key: Option<String>,
    pub display_name: String,
    pub is_admin: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for User {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(User {
            id: row.get("id"),
            username: row.get("username"),
            password_hash: row.get("password_hash"),
            linking_key: row.get("linking_key"),
            display_name: row.get("display_name"),
            is_admin: row.get::<i64, _>("is_admin") != 0,
            created_at: parse_required_datetime(row, "created_at")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct UserStore {
    db: DBConnection,
}

impl UserStore {
    pub fn new(db: DBConnection) -> Self {
        Self { db }
    }

    const SELECT_COLUMNS: &'static str =
        "id, username, password_hash, linking_key, display_name, is_admin, created_at, updated_at";

    /// Registers a new username/password user and its zero-balance Wallet, in
    /// one transaction (the Wallet's lifecycle is tied to the user's, §3).
    pub async fn register_with_password(
        &self,
        username: &str,
        password_hash: &str,
        display_name: &str,
    ) -> Result<User, Error> {
        let id = Uuid::now_v7().to_string();
        let now = OffsetDateTime::now_utc();

        let mut tx = self.db.write().begin().await?;

        let existing: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(Error::Conflict(
                "DUPLICATE_USERNAME",
                "username already taken".to_string(),
            ));
        }

        sqlx::query(
            "INSERT INTO users (id, username, password_hash, linking_key, display_name, is_admin, created_at, updated_at)
             VALUES (?, ?, ?, NULL, ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(username)
        .bind(password_hash)
        .bind(display_name)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO wallets (user_id, balance_sats, created_at, updated_at) VALUES (?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get(&id).await
    }

    /// Finds or creates a user authenticated via LNURL-auth linking key. The
    /// whitelist gate (linking key must already be approved) is enforced by the
    /// caller before this is reached.
    pub async fn find_or_create_by_linking_key(
        &self,
        linking_key: &str,
        display_name: &str,
        is_admin: bool,
    ) -> Result<User, Error> {
        if let Some(existing) = self.find_by_linking_key(linking_key).await? {
            return Ok(existing);
        }

        let id = Uuid::now_v7().to_string();
        let now = OffsetDateTime::now_utc();

        let mut tx = self.db.write().begin().await?;

        sqlx::query(
            "INSERT INTO users (id, username, password_hash, linking_key, display_name, is_admin, created_at, updated_at)
             VALUES (?, NULL, NULL, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(linking_key)
        .bind(display_name)
        .bind(is_admin as i64)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO wallets (user_id, balance_sats, created_at, updated_at) VALUES (?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get(&id).await
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, Error> {
        let query = format!("SELECT {} FROM users WHERE username = ?", Self::SELECT_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(self.db.read())
            .await?)
    }

    pub async fn find_by_linking_key(&self, linking_key: &str) -> Result<Option<User>, Error> {
        let query = format!(
            "SELECT {} FROM users WHERE linking_key = ?",
            Self::SELECT_COLUMNS
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(linking_key)
            .fetch_optional(self.db.read())
            .await?)
    }

    pub async fn get(&self, id: &str) -> Result<User, Error> {
        let query = format!("SELECT {} FROM users WHERE id = ?", Self::SELECT_COLUMNS);
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(self.db.read())
            .await?
            .ok_or(Error::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::db::{DBConnection, DatabasePoolConfig, DatabaseType};

    async fn test_store() -> UserStore {
        let db = DBConnection::new(
            ":memory:",
            "test",
            DatabasePoolConfig::testing(),
            DatabaseType::Arena,
        )
        .await
        .expect("failed to open test db");
        UserStore::new(db)
    }

    #[tokio::test]
    async fn register_then_find_by_username() {
        let store = test_store().await;
        let user = store
            .register_with_password("player_one", "hash", "Player One")
            .await
            .expect("register should succeed");

        let found = store
            .find_by_username("player_one")
            .await
            .expect("lookup should succeed")
            .expect("user should exist");
        assert_eq!(found.id, user.id);
        assert_eq!(found.display_name, "Player One");
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let store = test_store().await;
        store
            .register_with_password("dup", "hash", "Dup")
            .await
            .unwrap();

        let err = store
            .register_with_password("dup", "hash2", "Dup Two")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict("DUPLICATE_USERNAME", _)));
    }

    #[tokio::test]
    async fn find_or_create_by_linking_key_is_idempotent() {
        let store = test_store().await;
        let first = store
            .find_or_create_by_linking_key("03abc", "LN Player", false)
            .await
            .unwrap();
        let second = store
            .find_or_create_by_linking_key("03abc", "LN Player", false)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }
}
