//! Persistent Store: whitelist (spec.md §3 "Whitelist", LNURL auth only).
//! Linking keys must be approved here before `sessions::lnurl` will mint a
//! session for them.

use sqlx::{sqlite::SqliteRow, FromRow, Row};
use time::OffsetDateTime;

use crate::domain::Error;
use crate::infra::db::{parse_required_datetime, DBConnection};

#[derive(Debug, Clone, serde::Serialize)]
pub struct WhitelistEntry {
    pub linking_key: String,
    pub display_name: Option<String>,
    pub is_admin: bool,
    pub approved_by: Option<String>,
    pub approved_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for WhitelistEntry {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(WhitelistEntry {
            linking_key: row.get("linking_key"),
            display_name: row.get("display_name"),
            is_admin: row.get::<i64, _>("is_admin") != 0,
            approved_by: row.get("approved_by"),
            approved_at: parse_required_datetime(row, "approved_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct WhitelistStore {
    db: DBConnection,
}

impl WhitelistStore {
    pub fn new(db: DBConnection) -> Self {
        Self { db }
    }

    const SELECT_COLUMNS: &'static str =
        "linking_key, display_name, is_admin, approved_by, approved_at";

    /// Approves a linking key, or updates the existing entry's display name /
    /// admin flag / approver if it is already present. Used by the `arena-admin`
    /// bootstrap binary and by a future admin API surface.
    pub async fn approve(
        &self,
        linking_key: &str,
        display_name: Option<&str>,
        is_admin: bool,
        approved_by: &str,
    ) -> Result<WhitelistEntry, Error> {
        let now = OffsetDateTime::now_utc();
        sqlx::query(
            "INSERT INTO whitelist (linking_key, display_name, is_admin, approved_by, approved_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(linking_key) DO UPDATE SET
                display_name = excluded.display_name,
                is_admin = excluded.is_admin,
                approved_by = excluded.approved_by,
                approved_at = excluded.approved_at",
        )
        .bind(linking_key)
        .bind(display_name)
        .bind(is_admin as i64)
        .bind(approved_by)
        .bind(now)
        .execute(self.db.write())
        .await?;

        self.get(linking_key).await?.ok_or(Error::NotFound)
    }

    /// Revokes a linking key. Callers must follow this with
    /// `sessions::SessionStore::destroy_all_for_user` for the matching user, per
    /// spec.md §4.8.
    pub async fn revoke(&self, linking_key: &str) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM whitelist WHERE linking_key = ?")
            .bind(linking_key)
            .execute(self.db.write())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, linking_key: &str) -> Result<Option<WhitelistEntry>, Error> {
        let query = format!(
            "SELECT {} FROM whitelist WHERE linking_key = ?",
            Self::SELECT_COLUMNS
        );
        Ok(sqlx::query_as::<_, WhitelistEntry>(&query)
            .bind(linking_key)
            .fetch_optional(self.db.read())
            .await?)
    }

    pub async fn is_whitelisted(&self, linking_key: &str) -> Result<bool, Error> {
        Ok(self.get(linking_key).await?.is_some())
    }

    pub async fn list(&self) -> Result<Vec<WhitelistEntry>, Error> {
        let query = format!(
            "SELECT {} FROM whitelist ORDER BY approved_at DESC",
            Self::SELECT_COLUMNS
        );
        Ok(sqlx::query_as::<_, WhitelistEntry>(&query)
            .fetch_all(self.db.read())
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::db::{DBConnection, DatabasePoolConfig, DatabaseType};

    async fn test_store() -> WhitelistStore {
        let db = DBConnection::new(
            ":memory:",
            "test",
            DatabasePoolConfig::testing(),
            DatabaseType::Arena,
        )
        .await
        .expect("failed to open test db");
        WhitelistStore::new(db)
    }

    #[tokio::test]
    async fn approve_then_is_whitelisted() {
        let store = test_store().await;
        store
            .approve("03abc", Some("Alice"), false, "bootstrap")
            .await
            .unwrap();
        assert!(store.is_whitelisted("03abc").await.unwrap());
        assert!(!store.is_whitelisted("03def").await.unwrap());
    }

    #[tokio::test]
    async fn approve_is_idempotent_and_updates_fields() {
        let store = test_store().await;
        store.approve("03abc", None, false, "bootstrap").await.unwrap();
        let updated = store
            .approve("03abc", Some("Alice"), true, "admin")
            .await
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Alice"));
        assert!(updated.is_admin);
    }

    #[tokio::test]
    async fn revoke_removes_entry() {
        let store = test_store().await;
        store.approve("03abc", None, false, "bootstrap").await.unwrap();
        assert!(store.revoke("03abc").await.unwrap());
        assert!(!store.is_whitelisted("03abc").await.unwrap());
        assert!(!store.revoke("03abc").await.unwrap());
    }
}
