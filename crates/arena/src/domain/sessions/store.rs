//! Session tokens (spec.md §4.8): 256 bits of randomness, hex-encoded, cache-
//! resident with a sliding 24h TTL. `Create`/`Get`/`Destroy`/`DestroyAllForUser`
//! mirror the spec's named operations directly.

use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::Error;
use crate::infra::cache::Cache;

pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const TOKEN_HEX_LEN: usize = 64;

fn session_key(token: &str) -> String {
    format!("session:{token}")
}

fn user_index_key(user_id: &str) -> String {
    format!("user_sessions:{user_id}")
}

/// `^[a-f0-9]{64}$`, checked without a regex dependency since the alphabet and
/// length are fixed.
pub fn is_valid_token_format(token: &str) -> bool {
    token.len() == TOKEN_HEX_LEN
        && token
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity: OffsetDateTime,
}

pub struct SessionStore {
    cache: Arc<dyn Cache>,
}

impl SessionStore {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    fn mint_token() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// `Create(user) -> token`.
    pub async fn create(&self, user_id: &str) -> Result<String, Error> {
        let token = Self::mint_token();
        let now = OffsetDateTime::now_utc();
        let session = Session {
            user_id: user_id.to_string(),
            created_at: now,
            last_activity: now,
        };
        let bytes = serde_json::to_vec(&session).map_err(|e| Error::Internal(e.into()))?;
        self.cache.set(&session_key(&token), bytes, SESSION_TTL).await;
        self.add_to_index(user_id, &token).await?;
        Ok(token)
    }

    /// `Get(token) -> session | nil`, extending the TTL on hit (sliding
    /// expiration). Rejects malformed tokens before touching the cache.
    pub async fn get(&self, token: &str) -> Result<Option<Session>, Error> {
        if !is_valid_token_format(token) {
            return Ok(None);
        }
        let Some(bytes) = self.cache.get(&session_key(token)).await else {
            return Ok(None);
        };
        let mut session: Session =
            serde_json::from_slice(&bytes).map_err(|e| Error::Internal(e.into()))?;
        session.last_activity = OffsetDateTime::now_utc();
        let refreshed = serde_json::to_vec(&session).map_err(|e| Error::Internal(e.into()))?;
        self.cache.set(&session_key(token), refreshed, SESSION_TTL).await;
        Ok(Some(session))
    }

    /// `Destroy(token)`.
    pub async fn destroy(&self, token: &str) -> Result<(), Error> {
        if let Some(bytes) = self.cache.get(&session_key(token)).await {
            if let Ok(session) = serde_json::from_slice::<Session>(&bytes) {
                self.remove_from_index(&session.user_id, token).await?;
            }
        }
        self.cache.del(&session_key(token)).await;
        Ok(())
    }

    /// `DestroyAllForUser(user)`, used when a whitelist entry is revoked or the
    /// caller hits logout-all. The cache has no native key scan, so a reverse
    /// index of issued tokens per user stands in for one.
    pub async fn destroy_all_for_user(&self, user_id: &str) -> Result<(), Error> {
        let tokens = self.read_index(user_id).await?;
        for token in &tokens {
            self.cache.del(&session_key(token)).await;
        }
        self.cache.del(&user_index_key(user_id)).await;
        Ok(())
    }

    async fn read_index(&self, user_id: &str) -> Result<Vec<String>, Error> {
        match self.cache.get(&user_index_key(user_id)).await {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| Error::Internal(e.into())),
            None => Ok(Vec::new()),
        }
    }

    async fn write_index(&self, user_id: &str, tokens: &[String]) -> Result<(), Error> {
        let bytes = serde_json::to_vec(tokens).map_err(|e| Error::Internal(e.into()))?;
        self.cache.set(&user_index_key(user_id), bytes, SESSION_TTL).await;
        Ok(())
    }

    async fn add_to_index(&self, user_id: &str, token: &str) -> Result<(), Error> {
        let mut tokens = self.read_index(user_id).await?;
        tokens.push(token.to_string());
        self.write_index(user_id, &tokens).await
    }

    async fn remove_from_index(&self, user_id: &str, token: &str) -> Result<(), Error> {
        let mut tokens = self.read_index(user_id).await?;
        tokens.retain(|t| t != token);
        self.write_index(user_id, &tokens).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::cache::InProcessCache;

    fn cache() -> Arc<dyn Cache> {
        Arc::new(InProcessCache::new(1_000))
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let store = SessionStore::new(cache());
        let token = store.create("user-1").await.unwrap();
        assert!(is_valid_token_format(&token));
        let session = store.get(&token).await.unwrap().expect("session should exist");
        assert_eq!(session.user_id, "user-1");
    }

    #[tokio::test]
    async fn malformed_token_is_rejected_without_cache_lookup() {
        let store = SessionStore::new(cache());
        assert!(store.get("not-a-token").await.unwrap().is_none());
        assert!(store.get(&"a".repeat(63)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn destroy_removes_session() {
        let store = SessionStore::new(cache());
        let token = store.create("user-1").await.unwrap();
        store.destroy(&token).await.unwrap();
        assert!(store.get(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn destroy_all_for_user_clears_every_session() {
        let store = SessionStore::new(cache());
        let a = store.create("user-1").await.unwrap();
        let b = store.create("user-1").await.unwrap();
        let other = store.create("user-2").await.unwrap();

        store.destroy_all_for_user("user-1").await.unwrap();

        assert!(store.get(&a).await.unwrap().is_none());
        assert!(store.get(&b).await.unwrap().is_none());
        assert!(store.get(&other).await.unwrap().is_some());
    }
}
