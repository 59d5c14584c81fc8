//! LNURL-auth (spec.md §4.8, optional auxiliary flow): mint a `k1` challenge,
//! verify the wallet's secp256k1 signature over it, gate on the whitelist,
//! then mint a session on `complete`. Grounded on `secp256k1`
//! (linking-key signature verification) and `bech32` (LNURL encoding), both
//! new to this crate — the teacher authenticates via nostr keys instead, but
//! the "sign a server-issued nonce with a wallet-held key" shape is the same.

use std::sync::Arc;
use std::time::Duration;

use bech32::{Bech32, Hrp};
use rand::RngCore;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1};
use serde::{Deserialize, Serialize};

use super::store::SessionStore;
use crate::domain::users::UserStore;
use crate::domain::whitelist::WhitelistStore;
use crate::domain::Error;
use crate::infra::cache::Cache;

const CHALLENGE_TTL: Duration = Duration::from_secs(5 * 60);

fn challenge_key(k1: &str) -> String {
    format!("lnurl:{k1}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum ChallengeState {
    Pending,
    Verified { linking_key: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Challenge {
    state: ChallengeState,
}

#[derive(Debug, Clone, Serialize)]
pub struct LnurlChallengeView {
    pub k1: String,
    pub lnurl: String,
}

pub struct LnurlAuth {
    cache: Arc<dyn Cache>,
    whitelist: Arc<WhitelistStore>,
    users: Arc<UserStore>,
    sessions: Arc<SessionStore>,
    callback_url: String,
}

impl LnurlAuth {
    pub fn new(
        cache: Arc<dyn Cache>,
        whitelist: Arc<WhitelistStore>,
        users: Arc<UserStore>,
        sessions: Arc<SessionStore>,
        callback_url: String,
    ) -> Self {
        Self {
            cache,
            whitelist,
            users,
            sessions,
            callback_url,
        }
    }

    /// Mints a fresh `k1` and its bech32-encoded LNURL, ready to render as a
    /// QR code.
    pub async fn mint_challenge(&self) -> Result<LnurlChallengeView, Error> {
        let mut k1_bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut k1_bytes);
        let k1 = hex::encode(k1_bytes);

        let challenge = Challenge {
            state: ChallengeState::Pending,
        };
        let payload = serde_json::to_vec(&challenge).map_err(|e| Error::Internal(e.into()))?;
        self.cache.set(&challenge_key(&k1), payload, CHALLENGE_TTL).await;

        let callback = format!("{}?tag=login&k1={k1}", self.callback_url);
        let hrp = Hrp::parse("lnurl").map_err(|e| Error::Internal(e.into()))?;
        let lnurl = bech32::encode::<Bech32>(hrp, callback.as_bytes())
            .map_err(|e| Error::Internal(e.into()))?
            .to_uppercase();

        Ok(LnurlChallengeView { k1, lnurl })
    }

    /// Verifies the wallet's signature over the raw `k1` bytes and, if the
    /// linking key is whitelisted, marks the challenge `verified`.
    pub async fn verify(&self, k1: &str, sig_der_hex: &str, linking_key_hex: &str) -> Result<(), Error> {
        let Some(bytes) = self.cache.get(&challenge_key(k1)).await else {
            return Err(Error::BadRequest("INVALID_CHALLENGE".to_string()));
        };
        let challenge: Challenge =
            serde_json::from_slice(&bytes).map_err(|e| Error::Internal(e.into()))?;
        if !matches!(challenge.state, ChallengeState::Pending) {
            return Err(Error::Conflict("ALREADY_VERIFIED", "challenge already verified".to_string()));
        }

        let k1_bytes = hex::decode(k1).map_err(|_| Error::BadRequest("INVALID_K1".to_string()))?;
        let sig_bytes =
            hex::decode(sig_der_hex).map_err(|_| Error::BadRequest("INVALID_SIGNATURE".to_string()))?;
        let key_bytes =
            hex::decode(linking_key_hex).map_err(|_| Error::BadRequest("INVALID_KEY".to_string()))?;

        let message = Message::from_digest_slice(&k1_bytes)
            .map_err(|_| Error::BadRequest("INVALID_K1".to_string()))?;
        let signature =
            Signature::from_der(&sig_bytes).map_err(|_| Error::BadRequest("INVALID_SIGNATURE".to_string()))?;
        let public_key =
            PublicKey::from_slice(&key_bytes).map_err(|_| Error::BadRequest("INVALID_KEY".to_string()))?;

        let secp = Secp256k1::verification_only();
        secp.verify_ecdsa(&message, &signature, &public_key)
            .map_err(|_| Error::Unauthorized)?;

        if !self.whitelist.is_whitelisted(linking_key_hex).await? {
            return Err(Error::Forbidden);
        }

        let verified = Challenge {
            state: ChallengeState::Verified {
                linking_key: linking_key_hex.to_string(),
            },
        };
        let payload = serde_json::to_vec(&verified).map_err(|e| Error::Internal(e.into()))?;
        self.cache.set(&challenge_key(k1), payload, CHALLENGE_TTL).await;
        Ok(())
    }

    /// Consumes a verified challenge and mints a session. Deleting the
    /// challenge first makes this the race-winner primitive for concurrent
    /// polling, the same pattern `payments` uses for invoice intents.
    pub async fn complete(&self, k1: &str) -> Result<(String, crate::domain::users::User), Error> {
        let Some(bytes) = self.cache.get(&challenge_key(k1)).await else {
            return Err(Error::BadRequest("INVALID_CHALLENGE".to_string()));
        };
        let challenge: Challenge =
            serde_json::from_slice(&bytes).map_err(|e| Error::Internal(e.into()))?;
        let ChallengeState::Verified { linking_key } = challenge.state else {
            return Err(Error::BadRequest("NOT_VERIFIED".to_string()));
        };

        if !self.cache.del(&challenge_key(k1)).await {
            return Err(Error::BadRequest("INVALID_CHALLENGE".to_string()));
        }

        let display_name = format!("lnurl-{}", &linking_key[..linking_key.len().min(8)]);
        let user = self
            .users
            .find_or_create_by_linking_key(&linking_key, &display_name, false)
            .await?;
        let token = self.sessions.create(&user.id).await?;
        Ok((token, user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::cache::InProcessCache;
    use crate::infra::db::{DBConnection, DatabasePoolConfig, DatabaseType};

    async fn harness() -> LnurlAuth {
        let cache: Arc<dyn Cache> = Arc::new(InProcessCache::new(1_000));
        let db = DBConnection::new(":memory:", "test", DatabasePoolConfig::testing(), DatabaseType::Arena)
            .await
            .unwrap();
        let whitelist = Arc::new(WhitelistStore::new(db.clone()));
        let users = Arc::new(UserStore::new(db));
        let sessions = Arc::new(SessionStore::new(cache.clone()));
        LnurlAuth::new(cache, whitelist, users, sessions, "https://arena.example/auth/lnurl/callback".to_string())
    }

    #[tokio::test]
    async fn mint_challenge_produces_hex_k1_and_uppercase_lnurl() {
        let auth = harness().await;
        let view = auth.mint_challenge().await.unwrap();
        assert_eq!(view.k1.len(), 64);
        assert!(view.k1.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(view.lnurl.starts_with("LNURL"));
    }

    #[tokio::test]
    async fn verify_rejects_signature_from_unregistered_key_over_valid_challenge() {
        let auth = harness().await;
        let view = auth.mint_challenge().await.unwrap();

        let secp = Secp256k1::new();
        let (secret_key, _public_key) = secp.generate_keypair(&mut rand::thread_rng());
        let k1_bytes = hex::decode(&view.k1).unwrap();
        let message = Message::from_digest_slice(&k1_bytes).unwrap();
        let sig = secp.sign_ecdsa(&message, &secret_key);

        // Signature is valid but claims a different public key than the one
        // that actually produced it, so verification fails.
        let (_, other_public_key) = secp.generate_keypair(&mut rand::thread_rng());
        let result = auth
            .verify(
                &view.k1,
                &hex::encode(sig.serialize_der()),
                &hex::encode(other_public_key.serialize()),
            )
            .await;
        assert!(matches!(result, Err(Error::Unauthorized)));
    }

    #[tokio::test]
    async fn verify_then_complete_mints_a_session_for_whitelisted_key() {
        let auth = harness().await;
        let view = auth.mint_challenge().await.unwrap();

        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut rand::thread_rng());
        let k1_bytes = hex::decode(&view.k1).unwrap();
        let message = Message::from_digest_slice(&k1_bytes).unwrap();
        let sig = secp.sign_ecdsa(&message, &secret_key);
        let linking_key = hex::encode(public_key.serialize());

        auth.whitelist.approve(&linking_key, None, false, "test").await.unwrap();

        auth.verify(&view.k1, &hex::encode(sig.serialize_der()), &linking_key)
            .await
            .unwrap();

        let (token, user) = auth.complete(&view.k1).await.unwrap();
        assert_eq!(user.linking_key.as_deref(), Some(linking_key.as_str()));
        assert!(super::super::store::is_valid_token_format(&token));

        // Challenge is single-use.
        assert!(auth.complete(&view.k1).await.is_err());
    }

    #[tokio::test]
    async fn verify_rejects_unwhitelisted_key() {
        let auth = harness().await;
        let view = auth.mint_challenge().await.unwrap();

        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut rand::thread_rng());
        let k1_bytes = hex::decode(&view.k1).unwrap();
        let message = Message::from_digest_slice(&k1_bytes).unwrap();
        let sig = secp.sign_ecdsa(&message, &secret_key);
        let linking_key = hex::encode(public_key.serialize());

        let result = auth.verify(&view.k1, &hex::encode(sig.serialize_der()), &linking_key).await;
        assert!(matches!(result, Err(Error::Forbidden)));
    }
}
