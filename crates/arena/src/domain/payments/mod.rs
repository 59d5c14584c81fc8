//! Payment & Webhook Pipeline (spec.md §4.4): the cache-resident `InvoiceIntent`
//! record that correlates a Lightning payment hash to a pending buy-in or
//! deposit, webhook signature verification, and the idempotent settler that both
//! the webhook and the polling path fall through to.
//!
//! Grounded on the claim primitive already built into `infra::cache::Cache`
//! (`del` / `set_if_not_exists`); this module adds the typed envelope around it
//! rather than a second locking mechanism, per spec.md §9's steer away from
//! ad-hoc dictionaries toward explicit tagged variants.

pub mod buy_in;
pub mod webhook;

use arena_core::IntentKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::Error;
use crate::infra::cache::Cache;

pub const INVOICE_INTENT_TTL: Duration = Duration::from_secs(10 * 60);
pub const WEBHOOK_IDEMPOTENCY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceIntent {
    pub kind: IntentKind,
    pub user_id: String,
    pub tournament_id: Option<Uuid>,
    pub amount_sats: i64,
    pub payment_request: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl InvoiceIntent {
    pub fn expires_at(&self) -> OffsetDateTime {
        self.created_at + INVOICE_INTENT_TTL
    }

    pub fn remaining_ttl(&self, now: OffsetDateTime) -> Duration {
        let expires_at = self.expires_at();
        if expires_at <= now {
            Duration::ZERO
        } else {
            (expires_at - now).try_into().unwrap_or(Duration::ZERO)
        }
    }
}

pub fn intent_key(kind: IntentKind, payment_hash: &str) -> String {
    match kind {
        IntentKind::BuyIn => format!("invoice:{payment_hash}"),
        IntentKind::Deposit => format!("deposit:{payment_hash}"),
    }
}

pub fn buy_in_reverse_index_key(user_id: &str, tournament_id: Uuid) -> String {
    format!("buyin_intent:{user_id}:{tournament_id}")
}

pub fn deposit_reverse_index_key(user_id: &str) -> String {
    format!("deposit_intent:{user_id}")
}

pub fn webhook_idempotency_key(payment_hash: &str) -> String {
    format!("webhook:{payment_hash}")
}

/// Stores a freshly created intent plus its per-user reverse index so a
/// subsequent request for the same user/purpose can be deduplicated
/// (spec.md §4.4 "Invoice lifecycle").
pub async fn store_intent(
    cache: &Arc<dyn Cache>,
    payment_hash: &str,
    intent: &InvoiceIntent,
) -> Result<(), Error> {
    let bytes = serde_json::to_vec(intent).map_err(|e| Error::Internal(e.into()))?;
    cache
        .set(&intent_key(intent.kind, payment_hash), bytes, INVOICE_INTENT_TTL)
        .await;

    match intent.kind {
        IntentKind::BuyIn => {
            let tournament_id = intent
                .tournament_id
                .ok_or_else(|| Error::Internal(anyhow::anyhow!("buy-in intent missing tournament_id")))?;
            cache
                .set(
                    &buy_in_reverse_index_key(&intent.user_id, tournament_id),
                    payment_hash.as_bytes().to_vec(),
                    INVOICE_INTENT_TTL,
                )
                .await;
        }
        IntentKind::Deposit => {
            cache
                .set(
                    &deposit_reverse_index_key(&intent.user_id),
                    payment_hash.as_bytes().to_vec(),
                    INVOICE_INTENT_TTL,
                )
                .await;
        }
    }
    Ok(())
}

/// Loads an intent by cache key, deserializing the stored JSON envelope.
pub async fn load_intent(cache: &Arc<dyn Cache>, key: &str) -> Result<Option<InvoiceIntent>, Error> {
    match cache.get(key).await {
        Some(bytes) => {
            let intent: InvoiceIntent =
                serde_json::from_slice(&bytes).map_err(|e| Error::Internal(e.into()))?;
            Ok(Some(intent))
        }
        None => Ok(None),
    }
}

/// Reuses an unexpired reverse-indexed intent for the given user/purpose, if
/// one exists, returning `(payment_hash, intent)`.
pub async fn find_existing(
    cache: &Arc<dyn Cache>,
    reverse_key: &str,
    kind: IntentKind,
) -> Result<Option<(String, InvoiceIntent)>, Error> {
    let Some(hash_bytes) = cache.get(reverse_key).await else {
        return Ok(None);
    };
    let payment_hash = String::from_utf8(hash_bytes).map_err(|e| Error::Internal(e.into()))?;
    let intent = load_intent(cache, &intent_key(kind, &payment_hash)).await?;
    Ok(intent.map(|intent| (payment_hash, intent)))
}
