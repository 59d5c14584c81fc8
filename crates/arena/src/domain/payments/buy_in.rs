//! Tournament buy-in (spec.md §6 `/payments/buy-in`, `/payments/status/:hash`):
//! a direct Lightning payment of the tournament's fixed `buy_in_sats` that
//! creates the caller's Entry and credits the prize pool, independent of the
//! USD-priced per-attempt debit in `tournament::attempts`. Mirrors
//! `wallet::service::WalletService`'s deposit/deposit_status shape exactly,
//! down to the `cache.del` claim race with the webhook path.

use arena_core::{normalize_payment_hash, IntentKind};
use log::info;
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;

use super::{buy_in_reverse_index_key, find_existing, intent_key, load_intent, store_intent, InvoiceIntent, INVOICE_INTENT_TTL};
use crate::domain::tournament::store::TournamentStore;
use crate::domain::Error;
use crate::infra::cache::Cache;
use crate::infra::lightning::Ln;

#[derive(Debug, Clone, Serialize)]
pub struct BuyInInvoice {
    pub payment_request: String,
    pub payment_hash: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuyInStatusView {
    pub paid: bool,
    pub expired: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub already_processed: bool,
}

pub struct BuyInService {
    tournaments: TournamentStore,
    cache: Arc<dyn Cache>,
    ln: Arc<dyn Ln>,
}

impl BuyInService {
    pub fn new(tournaments: TournamentStore, cache: Arc<dyn Cache>, ln: Arc<dyn Ln>) -> Self {
        Self {
            tournaments,
            cache,
            ln,
        }
    }

    pub async fn create(&self, user_id: &str) -> Result<BuyInInvoice, Error> {
        let tournament = self
            .tournaments
            .get_current_open()
            .await?
            .ok_or_else(|| Error::BadRequest("no open tournament".to_string()))?;

        let reverse_key = buy_in_reverse_index_key(user_id, tournament.id);
        if let Some((payment_hash, intent)) = find_existing(&self.cache, &reverse_key, IntentKind::BuyIn).await? {
            let remaining = intent.remaining_ttl(OffsetDateTime::now_utc());
            if !remaining.is_zero() {
                return Ok(BuyInInvoice {
                    payment_request: intent.payment_request,
                    payment_hash,
                    expires_in: remaining.as_secs(),
                });
            }
        }

        let created = self
            .ln
            .create_invoice(
                tournament.buy_in_sats,
                INVOICE_INTENT_TTL.as_secs(),
                "Tournament buy-in",
            )
            .await
            .map_err(|e| {
                if e.is_transient() {
                    Error::Transient(e.to_string())
                } else {
                    Error::BadRequest(e.to_string())
                }
            })?;

        let payment_hash = normalize_payment_hash(&created.payment_hash)?;
        let intent = InvoiceIntent {
            kind: IntentKind::BuyIn,
            user_id: user_id.to_string(),
            tournament_id: Some(tournament.id),
            amount_sats: tournament.buy_in_sats,
            payment_request: created.payment_request.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        store_intent(&self.cache, &payment_hash, &intent).await?;

        Ok(BuyInInvoice {
            payment_request: created.payment_request,
            payment_hash,
            expires_in: INVOICE_INTENT_TTL.as_secs(),
        })
    }

    pub async fn status(&self, user_id: &str, raw_hash: &str) -> Result<BuyInStatusView, Error> {
        let payment_hash = normalize_payment_hash(raw_hash)?;
        let key = intent_key(IntentKind::BuyIn, &payment_hash);

        let Some(intent) = load_intent(&self.cache, &key).await? else {
            return Ok(BuyInStatusView {
                paid: true,
                expired: false,
                already_processed: true,
            });
        };

        if intent.user_id != user_id {
            return Err(Error::Forbidden);
        }

        let now = OffsetDateTime::now_utc();
        if intent.expires_at() <= now {
            return Ok(BuyInStatusView {
                paid: false,
                expired: true,
                already_processed: false,
            });
        }

        let state = self
            .ln
            .payment_status(&payment_hash)
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;

        if state != crate::infra::lightning::PaymentState::Paid {
            return Ok(BuyInStatusView {
                paid: false,
                expired: false,
                already_processed: false,
            });
        }

        self.settle(&payment_hash, &intent).await
    }

    /// Shared claim point with the webhook path (`payments::webhook`): only
    /// the caller that wins `cache.del` creates the Entry.
    pub async fn settle(&self, payment_hash: &str, intent: &InvoiceIntent) -> Result<BuyInStatusView, Error> {
        let key = intent_key(IntentKind::BuyIn, payment_hash);
        let won = self.cache.del(&key).await;
        if !won {
            return Ok(BuyInStatusView {
                paid: true,
                expired: false,
                already_processed: true,
            });
        }

        let tournament_id = intent
            .tournament_id
            .ok_or_else(|| Error::Internal(anyhow::anyhow!("buy-in intent missing tournament_id")))?;
        self.tournaments
            .settle_buy_in(tournament_id, &intent.user_id, intent.amount_sats)
            .await?;
        info!("buy-in settled for user {} tournament {tournament_id}", intent.user_id);

        Ok(BuyInStatusView {
            paid: true,
            expired: false,
            already_processed: false,
        })
    }
}
