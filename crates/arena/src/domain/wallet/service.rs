//! Wallet Ledger public operations (spec.md §4.3): `Balance`, `Deposit`,
//! `DepositStatus`, `Transactions`. All scoped to the caller's own user id by
//! the HTTP layer before reaching here.

use arena_core::{validate_deposit_amount, normalize_payment_hash, IntentKind, TransactionType};
use log::info;
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;

use super::store::{Transaction, WalletStore};
use crate::domain::payments::{
    self, buy_in_reverse_index_key, deposit_reverse_index_key, intent_key, InvoiceIntent,
};
use crate::domain::Error;
use crate::infra::cache::Cache;
use crate::infra::lightning::{Ln, PaymentState};
use crate::infra::oracle::Oracle;

#[derive(Debug, Clone, Serialize)]
pub struct BalanceView {
    pub sats: i64,
    pub usd: f64,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepositInvoice {
    pub payment_request: String,
    pub payment_hash: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepositStatusView {
    pub paid: bool,
    pub expired: bool,
    pub amount_sats: Option<i64>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub already_processed: bool,
}

pub struct WalletService {
    store: WalletStore,
    cache: Arc<dyn Cache>,
    ln: Arc<dyn Ln>,
    oracle: Arc<dyn Oracle>,
}

impl WalletService {
    pub fn new(store: WalletStore, cache: Arc<dyn Cache>, ln: Arc<dyn Ln>, oracle: Arc<dyn Oracle>) -> Self {
        Self {
            store,
            cache,
            ln,
            oracle,
        }
    }

    pub async fn balance(&self, user_id: &str) -> Result<BalanceView, Error> {
        let wallet = self.store.get(user_id).await?;
        let rate = self.oracle.btc_usd_rate().await.map_err(|e| Error::Transient(e.to_string()))?;
        let usd = (wallet.balance_sats as f64 / 100_000_000.0) * rate;
        Ok(BalanceView {
            sats: wallet.balance_sats,
            usd,
            rate,
        })
    }

    /// `Deposit` (spec.md §4.3): reuses a live intent if one exists for this
    /// user, otherwise mints a fresh invoice via the Lightning Adapter.
    pub async fn deposit(&self, user_id: &str, amount_sats: i64) -> Result<DepositInvoice, Error> {
        validate_deposit_amount(amount_sats)?;

        let reverse_key = deposit_reverse_index_key(user_id);
        if let Some((payment_hash, intent)) =
            payments::find_existing(&self.cache, &reverse_key, IntentKind::Deposit).await?
        {
            let remaining = intent.remaining_ttl(OffsetDateTime::now_utc());
            if !remaining.is_zero() {
                return Ok(DepositInvoice {
                    payment_request: intent.payment_request,
                    payment_hash,
                    expires_in: remaining.as_secs(),
                });
            }
        }

        let created = self
            .ln
            .create_invoice(amount_sats, payments::INVOICE_INTENT_TTL.as_secs(), "Wallet deposit")
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
            kind: IntentKind::Deposit,
            user_id: user_id.to_string(),
            tournament_id: None,
            amount_sats,
            payment_request: created.payment_request.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        payments::store_intent(&self.cache, &payment_hash, &intent).await?;

        Ok(DepositInvoice {
            payment_request: created.payment_request,
            payment_hash,
            expires_in: payments::INVOICE_INTENT_TTL.as_secs(),
        })
    }

    /// `DepositStatus` (spec.md §4.3): polls the Lightning Adapter if the
    /// intent is still unclaimed, then races the webhook path on
    /// `cache.Del(intent_key)` — whoever wins the claim credits the wallet.
    pub async fn deposit_status(&self, user_id: &str, raw_hash: &str) -> Result<DepositStatusView, Error> {
        let payment_hash = normalize_payment_hash(raw_hash)?;
        let key = intent_key(IntentKind::Deposit, &payment_hash);

        let Some(intent) = payments::load_intent(&self.cache, &key).await? else {
            // No intent left: either already processed, or it expired unpaid.
            return Ok(DepositStatusView {
                paid: true,
                expired: false,
                amount_sats: None,
                already_processed: true,
            });
        };

        if intent.user_id != user_id {
            return Err(Error::Forbidden);
        }

        let now = OffsetDateTime::now_utc();
        if intent.expires_at() <= now {
            return Ok(DepositStatusView {
                paid: false,
                expired: true,
                amount_sats: None,
                already_processed: false,
            });
        }

        let state = self
            .ln
            .payment_status(&payment_hash)
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;

        if state != PaymentState::Paid {
            return Ok(DepositStatusView {
                paid: false,
                expired: false,
                amount_sats: None,
                already_processed: false,
            });
        }

        self.settle_deposit(&payment_hash, &intent).await
    }

    /// The single claim point shared by the polling path and the webhook path
    /// (see `domain::payments::webhook`): only the caller that wins
    /// `cache.del` credits the wallet.
    pub async fn settle_deposit(
        &self,
        payment_hash: &str,
        intent: &InvoiceIntent,
    ) -> Result<DepositStatusView, Error> {
        let key = intent_key(IntentKind::Deposit, payment_hash);
        let won = self.cache.del(&key).await;
        if !won {
            return Ok(DepositStatusView {
                paid: true,
                expired: false,
                amount_sats: None,
                already_processed: true,
            });
        }

        self.store
            .credit(
                &intent.user_id,
                intent.amount_sats,
                TransactionType::Deposit,
                "Lightning deposit",
                Some(payment_hash),
            )
            .await?;
        info!("deposit settled for user {} amount {} sats", intent.user_id, intent.amount_sats);

        Ok(DepositStatusView {
            paid: true,
            expired: false,
            amount_sats: Some(intent.amount_sats),
            already_processed: false,
        })
    }

    pub async fn transactions(&self, user_id: &str, limit: i64, offset: i64) -> Result<Vec<Transaction>, Error> {
        self.store.list_transactions(user_id, limit.clamp(1, 200), offset.max(0)).await
    }

    pub fn store(&self) -> &WalletStore {
        &self.store
    }
}

pub fn buy_in_reverse_key(user_id: &str, tournament_id: uuid::Uuid) -> String {
    buy_in_reverse_index_key(user_id, tournament_id)
}
