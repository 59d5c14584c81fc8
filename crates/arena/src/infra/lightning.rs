//! Lightning Adapter: invoice creation, payment status polling, LNURL-pay
//! payout, all timeout-guarded.
//!
//! Grounded on `coordinator/src/infra/lightning.rs`: the `async_trait` adapter
//! trait shape and the `Bolt11Invoice` parsing helpers
//! (`extract_payment_hash_from_invoice`, `extract_amount_from_invoice`) are kept
//! near-verbatim. The teacher's LND gRPC-over-REST streaming subscription is
//! dropped — the Lightning backend here is LNbits, which delivers payment
//! notifications via webhook (see `api::routes::webhook`) rather than a
//! subscription stream, and auth uses LNbits' `X-Api-Key` header rather than
//! LND's `Grpc-Metadata-macaroon`.

use async_trait::async_trait;
use lightning_invoice::Bolt11Invoice;
use log::{error, warn};
use reqwest_middleware::{
    reqwest::{StatusCode, Url},
    ClientWithMiddleware,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("problem sending request to lightning backend: {0}")]
    Send(#[from] reqwest_middleware::reqwest::Error),
    #[error("problem sending request to lightning backend: {0}")]
    SendRetry(#[from] reqwest_middleware::Error),
    #[error("invalid bolt11 invoice: {0}")]
    InvalidInvoice(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("lightning backend temporarily unavailable: {0}")]
    Transient(String),
    #[error("invalid destination address: {0}")]
    InvalidAddress(String),
    #[error("payment failed: {0}")]
    PaymentFailed(String),
    #[error("payouts not configured")]
    PayoutsNotConfigured,
}

impl Error {
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::SendRetry(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedInvoice {
    pub payment_request: String,
    pub payment_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentState {
    Pending,
    Paid,
}

#[async_trait]
pub trait Ln: Send + Sync {
    /// Creates a bolt11 invoice for `amount_sats`, expiring in `expiry_secs`.
    async fn create_invoice(
        &self,
        amount_sats: i64,
        expiry_secs: u64,
        memo: &str,
    ) -> Result<CreatedInvoice, Error>;

    /// Polls payment status for a normalized 64-hex payment hash.
    async fn payment_status(&self, payment_hash: &str) -> Result<PaymentState, Error>;

    /// Resolves an LNURL-pay / lightning address destination and pays it
    /// `amount_sats`, returning the settled payment hash.
    async fn pay_to_address(
        &self,
        destination: &str,
        amount_sats: i64,
        memo: &str,
    ) -> Result<String, Error>;
}

/// Extracts the normalized payment hash from a bolt11 invoice string.
pub fn extract_payment_hash_from_invoice(invoice: &str) -> Result<String, Error> {
    let parsed = Bolt11Invoice::from_str(invoice)
        .map_err(|e| Error::InvalidInvoice(format!("failed to parse invoice: {e}")))?;
    Ok(hex::encode(parsed.payment_hash().as_ref() as &[u8]))
}

/// Extracts the invoice amount in satoshis, if present.
pub fn extract_amount_from_invoice(invoice: &str) -> Result<Option<i64>, Error> {
    let parsed = Bolt11Invoice::from_str(invoice)
        .map_err(|e| Error::InvalidInvoice(format!("failed to parse invoice: {e}")))?;
    Ok(parsed.amount_milli_satoshis().map(|msat| (msat / 1000) as i64))
}

#[derive(Clone)]
pub struct LnbitsClient {
    base_url: Url,
    client: ClientWithMiddleware,
    api_key: secrecy::SecretString,
    admin_key: secrecy::SecretString,
    api_timeout: Duration,
    lnurl_timeout: Duration,
}

impl LnbitsClient {
    pub fn new(
        client: ClientWithMiddleware,
        base_url: Url,
        api_key: secrecy::SecretString,
        admin_key: secrecy::SecretString,
        api_timeout: Duration,
        lnurl_timeout: Duration,
    ) -> Self {
        Self {
            base_url,
            client,
            api_key,
            admin_key,
            api_timeout,
            lnurl_timeout,
        }
    }

    pub async fn ping(&self) -> Result<(), anyhow::Error> {
        let url = self
            .base_url
            .join("/api/v1/wallet")
            .map_err(|e| anyhow::anyhow!(e))?;
        self.client
            .get(url)
            .header("X-Api-Key", secrecy::ExposeSecret::expose_secret(&self.api_key))
            .send()
            .await?;
        Ok(())
    }

    fn classify_status(&self, status: StatusCode, body: String) -> Error {
        if status == StatusCode::SERVICE_UNAVAILABLE
            || status == StatusCode::BAD_GATEWAY
            || status == StatusCode::GATEWAY_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            Error::Transient(format!("lightning backend responded with {status}: {body}"))
        } else {
            Error::BadRequest(format!("lightning backend responded with {status}: {body}"))
        }
    }
}

#[derive(Serialize)]
struct CreateInvoiceRequest {
    out: bool,
    amount: i64,
    memo: String,
    expiry: u64,
}

#[derive(Deserialize)]
struct CreateInvoiceResponse {
    payment_request: String,
    payment_hash: String,
}

#[derive(Deserialize)]
struct PaymentStatusResponse {
    paid: bool,
}

#[async_trait]
impl Ln for LnbitsClient {
    async fn create_invoice(
        &self,
        amount_sats: i64,
        expiry_secs: u64,
        memo: &str,
    ) -> Result<CreatedInvoice, Error> {
        let url = self
            .base_url
            .join("/api/v1/payments")
            .map_err(|e| Error::BadRequest(e.to_string()))?;

        let body = CreateInvoiceRequest {
            out: false,
            amount: amount_sats,
            memo: memo.to_string(),
            expiry: expiry_secs,
        };

        let send = self
            .client
            .post(url)
            .header("X-Api-Key", secrecy::ExposeSecret::expose_secret(&self.api_key))
            .json(&body)
            .send();

        let response = tokio::time::timeout(self.api_timeout, send)
            .await
            .map_err(|_| Error::Transient("create_invoice timed out".into()))?
            .map_err(|e| {
                error!("error sending create_invoice to lightning backend: {e}");
                Error::Send(e)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(self.classify_status(status, text));
        }

        let parsed: CreateInvoiceResponse = response.json().await.map_err(Error::Send)?;
        Ok(CreatedInvoice {
            payment_request: parsed.payment_request,
            payment_hash: parsed.payment_hash.to_lowercase(),
        })
    }

    async fn payment_status(&self, payment_hash: &str) -> Result<PaymentState, Error> {
        let url = self
            .base_url
            .join(&format!("/api/v1/payments/{payment_hash}"))
            .map_err(|e| Error::BadRequest(e.to_string()))?;

        let send = self
            .client
            .get(url)
            .header("X-Api-Key", secrecy::ExposeSecret::expose_secret(&self.api_key))
            .send();

        let response = tokio::time::timeout(self.api_timeout, send)
            .await
            .map_err(|_| Error::Transient("payment_status timed out".into()))?
            .map_err(Error::Send)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(self.classify_status(status, text));
        }

        let parsed: PaymentStatusResponse = response.json().await.map_err(Error::Send)?;
        Ok(if parsed.paid {
            PaymentState::Paid
        } else {
            PaymentState::Pending
        })
    }

    async fn pay_to_address(
        &self,
        destination: &str,
        amount_sats: i64,
        memo: &str,
    ) -> Result<String, Error> {
        let invoice = resolve_lnurl_pay(&self.client, destination, amount_sats, self.lnurl_timeout)
            .await?;

        let url = self
            .base_url
            .join("/api/v1/payments")
            .map_err(|e| Error::BadRequest(e.to_string()))?;

        #[derive(Serialize)]
        struct PayRequest {
            out: bool,
            bolt11: String,
        }

        let send = self
            .client
            .post(url)
            .header(
                "X-Api-Key",
                secrecy::ExposeSecret::expose_secret(&self.admin_key),
            )
            .json(&PayRequest {
                out: true,
                bolt11: invoice.clone(),
            })
            .send();

        let response = tokio::time::timeout(self.api_timeout, send)
            .await
            .map_err(|_| Error::Transient("pay_to_address timed out".into()))?
            .map_err(Error::Send)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!("payout to {destination} for memo '{memo}' failed: {text}");
            return Err(Error::PaymentFailed(format!(
                "lightning backend responded with {status}: {text}"
            )));
        }

        extract_payment_hash_from_invoice(&invoice)
    }
}

/// Resolves a Lightning address (`user@domain`) or bech32 LNURL-pay string into
/// a bolt11 invoice for `amount_sats`, following the two-step LNURL-pay
/// protocol (GET pay params, GET callback with `amount` in millisats).
async fn resolve_lnurl_pay(
    client: &ClientWithMiddleware,
    destination: &str,
    amount_sats: i64,
    timeout: Duration,
) -> Result<String, Error> {
    let pay_url = lnurl_pay_metadata_url(destination)?;

    #[derive(Deserialize)]
    struct LnurlPayParams {
        callback: String,
        #[serde(rename = "minSendable")]
        min_sendable: i64,
        #[serde(rename = "maxSendable")]
        max_sendable: i64,
    }

    let params: LnurlPayParams = tokio::time::timeout(timeout, client.get(pay_url).send())
        .await
        .map_err(|_| Error::Transient("lnurl-pay metadata request timed out".into()))?
        .map_err(Error::Send)?
        .json()
        .await
        .map_err(|_| Error::InvalidAddress(format!("invalid lnurl-pay metadata for {destination}")))?;

    let amount_msat = amount_sats * 1000;
    if amount_msat < params.min_sendable || amount_msat > params.max_sendable {
        return Err(Error::InvalidAddress(format!(
            "amount {amount_sats} sats out of range [{}, {}] msat for {destination}",
            params.min_sendable, params.max_sendable
        )));
    }

    let callback_url = Url::parse_with_params(&params.callback, [("amount", amount_msat.to_string())])
        .map_err(|e| Error::InvalidAddress(format!("invalid lnurl-pay callback: {e}")))?;

    #[derive(Deserialize)]
    struct LnurlPayCallbackResponse {
        pr: String,
    }

    let callback: LnurlPayCallbackResponse =
        tokio::time::timeout(timeout, client.get(callback_url).send())
            .await
            .map_err(|_| Error::Transient("lnurl-pay callback request timed out".into()))?
            .map_err(Error::Send)?
            .json()
            .await
            .map_err(|_| Error::InvalidAddress(format!("invalid lnurl-pay callback body for {destination}")))?;

    Ok(callback.pr)
}

/// Lightning addresses (`name@domain`) map to
/// `https://domain/.well-known/lnurlp/name`; bare `lnurl1...` bech32 strings are
/// decoded to their encoded HTTPS URL.
fn lnurl_pay_metadata_url(destination: &str) -> Result<Url, Error> {
    if let Some((name, domain)) = destination.split_once('@') {
        Url::parse(&format!("https://{domain}/.well-known/lnurlp/{name}"))
            .map_err(|e| Error::InvalidAddress(e.to_string()))
    } else if let Ok((_hrp, data)) = bech32::decode(destination) {
        let url = String::from_utf8(data).map_err(|e| Error::InvalidAddress(e.to_string()))?;
        Url::parse(&url).map_err(|e| Error::InvalidAddress(e.to_string()))
    } else {
        Err(Error::InvalidAddress(format!(
            "destination is neither a lightning address nor a bech32 LNURL: {destination}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lightning_address_maps_to_well_known_url() {
        let url = lnurl_pay_metadata_url("alice@example.com").unwrap();
        assert_eq!(url.as_str(), "https://example.com/.well-known/lnurlp/alice");
    }

    #[test]
    fn malformed_destination_is_rejected() {
        assert!(lnurl_pay_metadata_url("not-an-address-or-lnurl").is_err());
    }
}
