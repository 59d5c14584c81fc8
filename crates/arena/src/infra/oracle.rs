//! Price Oracle Adapter: cached BTC/USD lookup with bounded fallback.
//!
//! Grounded on `coordinator/src/infra/oracle.rs`: the `Error` enum with
//! `is_transient()`, the HTTP status -> error-variant classification, and the
//! `async_trait` adapter trait are kept; the body is rewritten from DLC event
//! creation/attestation to a simple BTC/USD price GET.

use async_trait::async_trait;
use log::{error, warn};
use reqwest_middleware::{
    reqwest::{StatusCode, Url},
    ClientWithMiddleware,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::infra::cache::Cache;

#[derive(Error, Debug)]
pub enum Error {
    #[error("problem sending request to price oracle: {0}")]
    Send(#[from] reqwest_middleware::reqwest::Error),
    #[error("problem sending request to price oracle: {0}")]
    SendRetry(#[from] reqwest_middleware::Error),
    #[error("bad response from price oracle: {0}")]
    BadRequest(String),
    #[error("price oracle temporarily unavailable: {0}")]
    Transient(String),
}

impl Error {
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::SendRetry(_))
    }
}

#[async_trait]
pub trait Oracle: Send + Sync {
    /// Current BTC/USD rate (USD per 1 BTC).
    async fn btc_usd_rate(&self) -> Result<f64, Error>;
}

/// Memoizes the upstream rate behind the Ephemeral Cache for `cache_ttl` and
/// falls back to `fallback_price` after `max_consecutive_failures` consecutive
/// upstream failures, per `BTC_FALLBACK_PRICE` (spec.md §6).
pub struct OracleClient {
    base_url: Url,
    client: ClientWithMiddleware,
    cache: Arc<dyn Cache>,
    cache_key: String,
    cache_ttl: Duration,
    fallback_price: f64,
    max_consecutive_failures: u32,
    consecutive_failures: AtomicU32,
    last_known_good: RwLock<Option<f64>>,
}

impl OracleClient {
    pub fn new(
        client: ClientWithMiddleware,
        base_url: Url,
        cache: Arc<dyn Cache>,
        cache_ttl: Duration,
        fallback_price: f64,
        max_consecutive_failures: u32,
    ) -> Self {
        Self {
            base_url,
            client,
            cache,
            cache_key: "oracle:btc_usd_rate".to_string(),
            cache_ttl,
            fallback_price,
            max_consecutive_failures,
            consecutive_failures: AtomicU32::new(0),
            last_known_good: RwLock::new(None),
        }
    }

    async fn fetch_rate(&self) -> Result<f64, Error> {
        let url = self
            .base_url
            .join("/rate/btc_usd")
            .map_err(|e| Error::BadRequest(e.to_string()))?;

        let response = self.client.get(url).send().await.map_err(|e| {
            error!("error sending to price oracle: {e}");
            Error::SendRetry(e)
        })?;

        if response.status().is_success() {
            #[derive(serde::Deserialize)]
            struct RateResponse {
                rate: f64,
            }
            let parsed: RateResponse = response.json().await.map_err(Error::Send)?;
            Ok(parsed.rate)
        } else if response.status() == StatusCode::SERVICE_UNAVAILABLE
            || response.status() == StatusCode::BAD_GATEWAY
            || response.status() == StatusCode::GATEWAY_TIMEOUT
            || response.status() == StatusCode::TOO_MANY_REQUESTS
        {
            let status = response.status();
            Err(Error::Transient(format!(
                "price oracle responded with status {status}"
            )))
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Error::BadRequest(format!(
                "price oracle responded with status {status}: {body}"
            )))
        }
    }
}

#[async_trait]
impl Oracle for OracleClient {
    async fn btc_usd_rate(&self) -> Result<f64, Error> {
        if let Some(cached) = self.cache.get(&self.cache_key).await {
            if let Ok(text) = std::str::from_utf8(&cached) {
                if let Ok(rate) = text.parse::<f64>() {
                    return Ok(rate);
                }
            }
        }

        match tokio::time::timeout(Duration::from_secs(5), self.fetch_rate()).await {
            Ok(Ok(rate)) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                *self.last_known_good.write().await = Some(rate);
                self.cache
                    .set(
                        &self.cache_key,
                        rate.to_string().into_bytes(),
                        self.cache_ttl,
                    )
                    .await;
                Ok(rate)
            }
            Ok(Err(e)) => Ok(self.handle_failure(e).await),
            Err(_) => Ok(self.handle_failure(Error::Transient("timed out".into())).await),
        }
    }
}

impl OracleClient {
    async fn handle_failure(&self, e: Error) -> f64 {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        warn!("price oracle fetch failed ({failures} consecutive): {e}");

        if let Some(last_good) = *self.last_known_good.read().await {
            if failures < self.max_consecutive_failures {
                return last_good;
            }
        }
        warn!(
            "price oracle exceeded {} consecutive failures, using BTC_FALLBACK_PRICE={}",
            self.max_consecutive_failures, self.fallback_price
        );
        self.fallback_price
    }
}
