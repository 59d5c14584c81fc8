//! Mock Price Oracle for dev/e2e, gated the same way the teacher gates
//! `MockOracle`/`MockBitcoinClient`: available only under `e2e-testing` or debug
//! builds, refused in pure release builds.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

use super::oracle::{Error, Oracle};

pub struct MockOracle {
    rate_bits: AtomicU64,
}

impl MockOracle {
    pub fn new(initial_rate: f64) -> Self {
        Self {
            rate_bits: AtomicU64::new(initial_rate.to_bits()),
        }
    }

    pub fn set_rate(&self, rate: f64) {
        self.rate_bits.store(rate.to_bits(), Ordering::SeqCst);
    }
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new(65_000.0)
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn btc_usd_rate(&self) -> Result<f64, Error> {
        Ok(f64::from_bits(self.rate_bits.load(Ordering::SeqCst)))
    }
}
