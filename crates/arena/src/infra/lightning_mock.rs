//! Mock Lightning adapter for dev/e2e, gated like the teacher's `MockLnClient`:
//! auto-settles invoices after an optional delay instead of waiting on a real
//! Lightning backend.

use async_trait::async_trait;
use rand::RngCore;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use super::lightning::{CreatedInvoice, Error, Ln, PaymentState};

pub struct MockLnClient {
    auto_accept_after: Option<Duration>,
    paid: Mutex<HashSet<String>>,
    created_at: Mutex<std::collections::HashMap<String, std::time::Instant>>,
}

impl MockLnClient {
    pub fn new() -> Self {
        Self {
            auto_accept_after: None,
            paid: Mutex::new(HashSet::new()),
            created_at: Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn with_auto_accept(delay: Duration) -> Self {
        Self {
            auto_accept_after: Some(delay),
            paid: Mutex::new(HashSet::new()),
            created_at: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Test hook: force a payment hash to appear paid immediately.
    pub fn mark_paid(&self, payment_hash: &str) {
        self.paid
            .lock()
            .expect("mock ln mutex poisoned")
            .insert(payment_hash.to_string());
    }
}

impl Default for MockLnClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Ln for MockLnClient {
    async fn create_invoice(
        &self,
        _amount_sats: i64,
        _expiry_secs: u64,
        _memo: &str,
    ) -> Result<CreatedInvoice, Error> {
        let mut hash_bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut hash_bytes);
        let payment_hash = hex::encode(hash_bytes);

        self.created_at
            .lock()
            .expect("mock ln mutex poisoned")
            .insert(payment_hash.clone(), std::time::Instant::now());

        Ok(CreatedInvoice {
            payment_request: format!("lnmock1{payment_hash}"),
            payment_hash,
        })
    }

    async fn payment_status(&self, payment_hash: &str) -> Result<PaymentState, Error> {
        if self
            .paid
            .lock()
            .expect("mock ln mutex poisoned")
            .contains(payment_hash)
        {
            return Ok(PaymentState::Paid);
        }

        if let Some(delay) = self.auto_accept_after {
            let created_at = self
                .created_at
                .lock()
                .expect("mock ln mutex poisoned")
                .get(payment_hash)
                .copied();
            if let Some(created_at) = created_at {
                if created_at.elapsed() >= delay {
                    self.paid
                        .lock()
                        .expect("mock ln mutex poisoned")
                        .insert(payment_hash.to_string());
                    return Ok(PaymentState::Paid);
                }
            }
        }

        Ok(PaymentState::Pending)
    }

    async fn pay_to_address(
        &self,
        _destination: &str,
        _amount_sats: i64,
        _memo: &str,
    ) -> Result<String, Error> {
        let mut hash_bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut hash_bytes);
        Ok(hex::encode(hash_bytes))
    }
}
