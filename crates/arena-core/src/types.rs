//! Shared value types for the wallet ledger, payment pipeline, and tournament engine.

use serde::{Deserialize, Serialize};

/// Closed set of journal entry kinds. Never extended with a free-text column.
/// `Payout` is listed for completeness with the persisted `type` column's
/// `CHECK` constraint; payouts settle externally over Lightning straight to
/// the winner's destination and are never credited against an internal
/// wallet balance, so no code path constructs one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    BuyIn,
    #[allow(dead_code)]
    Payout,
    Refund,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::BuyIn => "buy_in",
            TransactionType::Payout => "payout",
            TransactionType::Refund => "refund",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = crate::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionType::Deposit),
            "buy_in" => Ok(TransactionType::BuyIn),
            "payout" => Ok(TransactionType::Payout),
            "refund" => Ok(TransactionType::Refund),
            other => Err(crate::CoreError::Validation(format!(
                "unknown transaction type: {other}"
            ))),
        }
    }
}

/// What an in-flight Lightning payment hash is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    BuyIn,
    Deposit,
}

/// Lifecycle of a winner's Payout row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Paid,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Paid => "paid",
        }
    }
}

impl std::str::FromStr for PayoutStatus {
    type Err = crate::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PayoutStatus::Pending),
            "paid" => Ok(PayoutStatus::Paid),
            other => Err(crate::CoreError::Validation(format!(
                "unknown payout status: {other}"
            ))),
        }
    }
}

/// Tournament lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    Open,
    Completed,
}

impl TournamentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentStatus::Open => "open",
            TournamentStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for TournamentStatus {
    type Err = crate::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TournamentStatus::Open),
            "completed" => Ok(TournamentStatus::Completed),
            other => Err(crate::CoreError::Validation(format!(
                "unknown tournament status: {other}"
            ))),
        }
    }
}

/// One of the three attempt-score columns. Fixed allowlist — never interpolated
/// textually into a query; store code matches on this to select a literal UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptSlot {
    First,
    Second,
    Third,
}

impl AttemptSlot {
    pub fn from_k(k: u32) -> Option<Self> {
        match k {
            1 => Some(AttemptSlot::First),
            2 => Some(AttemptSlot::Second),
            3 => Some(AttemptSlot::Third),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            AttemptSlot::First => 1,
            AttemptSlot::Second => 2,
            AttemptSlot::Third => 3,
        }
    }
}

pub const MAX_ATTEMPTS: u32 = 3;

/// House cut applied at tournament close.
pub const HOUSE_FEE: f64 = 0.02;

/// Prize split for places 1..3, applied to the distributable pool in order.
pub const PAYOUT_PERCENTAGES: [f64; 3] = [0.50, 0.30, 0.20];
