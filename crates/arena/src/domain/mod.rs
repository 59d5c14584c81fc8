//! Domain layer: stores, the wallet ledger, the tournament engine, sessions.

pub mod payments;
pub mod sessions;
pub mod tournament;
pub mod users;
pub mod wallet;
pub mod whitelist;

use thiserror::Error;

/// Per-request error type every store/service method returns. The HTTP layer's
/// `IntoResponse` impl (`api::error`) maps each variant to a status code and a
/// message policy (operational = expose verbatim, internal = redact + correlation id).
#[derive(Error, Debug)]
pub enum Error {
    #[error("not found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("{1}")]
    Conflict(&'static str, String),

    #[error("insufficient balance")]
    InsufficientFunds { balance: i64, needed: i64 },

    #[error("unauthenticated")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("upstream temporarily unavailable: {0}")]
    Transient(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        // Query text must never reach a log line or a response; only the fixed
        // `Display` of the wrapped error is logged by the caller.
        Error::Internal(anyhow::anyhow!("database error: {e}"))
    }
}

impl From<arena_core::CoreError> for Error {
    fn from(e: arena_core::CoreError) -> Self {
        Error::BadRequest(e.to_string())
    }
}
