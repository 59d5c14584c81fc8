//! Maps the domain `Error` enum (and the handful of access-control failures
//! that only exist at the HTTP boundary) to a status code and a message
//! policy, per spec.md §7: operational errors are exposed verbatim from a
//! static allow-list, everything else is replaced with a generic message plus
//! a correlation id.
//!
//! Grounded on `crates/server/src/routes/mod.rs`'s `impl IntoResponse for
//! Error` (match on variant, catch-all maps to 500 with a generic message).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;
use rand::RngCore;
use serde_json::json;

use crate::domain::Error as DomainError;

/// Failures that only make sense at the HTTP boundary: CSRF, rate limiting,
/// and webhook signature verification all happen before a request reaches a
/// domain service.
#[derive(Debug)]
pub enum ApiError {
    Domain(DomainError),
    CsrfMismatch,
    RateLimited,
    InvalidSignature,
    UnsupportedMediaType,
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        ApiError::Domain(e)
    }
}

fn correlation_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Domain(DomainError::NotFound) => {
                (StatusCode::NOT_FOUND, json!({"error": "not found"}))
            }
            ApiError::Domain(DomainError::BadRequest(message)) => {
                (StatusCode::BAD_REQUEST, json!({"error": message}))
            }
            ApiError::Domain(DomainError::Conflict(code, message)) => (
                StatusCode::BAD_REQUEST,
                json!({"error": message, "code": code}),
            ),
            ApiError::Domain(DomainError::InsufficientFunds { balance, needed }) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "insufficient balance",
                    "code": "INSUFFICIENT_BALANCE",
                    "balance": balance,
                    "needed": needed,
                }),
            ),
            ApiError::Domain(DomainError::Unauthorized) => {
                (StatusCode::UNAUTHORIZED, json!({"error": "unauthenticated"}))
            }
            ApiError::Domain(DomainError::Forbidden) => {
                (StatusCode::FORBIDDEN, json!({"error": "forbidden"}))
            }
            ApiError::Domain(DomainError::Transient(reason)) => {
                let correlator = correlation_id();
                error!("transient upstream error correlation={correlator}: {reason}");
                (
                    StatusCode::BAD_GATEWAY,
                    json!({"error": "upstream temporarily unavailable", "correlationId": correlator}),
                )
            }
            ApiError::Domain(DomainError::Internal(e)) => {
                let correlator = correlation_id();
                error!("internal error correlation={correlator}: {e:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "An unexpected error occurred", "correlationId": correlator}),
                )
            }
            ApiError::CsrfMismatch => (
                StatusCode::FORBIDDEN,
                json!({"error": "CSRF token missing or mismatched"}),
            ),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({"error": "rate limit exceeded"}),
            ),
            ApiError::InvalidSignature => {
                (StatusCode::UNAUTHORIZED, json!({"error": "Invalid signature"}))
            }
            ApiError::UnsupportedMediaType => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                json!({"error": "expected application/json"}),
            ),
        };
        (status, Json(body)).into_response()
    }
}
