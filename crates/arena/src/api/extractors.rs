//! Request-boundary primitives shared by every route handler: bearer-token
//! session authentication, the CSRF double-submit cookie, and the client
//! identity used to key rate-limit buckets and security log lines.

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::domain::sessions::csrf::CsrfGuard;
use crate::domain::users::User;
use crate::domain::Error as DomainError;
use crate::startup::AppState;

pub const CSRF_COOKIE_NAME: &str = "csrf_token";

/// The authenticated caller, resolved from `Authorization: Bearer <token>`
/// against the Session & Access Substrate (spec.md §4.8). Any route taking
/// this extractor requires a valid, unexpired session.
pub struct AuthedUser(pub User);

impl FromRequestParts<Arc<AppState>> for AuthedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(ApiError::Domain(DomainError::Unauthorized))?;
        let session = state
            .sessions
            .get(token)
            .await?
            .ok_or(ApiError::Domain(DomainError::Unauthorized))?;
        let user = state.users.get(&session.user_id).await?;
        Ok(AuthedUser(user))
    }
}

/// The caller's IP, used to key the anonymous rate-limit buckets (auth,
/// global) and security log lines (spec.md §4.8). Requires
/// `into_make_service_with_connect_info` on the server, mirroring the
/// teacher's own setup.
pub struct ClientIp(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(ClientIp(ip))
    }
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Reads a single named cookie out of the raw `Cookie` header. Hand-rolled
/// rather than pulling in a cookie-jar extractor: the double-submit check
/// only ever needs one value, read once, compared once.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}

/// `Set-Cookie` value that mints or refreshes the CSRF cookie. `SameSite=Strict`
/// plus non-`HttpOnly` so the frontend can read it back to echo in
/// `X-CSRF-Token`, per the double-submit pattern (spec.md §4.8).
pub fn csrf_set_cookie_header(token: &str) -> String {
    format!("{CSRF_COOKIE_NAME}={token}; Path=/; SameSite=Strict")
}

/// Checks a named rate-limit bucket and maps a miss to the 429 response
/// (spec.md §4.8, §6). `identity` is the caller's IP for anonymous buckets or
/// user id for authenticated ones.
pub async fn enforce_rate_limit(
    state: &AppState,
    bucket: &str,
    identity: &str,
    config: crate::domain::sessions::rate_limit::RateLimitConfig,
) -> Result<(), ApiError> {
    if state.rate_limiter.check(bucket, identity, config).await {
        Ok(())
    } else {
        Err(ApiError::RateLimited)
    }
}

/// Verifies the double-submit CSRF pair for a state-changing request
/// (spec.md §4.8): the cookie value must match the `X-CSRF-Token` header,
/// compared in constant time.
pub fn verify_csrf(headers: &HeaderMap) -> Result<(), ApiError> {
    let cookie = read_cookie(headers, CSRF_COOKIE_NAME).ok_or(ApiError::CsrfMismatch)?;
    let header = headers
        .get("x-csrf-token")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::CsrfMismatch)?;
    if CsrfGuard::verify(&cookie, header) {
        Ok(())
    } else {
        Err(ApiError::CsrfMismatch)
    }
}
