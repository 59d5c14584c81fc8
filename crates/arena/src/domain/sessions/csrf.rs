//! CSRF double-submit cookie (spec.md §4.8). Stateless by design: the server
//! mints a random token into a same-site cookie and requires the caller to
//! echo it in `X-CSRF-Token` on state-changing requests. No server-side
//! storage is needed — an off-origin attacker can neither read the cookie nor
//! guess the token, so a match proves same-origin intent.

use rand::RngCore;
use subtle::ConstantTimeEq;

pub const CSRF_TOKEN_HEX_LEN: usize = 64;

pub struct CsrfGuard;

impl CsrfGuard {
    /// Mints a fresh 64-hex CSRF token for the `/csrf-token` endpoint and for
    /// any request that arrives without one.
    pub fn mint() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Constant-time compare of the cookie value against the `X-CSRF-Token`
    /// header. A length mismatch is checked first (and is not timing-
    /// sensitive, since token length is public) before the constant-time
    /// comparison of equal-length buffers.
    pub fn verify(cookie_value: &str, header_value: &str) -> bool {
        if cookie_value.len() != header_value.len() {
            return false;
        }
        cookie_value.as_bytes().ct_eq(header_value.as_bytes()).into()
    }
}

/// HTTP methods exempt from the CSRF check (spec.md §4.8 "safe methods").
/// Takes the method name rather than a transport-layer type so this module
/// stays independent of the HTTP framework.
pub fn is_safe_method(method: &str) -> bool {
    matches!(method, "GET" | "HEAD" | "OPTIONS")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_produces_64_hex_chars() {
        let token = CsrfGuard::mint();
        assert_eq!(token.len(), CSRF_TOKEN_HEX_LEN);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn verify_accepts_matching_tokens() {
        let token = CsrfGuard::mint();
        assert!(CsrfGuard::verify(&token, &token));
    }

    #[test]
    fn verify_rejects_mismatched_or_wrong_length() {
        let a = CsrfGuard::mint();
        let b = CsrfGuard::mint();
        assert!(!CsrfGuard::verify(&a, &b));
        assert!(!CsrfGuard::verify(&a, &a[..10]));
    }

    #[test]
    fn safe_methods_are_exempt() {
        assert!(is_safe_method("GET"));
        assert!(!is_safe_method("POST"));
    }
}
