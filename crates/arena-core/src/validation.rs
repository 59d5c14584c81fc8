//! Validation utilities shared between the HTTP layer and its tests.

use crate::CoreError;

pub const SCORE_MIN: i64 = 0;
pub const SCORE_MAX: i64 = 10_000_000;
pub const LEVEL_MIN: i64 = 1;
pub const LEVEL_MAX: i64 = 10_000;
pub const DURATION_MS_MIN: i64 = 5_000;
pub const DURATION_MS_MAX: i64 = 86_400_000;
pub const INPUT_LOG_MAX_LEN: usize = 50_000;

/// Numeric-range validation for a score submission (spec.md §4.5 item 1).
/// Pure and side-effect free so it can run before any store/cache access.
pub fn validate_submission_shape(
    score: i64,
    level: i64,
    duration_ms: i64,
    frame_count: Option<i64>,
    input_log_len: Option<usize>,
) -> Result<(), CoreError> {
    if !(SCORE_MIN..=SCORE_MAX).contains(&score) {
        return Err(CoreError::Validation(format!(
            "score must be in [{SCORE_MIN}, {SCORE_MAX}]"
        )));
    }
    if !(LEVEL_MIN..=LEVEL_MAX).contains(&level) {
        return Err(CoreError::Validation(format!(
            "level must be in [{LEVEL_MIN}, {LEVEL_MAX}]"
        )));
    }
    if !(DURATION_MS_MIN..=DURATION_MS_MAX).contains(&duration_ms) {
        return Err(CoreError::Validation(format!(
            "duration_ms must be in [{DURATION_MS_MIN}, {DURATION_MS_MAX}]"
        )));
    }
    if let Some(frames) = frame_count {
        if frames < 0 {
            return Err(CoreError::Validation(
                "frame_count must be non-negative".into(),
            ));
        }
    }
    if let Some(len) = input_log_len {
        if len > INPUT_LOG_MAX_LEN {
            return Err(CoreError::Validation(format!(
                "input_log length must not exceed {INPUT_LOG_MAX_LEN}"
            )));
        }
    }
    Ok(())
}

/// Display-name sanitization: printable alphanumeric plus `_-. `, 2-20 chars.
pub fn validate_display_name(name: &str) -> Result<(), CoreError> {
    let len = name.chars().count();
    if !(2..=20).contains(&len) {
        return Err(CoreError::Validation(
            "display name must be 2-20 characters".into(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ' '))
    {
        return Err(CoreError::Validation(
            "display name contains disallowed characters".into(),
        ));
    }
    Ok(())
}

/// Username validation: 3-30 chars, lowercase alphanumeric + underscore.
pub fn validate_username(username: &str) -> Result<(), CoreError> {
    let len = username.chars().count();
    if !(3..=30).contains(&len) {
        return Err(CoreError::Validation(
            "username must be 3-30 characters".into(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(CoreError::Validation(
            "username must be lowercase alphanumeric or underscore".into(),
        ));
    }
    Ok(())
}

/// Normalizes a Lightning payment hash: trim, lowercase, strip dashes, then
/// require `^[a-f0-9]{64}$`.
pub fn normalize_payment_hash(raw: &str) -> Result<String, CoreError> {
    let normalized: String = raw
        .trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| *c != '-')
        .collect();
    if normalized.len() != 64 || !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CoreError::Validation(
            "payment hash must be 64 lowercase hex characters".into(),
        ));
    }
    Ok(normalized)
}

/// Deposit amount validation: finite non-negative integer in [10, 10_000_000] sats.
pub fn validate_deposit_amount(amount_sats: i64) -> Result<(), CoreError> {
    if !(10..=10_000_000).contains(&amount_sats) {
        return Err(CoreError::Validation(
            "amountSats must be between 10 and 10,000,000".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_in_range_submission() {
        assert!(validate_submission_shape(1000, 5, 30_000, Some(1800), Some(100)).is_ok());
    }

    #[test]
    fn rejects_score_out_of_range() {
        assert!(validate_submission_shape(-1, 5, 30_000, None, None).is_err());
        assert!(validate_submission_shape(SCORE_MAX + 1, 5, 30_000, None, None).is_err());
    }

    #[test]
    fn rejects_duration_out_of_range() {
        assert!(validate_submission_shape(100, 5, 4_999, None, None).is_err());
        assert!(validate_submission_shape(100, 5, DURATION_MS_MAX + 1, None, None).is_err());
    }

    #[test]
    fn normalizes_payment_hash() {
        let hash = "A".repeat(64);
        let normalized = normalize_payment_hash(&hash).unwrap();
        assert_eq!(normalized, "a".repeat(64));
    }

    #[test]
    fn rejects_malformed_payment_hash() {
        assert!(normalize_payment_hash("not-hex").is_err());
        assert!(normalize_payment_hash(&"a".repeat(63)).is_err());
    }

    #[test]
    fn username_rules() {
        assert!(validate_username("player_1").is_ok());
        assert!(validate_username("AB").is_err());
        assert!(validate_username("Has-Upper").is_err());
    }
}
