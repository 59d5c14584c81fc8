//! Anti-Cheat Gate (spec.md §4.6): a pure function over submitted attempt
//! telemetry, no I/O. Tiered error/warning thresholds, never a hard reject
//! past the listed checks.

use serde::Serialize;
use sha2::{Digest, Sha256};

const SCORE_PER_SECOND_MAX: f64 = 50.0;
const SCORE_PER_LEVEL_MAX: f64 = 1000.0;
const WARNING_FRACTION: f64 = 0.8;
const FRAME_RATE_HZ: f64 = 60.0;
const FRAME_COUNT_TOLERANCE: f64 = 0.5;
const MIN_INPUT_LOG_LEN: usize = 10;
const MIN_INTERVAL_MS: f64 = 16.0;
const MIN_INTERVAL_SAMPLE_FOR_CV: usize = 20;
const MIN_COEFFICIENT_OF_VARIATION: f64 = 0.05;
const MAX_INPUTS_PER_SECOND: f64 = 30.0;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GateResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub confidence: i32,
}

pub struct Submission<'a> {
    pub score: i64,
    pub level: i64,
    pub duration_ms: i64,
    pub frame_count: Option<i64>,
    pub input_log: Option<&'a [i64]>,
}

/// Runs every tiered check and folds the result into `{valid, errors,
/// warnings, confidence}`. `confidence = max(0, min(100, 100 - 30*errors -
/// 10*warnings))`; valid iff no errors were raised.
pub fn evaluate(submission: &Submission) -> GateResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let duration_s = submission.duration_ms as f64 / 1000.0;
    if duration_s > 0.0 {
        let score_rate = submission.score as f64 / duration_s;
        if score_rate > SCORE_PER_SECOND_MAX {
            errors.push("score_per_second_exceeds_bound".to_string());
        } else if score_rate > SCORE_PER_SECOND_MAX * WARNING_FRACTION {
            warnings.push("score_per_second_near_bound".to_string());
        }
    }

    if submission.level > 0 {
        let score_per_level = submission.score as f64 / submission.level as f64;
        if score_per_level > SCORE_PER_LEVEL_MAX {
            errors.push("score_per_level_exceeds_bound".to_string());
        } else if score_per_level > SCORE_PER_LEVEL_MAX * WARNING_FRACTION {
            warnings.push("score_per_level_near_bound".to_string());
        }
    }

    let expected_frames = duration_s * FRAME_RATE_HZ;
    match submission.frame_count {
        Some(frame_count) if expected_frames > 0.0 => {
            let deviation = (frame_count as f64 - expected_frames).abs() / expected_frames;
            if deviation > FRAME_COUNT_TOLERANCE {
                errors.push("frame_count_inconsistent_with_duration".to_string());
            }
        }
        None => warnings.push("frame_count_missing".to_string()),
        _ => {}
    }

    if let Some(log) = submission.input_log {
        if log.len() >= MIN_INPUT_LOG_LEN {
            let intervals: Vec<f64> = log
                .windows(2)
                .map(|pair| (pair[1] - pair[0]) as f64)
                .collect();

            if let Some(&min_interval) = intervals
                .iter()
                .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            {
                if min_interval < MIN_INTERVAL_MS {
                    errors.push("superhuman_input_interval".to_string());
                }
            }

            if intervals.len() > MIN_INTERVAL_SAMPLE_FOR_CV {
                if let Some(cv) = coefficient_of_variation(&intervals) {
                    if cv < MIN_COEFFICIENT_OF_VARIATION {
                        warnings.push("input_intervals_too_regular".to_string());
                    }
                }
            }

            let mean_interval = intervals.iter().sum::<f64>() / intervals.len() as f64;
            if mean_interval > 0.0 {
                let rate_per_second = 1000.0 / mean_interval;
                if rate_per_second > MAX_INPUTS_PER_SECOND {
                    warnings.push("input_rate_too_high".to_string());
                }
            }
        }
    }

    let confidence = (100 - 30 * errors.len() as i32 - 10 * warnings.len() as i32).clamp(0, 100);

    GateResult {
        valid: errors.is_empty(),
        errors,
        warnings,
        confidence,
    }
}

fn coefficient_of_variation(samples: &[f64]) -> Option<f64> {
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    if mean == 0.0 {
        return None;
    }
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / samples.len() as f64;
    Some(variance.sqrt() / mean)
}

/// Opaque per-submission correlator for reject-decision logs. The user ID
/// must never be logged directly alongside anti-cheat diagnostics.
pub fn redacted_correlator(user_id: &str, timestamp_unix_ms: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(timestamp_unix_ms.to_le_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline() -> Submission<'static> {
        Submission {
            score: 1000,
            level: 5,
            duration_ms: 60_000,
            frame_count: Some(3600),
            input_log: None,
        }
    }

    #[test]
    fn plausible_submission_is_valid_with_full_confidence() {
        let result = evaluate(&baseline());
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert_eq!(result.confidence, 100);
    }

    #[test]
    fn score_rate_far_beyond_bound_is_an_error() {
        let submission = Submission {
            score: 100_000,
            duration_ms: 1_000,
            ..baseline()
        };
        let result = evaluate(&submission);
        assert!(!result.valid);
        assert!(result.errors.contains(&"score_per_second_exceeds_bound".to_string()));
    }

    #[test]
    fn score_rate_near_bound_is_only_a_warning() {
        let submission = Submission {
            score: 45,
            duration_ms: 1_000,
            level: 100,
            frame_count: Some(60),
            input_log: None,
        };
        let result = evaluate(&submission);
        assert!(result.valid);
        assert!(result.warnings.contains(&"score_per_second_near_bound".to_string()));
        assert_eq!(result.confidence, 90);
    }

    #[test]
    fn frame_count_wildly_inconsistent_is_an_error() {
        let submission = Submission {
            frame_count: Some(1),
            ..baseline()
        };
        let result = evaluate(&submission);
        assert!(!result.valid);
        assert!(result
            .errors
            .contains(&"frame_count_inconsistent_with_duration".to_string()));
    }

    #[test]
    fn missing_frame_count_is_a_warning_not_an_error() {
        let submission = Submission {
            frame_count: None,
            ..baseline()
        };
        let result = evaluate(&submission);
        assert!(result.valid);
        assert!(result.warnings.contains(&"frame_count_missing".to_string()));
    }

    #[test]
    fn sub_frame_input_interval_is_superhuman() {
        let log: Vec<i64> = (0..15).map(|i| i * 5).collect();
        let submission = Submission {
            input_log: Some(&log),
            ..baseline()
        };
        let result = evaluate(&submission);
        assert!(!result.valid);
        assert!(result.errors.contains(&"superhuman_input_interval".to_string()));
    }

    #[test]
    fn perfectly_regular_intervals_are_a_warning() {
        let log: Vec<i64> = (0..25).map(|i| i * 100).collect();
        let submission = Submission {
            input_log: Some(&log),
            ..baseline()
        };
        let result = evaluate(&submission);
        assert!(result.warnings.contains(&"input_intervals_too_regular".to_string()));
    }

    #[test]
    fn correlator_is_stable_and_opaque() {
        let a = redacted_correlator("user-1", 1_000);
        let b = redacted_correlator("user-1", 1_000);
        let c = redacted_correlator("user-2", 1_000);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 12);
    }
}
