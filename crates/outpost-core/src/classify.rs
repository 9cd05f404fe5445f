//! Send-failure classification and retry backoff
//!
//! Provider error text is not a stable contract, so classification matches
//! on HTTP status codes first and falls back to substring heuristics. The
//! pattern lists live here and nowhere else.

/// What to do with a failed send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Quota/plan/payment exhaustion; pause the whole campaign
    HardLimit,
    /// Transient; retry with backoff within the item's budget
    Retryable,
    /// Not worth retrying
    Terminal,
}

/// Wording that indicates account-level quota or payment exhaustion
const HARD_LIMIT_MARKERS: &[&str] = &["exceed", "limit", "quota", "payment"];

/// 403 bodies that are quota problems rather than real permission errors
const FORBIDDEN_QUOTA_MARKERS: &[&str] = &["quota", "limit", "trial"];

/// Wording that indicates a transient network or provider hiccup
const RETRYABLE_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "connection reset",
    "econnreset",
    "socket hang up",
    "network",
    "temporarily",
    "try again",
];

/// Classify a failed send attempt from its HTTP status and error text.
///
/// Status codes take precedence over text matching: a 429 whose body says
/// "rate limit exceeded" is transient throttling, not plan exhaustion.
pub fn classify_send_failure(status: Option<u16>, message: &str) -> FailureKind {
    let text = message.to_lowercase();

    match status {
        Some(402) => return FailureKind::HardLimit,
        Some(403) if FORBIDDEN_QUOTA_MARKERS.iter().any(|m| text.contains(m)) => {
            return FailureKind::HardLimit;
        }
        Some(408) | Some(429) => return FailureKind::Retryable,
        Some(s) if s >= 500 => return FailureKind::Retryable,
        _ => {}
    }

    if HARD_LIMIT_MARKERS.iter().any(|m| text.contains(m)) {
        return FailureKind::HardLimit;
    }

    if RETRYABLE_MARKERS.iter().any(|m| text.contains(m)) {
        return FailureKind::Retryable;
    }

    FailureKind::Terminal
}

/// Backoff cap: no retry waits longer than 10 minutes
pub const BACKOFF_CAP_MS: i64 = 10 * 60 * 1000;

/// Maximum jitter added to a computed backoff
pub const BACKOFF_JITTER_MS: i64 = 500;

/// Deterministic part of the retry backoff:
/// clamped base delay × min(10, max(1, attempts)), capped at 10 minutes.
pub fn retry_backoff_ms(attempts: i32, base_delay_ms: i64) -> i64 {
    let base = base_delay_ms.clamp(500, 60_000);
    let multiplier = i64::from(attempts.clamp(1, 10));
    (base * multiplier).min(BACKOFF_CAP_MS)
}

/// Backoff with 0–500 ms of jitter to spread concurrent retries, still
/// within the cap.
pub fn retry_backoff_with_jitter_ms(attempts: i32, base_delay_ms: i64) -> i64 {
    use rand::Rng;
    let jitter = rand::thread_rng().gen_range(0..=BACKOFF_JITTER_MS);
    (retry_backoff_ms(attempts, base_delay_ms) + jitter).min(BACKOFF_CAP_MS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_402_is_hard_limit() {
        assert_eq!(
            classify_send_failure(Some(402), "payment required"),
            FailureKind::HardLimit
        );
    }

    #[test]
    fn status_403_with_quota_wording_is_hard_limit() {
        assert_eq!(
            classify_send_failure(Some(403), "Trial account restriction"),
            FailureKind::HardLimit
        );
        // A plain permission error stays terminal
        assert_eq!(
            classify_send_failure(Some(403), "forbidden"),
            FailureKind::Terminal
        );
    }

    #[test]
    fn throttling_statuses_are_retryable() {
        assert_eq!(
            classify_send_failure(Some(429), "rate limit exceeded"),
            FailureKind::Retryable
        );
        assert_eq!(
            classify_send_failure(Some(408), "request timeout"),
            FailureKind::Retryable
        );
        assert_eq!(
            classify_send_failure(Some(503), "bad gateway"),
            FailureKind::Retryable
        );
    }

    #[test]
    fn quota_wording_without_status_is_hard_limit() {
        assert_eq!(
            classify_send_failure(None, "monthly message quota reached"),
            FailureKind::HardLimit
        );
        assert_eq!(
            classify_send_failure(None, "You exceed your plan"),
            FailureKind::HardLimit
        );
    }

    #[test]
    fn network_wording_is_retryable() {
        assert_eq!(
            classify_send_failure(None, "connection reset by peer"),
            FailureKind::Retryable
        );
        assert_eq!(
            classify_send_failure(None, "operation timed out"),
            FailureKind::Retryable
        );
    }

    #[test]
    fn unknown_errors_are_terminal() {
        assert_eq!(
            classify_send_failure(Some(400), "invalid phone number"),
            FailureKind::Terminal
        );
        assert_eq!(classify_send_failure(None, "nope"), FailureKind::Terminal);
    }

    #[test]
    fn backoff_grows_then_caps() {
        assert_eq!(retry_backoff_ms(1, 500), 500);
        assert_eq!(retry_backoff_ms(3, 500), 1500);
        assert_eq!(retry_backoff_ms(10, 60_000), BACKOFF_CAP_MS);
        // Multiplier saturates at 10
        assert_eq!(retry_backoff_ms(40, 1000), 10_000);
    }

    #[test]
    fn backoff_clamps_base() {
        assert_eq!(retry_backoff_ms(1, 10), 500);
        assert_eq!(retry_backoff_ms(1, 1_000_000), 60_000);
    }

    #[test]
    fn backoff_bounded_for_all_budgets() {
        for attempts in 1..=50 {
            for base in [500, 5_000, 30_000, 60_000] {
                let d = retry_backoff_with_jitter_ms(attempts, base);
                assert!(d >= 0 && d <= BACKOFF_CAP_MS, "attempts={} base={}", attempts, base);
            }
        }
    }
}
