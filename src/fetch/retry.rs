//! Retry policy with exponential backoff for transient transport failures.
//!
//! This module provides the [`RetryPolicy`] and [`FailureType`] types used by
//! the transport to decide, after each failed attempt, whether the same
//! request should be sent again.
//!
//! # Overview
//!
//! When a request fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - 500/502/503/504, connection failures, timeouts
//! - [`FailureType::RateLimited`] - HTTP 429; never retried by the transport
//! - [`FailureType::Permanent`] - everything else (other 4xx, decode errors, TLS)
//!
//! The [`RetryPolicy`] then decides based on the failure type, the request
//! method and the attempt count. Delays grow as
//! `backoff_factor * 2^(attempt - 1)`, capped at `max_backoff`.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use record_fetcher::fetch::{FailureType, RetryDecision, RetryPolicy};
//! use reqwest::Method;
//!
//! let policy = RetryPolicy::new(3, Duration::from_millis(10)).for_method(Method::GET);
//!
//! match policy.should_retry(&Method::GET, FailureType::Transient, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         assert_eq!(delay, Duration::from_millis(10));
//!         assert_eq!(attempt, 2);
//!     }
//!     RetryDecision::DoNotRetry { reason } => panic!("unexpected: {reason}"),
//! }
//! ```

use std::time::Duration;

use reqwest::Method;
use tracing::{debug, instrument};

use super::FetchError;
use super::constants::{DEFAULT_MAX_BACKOFF, RETRYABLE_STATUSES};

/// Default maximum attempts (including the initial one).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff factor (1 second).
const DEFAULT_BACKOFF_FACTOR: Duration = Duration::from_secs(1);

/// Largest exponent used in the backoff calculation; anything above is capped anyway.
const MAX_BACKOFF_EXPONENT: u32 = 32;

/// Classification of request failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: 503 Service Unavailable, connection refused, timeout.
    Transient,

    /// Server rate limiting (HTTP 429).
    ///
    /// Not in the retryable status set; surfaced to the fetch operation,
    /// which logs it separately from other HTTP errors.
    RateLimited,

    /// Failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, 400 Bad Request, undecodable body.
    Permanent,
}

/// Decision on whether to retry a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the request after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry the request.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Transport-level automatic retry configuration.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `backoff_factor`: 1 second
/// - `max_backoff`: 120 seconds
/// - `allowed_methods`: unbound; a session binds it to its own method
///
/// An unbound policy retries whatever method the request uses.
/// # Delay Calculation
///
/// ```text
/// delay = min(backoff_factor * 2^(attempt - 1), max_backoff)
/// ```
///
/// With a factor of 10ms, the waits after attempts 1, 2, 3 are 10ms, 20ms, 40ms.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Base of the exponential backoff.
    backoff_factor: Duration,

    /// Cap on a single backoff wait.
    max_backoff: Duration,

    /// Methods whose requests may be re-sent; `None` until bound.
    allowed_methods: Option<Vec<Method>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_backoff: DEFAULT_MAX_BACKOFF,
            allowed_methods: None,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given attempt budget and backoff factor.
    ///
    /// `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, backoff_factor: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_factor,
            ..Self::default()
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Replaces the backoff cap.
    #[must_use]
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Replaces the set of methods eligible for retry.
    #[must_use]
    pub fn with_allowed_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.allowed_methods = Some(methods.into_iter().collect());
        self
    }

    /// Restricts retries to exactly one method.
    #[must_use]
    pub fn for_method(self, method: Method) -> Self {
        self.with_allowed_methods([method])
    }

    /// Binds an unbound policy to `method`; explicit method sets are kept.
    #[must_use]
    pub fn bound_to(self, method: Method) -> Self {
        if self.allowed_methods.is_some() {
            self
        } else {
            self.for_method(method)
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the backoff factor.
    #[must_use]
    pub fn backoff_factor(&self) -> Duration {
        self.backoff_factor
    }

    /// Returns the methods eligible for retry, or `None` if unbound.
    #[must_use]
    pub fn allowed_methods(&self) -> Option<&[Method]> {
        self.allowed_methods.as_deref()
    }

    /// Returns the fixed set of statuses that trigger a retry.
    #[must_use]
    pub fn retryable_statuses() -> &'static [u16] {
        &RETRYABLE_STATUSES
    }

    /// Whether `method` may be retried under this policy.
    #[must_use]
    pub fn allows_method(&self, method: &Method) -> bool {
        self.allowed_methods
            .as_ref()
            .is_none_or(|methods| methods.contains(method))
    }

    /// Determines whether to retry a failed request.
    ///
    /// # Arguments
    ///
    /// * `method` - Method of the failed request
    /// * `failure_type` - Classification of the failure
    /// * `attempt` - The attempt number that just failed (1-indexed)
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(
        &self,
        method: &Method,
        failure_type: FailureType,
        attempt: u32,
    ) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::RateLimited => {
                return RetryDecision::DoNotRetry {
                    reason: "rate limited - status 429 is not in the retryable set".to_string(),
                };
            }
            FailureType::Transient => {}
        }

        if !self.allows_method(method) {
            return RetryDecision::DoNotRetry {
                reason: format!("method {method} is not eligible for retry"),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.backoff_delay(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Wait before the retry that follows failed attempt `attempt` (1-indexed).
    ///
    /// Formula: `min(backoff_factor * 2^(attempt - 1), max_backoff)`
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let nanos = self
            .backoff_factor
            .as_nanos()
            .saturating_mul(1u128 << exponent);
        let capped = nanos.min(self.max_backoff.as_nanos());
        Duration::from_nanos(u64::try_from(capped).unwrap_or(u64::MAX))
    }
}

/// Classifies a fetch error into a failure type for retry decisions.
///
/// # HTTP Status Code Classification
///
/// | Status | Type |
/// |--------|------|
/// | 500, 502, 503, 504 | Transient |
/// | 429 | RateLimited |
/// | anything else | Permanent |
///
/// # Non-HTTP Errors
///
/// | Error | Type |
/// |-------|------|
/// | Connect | Transient (Permanent for TLS/certificate failures) |
/// | Timeout | Transient |
/// | Network | Transient (Permanent for TLS/certificate failures) |
/// | Decode | Permanent |
/// | InvalidUrl / InvalidTemplate / InvalidHeader / UnsupportedMethod / ClientBuild | Permanent |
#[instrument]
pub fn classify_error(error: &FetchError) -> FailureType {
    match error {
        FetchError::HttpStatus { status, .. } => classify_http_status(*status),

        FetchError::Timeout { .. } => FailureType::Transient,

        FetchError::Connect { source, .. } | FetchError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }

        FetchError::Decode { .. }
        | FetchError::InvalidUrl { .. }
        | FetchError::InvalidTemplate { .. }
        | FetchError::InvalidHeader { .. }
        | FetchError::UnsupportedMethod { .. }
        | FetchError::ClientBuild { .. } => FailureType::Permanent,
    }
}

fn classify_http_status(status: u16) -> FailureType {
    if RETRYABLE_STATUSES.contains(&status) {
        FailureType::Transient
    } else if status == 429 {
        FailureType::RateLimited
    } else {
        FailureType::Permanent
    }
}

/// Fragments of rustls/native-tls error messages.
const TLS_MARKERS: [&str; 6] = [
    "certificate",
    "tls",
    "ssl",
    "handshake",
    "corrupt message",
    "invalid peer certificate",
];

/// Checks if a reqwest error is a TLS/certificate error.
///
/// The top-level message only names the URL, so the cause chain is searched.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let mut cause = std::error::Error::source(error);
    while let Some(current) = cause {
        if is_tls_message(&current.to_string()) {
            return true;
        }
        cause = current.source();
    }
    false
}

fn is_tls_message(message: &str) -> bool {
    let message = message.to_lowercase();
    TLS_MARKERS.iter().any(|marker| message.contains(marker))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== RetryPolicy Tests ====================

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff_factor(), Duration::from_secs(1));
        assert_eq!(policy.max_backoff, Duration::from_secs(120));
        assert!(policy.allowed_methods().is_none());
        assert!(policy.allows_method(&Method::GET));
        assert!(policy.allows_method(&Method::POST));
    }

    #[test]
    fn test_retry_policy_max_attempts_minimum_is_one() {
        assert_eq!(RetryPolicy::with_max_attempts(0).max_attempts(), 1);
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[test]
    fn test_retry_policy_for_method_restricts_methods() {
        let policy = RetryPolicy::default().for_method(Method::POST);
        assert_eq!(policy.allowed_methods(), Some(&[Method::POST][..]));
        assert!(!policy.allows_method(&Method::GET));
    }

    #[test]
    fn test_retry_policy_bound_to_fills_unbound_methods() {
        let policy = RetryPolicy::default().bound_to(Method::POST);
        assert_eq!(policy.allowed_methods(), Some(&[Method::POST][..]));
    }

    #[test]
    fn test_retry_policy_bound_to_keeps_explicit_methods() {
        let policy = RetryPolicy::default()
            .for_method(Method::GET)
            .bound_to(Method::POST);
        assert_eq!(policy.allowed_methods(), Some(&[Method::GET][..]));
        assert!(!policy.allows_method(&Method::POST));
    }

    #[test]
    fn test_retryable_statuses_fixed_set() {
        assert_eq!(RetryPolicy::retryable_statuses(), &[500, 502, 503, 504]);
    }

    // ==================== Delay Calculation Tests ====================

    #[test]
    fn test_backoff_doubles_each_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(10));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(20));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(40));
    }

    #[test]
    fn test_backoff_respects_max_backoff() {
        let policy =
            RetryPolicy::new(10, Duration::from_secs(1)).with_max_backoff(Duration::from_secs(5));
        // 6th attempt would be 1 * 2^5 = 32s, but capped at 5s
        assert_eq!(policy.backoff_delay(6), Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_zero_factor_never_waits() {
        let policy = RetryPolicy::new(10, Duration::ZERO);
        assert_eq!(policy.backoff_delay(1), Duration::ZERO);
        assert_eq!(policy.backoff_delay(u32::MAX), Duration::ZERO);
    }

    #[test]
    fn test_backoff_huge_attempt_does_not_overflow() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(u32::MAX), DEFAULT_MAX_BACKOFF);
    }

    // ==================== Error Classification Tests ====================

    #[test]
    fn test_classify_retryable_statuses_transient() {
        for status in [500, 502, 503, 504] {
            let error = FetchError::http_status("http://example.com", status);
            assert_eq!(classify_error(&error), FailureType::Transient, "{status}");
        }
    }

    #[test]
    fn test_classify_http_429_rate_limited() {
        let error = FetchError::http_status("http://example.com", 429);
        assert_eq!(classify_error(&error), FailureType::RateLimited);
    }

    #[test]
    fn test_classify_other_statuses_permanent() {
        for status in [400, 401, 403, 404, 408, 410, 501, 505] {
            let error = FetchError::http_status("http://example.com", status);
            assert_eq!(classify_error(&error), FailureType::Permanent, "{status}");
        }
    }

    #[test]
    fn test_classify_timeout_transient() {
        let error = FetchError::timeout("http://example.com");
        assert_eq!(classify_error(&error), FailureType::Transient);
    }

    #[test]
    fn test_classify_decode_permanent() {
        let source = serde_json::from_str::<serde_json::Value>("<html>").unwrap_err();
        let error = FetchError::decode("http://example.com", source);
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }

    #[test]
    fn test_classify_invalid_url_permanent() {
        let error = FetchError::invalid_url("not-a-url");
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }

    #[test]
    fn test_tls_messages_detected() {
        assert!(is_tls_message("received corrupt message of type InvalidContentType"));
        assert!(is_tls_message("invalid peer certificate: UnknownIssuer"));
        assert!(is_tls_message("TLS handshake eof"));
        assert!(!is_tls_message("tcp connect error: Connection refused"));
        assert!(!is_tls_message("operation timed out"));
    }

    // ==================== Should Retry Decision Tests ====================

    #[test]
    fn test_should_retry_permanent_does_not_retry() {
        let policy = RetryPolicy::default();
        let decision = policy.should_retry(&Method::GET, FailureType::Permanent, 1);
        let RetryDecision::DoNotRetry { reason } = decision else {
            panic!("expected DoNotRetry");
        };
        assert!(reason.contains("permanent"));
    }

    #[test]
    fn test_should_retry_rate_limited_does_not_retry() {
        let policy = RetryPolicy::default();
        let decision = policy.should_retry(&Method::GET, FailureType::RateLimited, 1);
        let RetryDecision::DoNotRetry { reason } = decision else {
            panic!("expected DoNotRetry");
        };
        assert!(reason.contains("429"));
    }

    #[test]
    fn test_should_retry_transient_retries() {
        let policy = RetryPolicy::default();
        let decision = policy.should_retry(&Method::GET, FailureType::Transient, 1);
        assert_eq!(
            decision,
            RetryDecision::Retry {
                delay: Duration::from_secs(1),
                attempt: 2
            }
        );
    }

    #[test]
    fn test_should_retry_ineligible_method_does_not_retry() {
        let policy = RetryPolicy::default().for_method(Method::GET);
        let decision = policy.should_retry(&Method::POST, FailureType::Transient, 1);
        let RetryDecision::DoNotRetry { reason } = decision else {
            panic!("expected DoNotRetry");
        };
        assert!(reason.contains("POST"));
    }

    #[test]
    fn test_should_retry_respects_max_attempts() {
        let policy = RetryPolicy::with_max_attempts(3);

        let decision = policy.should_retry(&Method::GET, FailureType::Transient, 1);
        assert!(matches!(decision, RetryDecision::Retry { .. }));

        let decision = policy.should_retry(&Method::GET, FailureType::Transient, 2);
        assert!(matches!(decision, RetryDecision::Retry { .. }));

        let decision = policy.should_retry(&Method::GET, FailureType::Transient, 3);
        let RetryDecision::DoNotRetry { reason } = decision else {
            panic!("expected DoNotRetry");
        };
        assert!(reason.contains("exhausted"));
    }

    #[test]
    fn test_default_max_attempts_constant() {
        assert_eq!(DEFAULT_MAX_ATTEMPTS, 3);
    }
}
