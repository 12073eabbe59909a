//! Constants for the fetch module (timeouts, retry, worker bounds).

use std::time::Duration;

/// Default per-request timeout (30 seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP connect timeout (10 seconds), capped by the request timeout.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Status codes the transport retries automatically.
pub const RETRYABLE_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// Upper bound on a single backoff wait.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Minimum allowed worker count.
pub const MIN_WORKERS: usize = 1;

/// Maximum allowed worker count.
pub const MAX_WORKERS: usize = 100;

/// Longest response body snippet kept in error values and log lines.
pub const MAX_BODY_SNIPPET: usize = 512;

/// Placeholder substituted with the record ID in URL templates.
pub const ID_PLACEHOLDER: &str = "{id}";
