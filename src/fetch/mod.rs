//! Resilient, concurrent fetching of JSON records by ID.
//!
//! This module turns lists of record IDs into decoded JSON payloads from a
//! remote HTTP API, surviving transient failures along the way.
//!
//! # Features
//!
//! - Pooled transport with exponential-backoff retry on 500/502/503/504,
//!   timeouts and connection errors
//! - Templated GET reads and fixed-endpoint POST writes behind one trait
//! - Per-ID failure isolation: errors become [`FetchOutcome::Failure`] values
//! - Bounded concurrent dispatch with per-worker throttling
//! - Half-open range selection for batch-by-batch processing
//!
//! # Example
//!
//! ```no_run
//! use reqwest::Method;
//! use record_fetcher::fetch::{EndpointConfig, FetchSession, RetryPolicy, Throttle};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = EndpointConfig::new("https://api.example.com/records/{id}", Method::GET);
//! let session = FetchSession::open(&endpoint, RetryPolicy::default(), Throttle::disabled())?;
//!
//! let ids: Vec<String> = (0..100).map(|i| i.to_string()).collect();
//! let report = session.dispatch_ranged(&ids, 0, 50, 8)?.collect_report().await;
//! println!("fetched {} records, {} failed", report.succeeded(), report.failed());
//! session.close();
//! # Ok(())
//! # }
//! ```

pub mod constants;
mod dispatcher;
mod error;
mod operation;
mod range;
mod retry;
mod session;
mod strategy;
mod throttle;
mod transport;

pub use constants::{DEFAULT_TIMEOUT_SECS, MAX_WORKERS, MIN_WORKERS};
pub use dispatcher::{
    BatchReport, DEFAULT_WORKERS, DispatchError, Dispatcher, FailedRecord, FetchStream,
    FetchedRecord,
};
pub use error::FetchError;
pub use operation::{FailureReason, FetchOperation, FetchOutcome};
pub use range::{IndexRange, select};
pub use retry::{DEFAULT_MAX_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_error};
pub use session::{EndpointConfig, FetchSession};
pub use strategy::{FixedEndpointWrite, PayloadFn, RequestStrategy, TemplatedRead};
pub use throttle::{Throttle, ThrottleError};
pub use transport::{PreparedRequest, Transport, TransportResponse};

// No module-local Result alias; signatures spell out `Result<T, FetchError>`.
