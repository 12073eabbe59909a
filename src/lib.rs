//! Record Fetcher Library
//!
//! Fetches JSON records by ID from remote HTTP APIs, concurrently and with
//! automatic retry, so that a few flaky responses never sink a whole batch.
//!
//! # Architecture
//!
//! Everything lives under [`fetch`]:
//! - transport with exponential-backoff retry
//! - GET/POST request strategies
//! - per-ID fetch operation yielding success or classified failure
//! - bounded concurrent dispatcher streaming outcomes
//! - half-open range selection over ID lists

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod fetch;

// Re-export commonly used types
pub use fetch::{
    BatchReport, DEFAULT_MAX_ATTEMPTS, DEFAULT_WORKERS, DispatchError, Dispatcher, EndpointConfig,
    FailureReason, FetchError, FetchOutcome, FetchSession, FetchStream, FixedEndpointWrite,
    IndexRange, RequestStrategy, RetryPolicy, TemplatedRead, Throttle, select,
};
