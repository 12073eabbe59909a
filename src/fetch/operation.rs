//! Per-ID fetch operation.
//!
//! [`FetchOperation::fetch`] runs one request strategy call and turns every
//! result into a [`FetchOutcome`]. Failures are classified into a
//! [`FailureReason`], logged with the offending ID, and returned as values;
//! nothing propagates to the caller.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, instrument};

use super::FetchError;
use super::strategy::RequestStrategy;
use super::transport::Transport;

/// Why a record could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    /// HTTP 429 from the remote service.
    #[error("rate limit exceeded: {body}")]
    RateLimited {
        /// Response body snippet; services usually say when to come back.
        body: String,
    },

    /// Any other non-success status, after retries where eligible.
    #[error("HTTP error {status}: {message}")]
    HttpStatus {
        /// Final HTTP status.
        status: u16,
        /// Rendered error.
        message: String,
    },

    /// Connection could not be established.
    #[error("connection error: {0}")]
    Connection(String),

    /// Request timed out.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Other transport or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Body was not valid JSON.
    #[error("decode error: {0}")]
    Decode(String),

    /// The request for this ID could not be built.
    #[error("invalid request: {0}")]
    Request(String),

    /// The task running the fetch panicked.
    #[error("task failed unexpectedly: {0}")]
    UnexpectedTask(String),
}

impl FailureReason {
    /// Maps a terminal fetch error to its failure category.
    #[must_use]
    pub fn from_error(error: &FetchError) -> Self {
        match error {
            FetchError::HttpStatus {
                status: 429, body, ..
            } => Self::RateLimited { body: body.clone() },
            FetchError::HttpStatus { status, .. } => Self::HttpStatus {
                status: *status,
                message: error.to_string(),
            },
            FetchError::Connect { .. } => Self::Connection(error.to_string()),
            FetchError::Timeout { .. } => Self::Timeout(error.to_string()),
            FetchError::Network { .. } => Self::Transport(error.to_string()),
            FetchError::Decode { .. } => Self::Decode(error.to_string()),
            FetchError::InvalidUrl { .. }
            | FetchError::InvalidTemplate { .. }
            | FetchError::InvalidHeader { .. }
            | FetchError::UnsupportedMethod { .. }
            | FetchError::ClientBuild { .. } => Self::Request(error.to_string()),
        }
    }

    /// Stable short label for reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::HttpStatus { .. } => "http_status",
            Self::Connection(_) => "connection",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Decode(_) => "decode",
            Self::Request(_) => "request",
            Self::UnexpectedTask(_) => "unexpected_task",
        }
    }

    /// Log message for this category.
    #[must_use]
    pub fn summary(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate limit exceeded",
            Self::HttpStatus { .. } => "HTTP error occurred",
            Self::Connection(_) => "connection error occurred",
            Self::Timeout(_) => "timeout error occurred",
            Self::Transport(_) => "error fetching data",
            Self::Decode(_) => "could not decode response",
            Self::Request(_) => "could not build request",
            Self::UnexpectedTask(_) => "fetch task failed unexpectedly",
        }
    }
}

/// Result of fetching one record.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The record was fetched and decoded.
    Success {
        /// Record ID.
        id: String,
        /// Decoded response body.
        payload: Value,
    },
    /// The record could not be fetched; no payload exists for it.
    Failure {
        /// Record ID.
        id: String,
        /// Failure category and detail.
        reason: FailureReason,
    },
}

impl FetchOutcome {
    /// Returns the record ID.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Success { id, .. } | Self::Failure { id, .. } => id,
        }
    }

    /// Returns whether the fetch succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Borrows the payload of a successful fetch.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Success { payload, .. } => Some(payload),
            Self::Failure { .. } => None,
        }
    }

    /// Consumes the outcome, keeping only a successful payload.
    #[must_use]
    pub fn into_payload(self) -> Option<Value> {
        match self {
            Self::Success { payload, .. } => Some(payload),
            Self::Failure { .. } => None,
        }
    }
}

/// Fetches one record per call through a strategy and a shared transport.
#[derive(Debug)]
pub struct FetchOperation {
    transport: Transport,
    strategy: Arc<dyn RequestStrategy>,
}

impl FetchOperation {
    /// Binds a strategy to a transport.
    #[must_use]
    pub fn new(transport: Transport, strategy: Arc<dyn RequestStrategy>) -> Self {
        Self {
            transport,
            strategy,
        }
    }

    /// Returns the request strategy.
    #[must_use]
    pub fn strategy(&self) -> &dyn RequestStrategy {
        self.strategy.as_ref()
    }

    /// Returns the transport.
    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Fetches the record for `id`.
    ///
    /// Never fails: errors come back as [`FetchOutcome::Failure`] after being
    /// logged with the ID.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch(&self, id: &str) -> FetchOutcome {
        match self.strategy.submit(&self.transport, id).await {
            Ok(response) => {
                info!(
                    id,
                    status = response.status,
                    attempts = response.attempts,
                    "successfully fetched record"
                );
                FetchOutcome::Success {
                    id: id.to_string(),
                    payload: response.body,
                }
            }
            Err(err) => {
                let reason = FailureReason::from_error(&err);
                log_failure(id, &reason);
                FetchOutcome::Failure {
                    id: id.to_string(),
                    reason,
                }
            }
        }
    }
}

/// Logs a failed fetch with its ID, under the reason's log message.
pub(crate) fn log_failure(id: &str, reason: &FailureReason) {
    match reason {
        FailureReason::HttpStatus { status, .. } => {
            error!(id, status, error = %reason, "{}", reason.summary());
        }
        _ => error!(id, error = %reason, "{}", reason.summary()),
    }
}
