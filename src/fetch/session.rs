//! Fetch sessions: one connection pool bound to one endpoint.
//!
//! A [`FetchSession`] owns the transport and request strategy for a run and
//! exposes the sequential and concurrent ways of fetching a batch. Ranged
//! variants narrow the ID list with [`select`] first.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt, stream};
use reqwest::Method;
use tracing::{debug, info, instrument};

use super::FetchError;
use super::constants::DEFAULT_TIMEOUT_SECS;
use super::dispatcher::{DispatchError, Dispatcher, FetchStream};
use super::operation::{FetchOperation, FetchOutcome};
use super::range::{IndexRange, select};
use super::retry::RetryPolicy;
use super::strategy::{FixedEndpointWrite, RequestStrategy, TemplatedRead};
use super::throttle::Throttle;
use super::transport::Transport;

/// Where and how to send requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// `{id}` URL template for GET, constant URL for POST.
    pub url: String,
    /// HTTP method; GET and POST have default strategies.
    pub method: Method,
    /// Headers sent with every request.
    pub headers: Vec<(String, String)>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl EndpointConfig {
    /// Endpoint with no extra headers and the default timeout.
    #[must_use]
    pub fn new(url: impl Into<String>, method: Method) -> Self {
        Self {
            url: url.into(),
            method,
            headers: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Sets the headers sent with every request.
    #[must_use]
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Picks the strategy matching the method.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::UnsupportedMethod`] for anything but GET and POST,
    /// or the strategy's own validation error for a bad URL.
    pub fn default_strategy(&self) -> Result<Arc<dyn RequestStrategy>, FetchError> {
        match self.method {
            Method::GET => Ok(Arc::new(TemplatedRead::new(self.url.as_str())?)),
            Method::POST => Ok(Arc::new(FixedEndpointWrite::new(self.url.as_str())?)),
            ref other => Err(FetchError::unsupported_method(other.as_str())),
        }
    }
}

/// Scoped owner of the transport and strategy for one run.
///
/// Dropping the session (or calling [`FetchSession::close`]) releases the
/// connection pool once any outstanding dispatch streams are gone too.
#[derive(Debug)]
pub struct FetchSession {
    operation: Arc<FetchOperation>,
    throttle: Throttle,
}

impl FetchSession {
    /// Opens a session using the endpoint's default strategy.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] if the strategy or transport cannot be built.
    pub fn open(
        endpoint: &EndpointConfig,
        policy: RetryPolicy,
        throttle: Throttle,
    ) -> Result<Self, FetchError> {
        let strategy = endpoint.default_strategy()?;
        Self::open_with_strategy(endpoint, policy, throttle, strategy)
    }

    /// Opens a session driving a caller-supplied strategy.
    ///
    /// Only the endpoint's headers and timeout are used; the strategy decides
    /// the URL and method. An unbound `policy` is bound to the strategy's
    /// method, so the session retries its own requests.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] if the transport cannot be built.
    #[instrument(level = "debug", skip_all, fields(url = %endpoint.url, method = %endpoint.method))]
    pub fn open_with_strategy(
        endpoint: &EndpointConfig,
        policy: RetryPolicy,
        throttle: Throttle,
        strategy: Arc<dyn RequestStrategy>,
    ) -> Result<Self, FetchError> {
        let policy = policy.bound_to(strategy.method());
        let transport = Transport::new(&endpoint.headers, endpoint.timeout, policy)?;
        debug!(strategy = ?strategy, "session opened");
        Ok(Self {
            operation: Arc::new(FetchOperation::new(transport, strategy)),
            throttle,
        })
    }

    /// Returns the shared fetch operation.
    #[must_use]
    pub fn operation(&self) -> &Arc<FetchOperation> {
        &self.operation
    }

    /// Returns the throttle applied after each fetch.
    #[must_use]
    pub fn throttle(&self) -> Throttle {
        self.throttle
    }

    /// Fetches a single record, without throttling.
    pub async fn fetch(&self, id: &str) -> FetchOutcome {
        self.operation.fetch(id).await
    }

    /// Fetches `ids` one after another, pausing after each outcome.
    pub fn fetch_all<'a>(&'a self, ids: &'a [String]) -> impl Stream<Item = FetchOutcome> + 'a {
        stream::iter(ids).then(move |id| async move {
            let outcome = self.operation.fetch(id).await;
            self.throttle.pause().await;
            outcome
        })
    }

    /// Sequentially fetches `ids[start..finish]`, clamped to the list.
    pub fn fetch_ranged<'a>(
        &'a self,
        ids: &'a [String],
        start: usize,
        finish: usize,
    ) -> impl Stream<Item = FetchOutcome> + 'a {
        info!("fetching records in range {}", IndexRange::new(start, finish));
        self.fetch_all(select(ids, start, finish))
    }

    /// Fetches `ids` concurrently over `workers` worker slots.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidWorkerCount`] if `workers` is outside 1-100.
    pub fn dispatch(&self, ids: &[String], workers: usize) -> Result<FetchStream, DispatchError> {
        let dispatcher = Dispatcher::new(Arc::clone(&self.operation), workers, self.throttle)?;
        Ok(dispatcher.dispatch(ids))
    }

    /// Concurrently fetches `ids[start..finish]`, clamped to the list.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidWorkerCount`] if `workers` is outside 1-100.
    pub fn dispatch_ranged(
        &self,
        ids: &[String],
        start: usize,
        finish: usize,
        workers: usize,
    ) -> Result<FetchStream, DispatchError> {
        info!("fetching records in range {}", IndexRange::new(start, finish));
        self.dispatch(select(ids, start, finish), workers)
    }

    /// Ends the session.
    pub fn close(self) {
        debug!("session closed");
    }
}
