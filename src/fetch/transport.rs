//! Retry-aware HTTP transport.
//!
//! [`Transport`] owns one pooled `reqwest::Client` configured with the
//! endpoint headers and per-request timeout. Every request goes through
//! [`Transport::submit`], which re-sends the same request while the
//! [`RetryPolicy`] says the failure is worth another attempt.
//!
//! The pool serves both `http://` and `https://` URLs with identical retry
//! behavior, and its connections are released when the last clone of the
//! transport is dropped.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::FetchError;
use super::constants::CONNECT_TIMEOUT_SECS;
use super::retry::{RetryDecision, RetryPolicy, classify_error};

/// User-Agent sent with every request.
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// A fully built request for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// JSON body, sent with `Content-Type: application/json` when present.
    pub body: Option<Value>,
}

impl PreparedRequest {
    /// A body-less GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            body: None,
        }
    }

    /// A POST request carrying `body`.
    #[must_use]
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            body: Some(body),
        }
    }
}

/// Successful transport result.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    /// Final HTTP status (2xx).
    pub status: u16,
    /// Decoded JSON body.
    pub body: Value,
    /// Number of attempts it took, including the successful one.
    pub attempts: u32,
}

/// HTTP transport with automatic retry and exponential backoff.
///
/// Cloning is cheap and shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    policy: RetryPolicy,
}

impl Transport {
    /// Builds a transport whose requests all carry `headers` and time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidHeader`] if a header name or value is not
    /// valid HTTP, or [`FetchError::ClientBuild`] if the client cannot be built.
    #[instrument(level = "debug", skip(headers, policy), fields(header_count = headers.len()))]
    pub fn new(
        headers: &[(String, String)],
        timeout: Duration,
        policy: RetryPolicy,
    ) -> Result<Self, FetchError> {
        let default_headers = build_header_map(headers)?;
        let connect_timeout = timeout.min(Duration::from_secs(CONNECT_TIMEOUT_SECS));

        let client = Client::builder()
            .default_headers(default_headers)
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .gzip(true)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| FetchError::ClientBuild { source })?;

        debug!(
            timeout_ms = timeout.as_millis(),
            max_attempts = policy.max_attempts(),
            backoff_ms = policy.backoff_factor().as_millis(),
            "transport ready"
        );

        Ok(Self { client, policy })
    }

    /// Returns the retry policy applied by this transport.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sends `request`, retrying transient failures per the policy.
    ///
    /// Attempts for one request are strictly sequential. When the policy
    /// gives up, the error from the last attempt is returned.
    ///
    /// # Errors
    ///
    /// Returns the last [`FetchError`] once retries are exhausted or the
    /// failure is not retryable.
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn submit(&self, request: &PreparedRequest) -> Result<TransportResponse, FetchError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(attempt, "sending request");

            match self.send_once(request).await {
                Ok((status, body)) => {
                    return Ok(TransportResponse {
                        status,
                        body,
                        attempts: attempt,
                    });
                }
                Err(error) => {
                    let failure_type = classify_error(&error);
                    match self
                        .policy
                        .should_retry(&request.method, failure_type, attempt)
                    {
                        RetryDecision::Retry {
                            delay,
                            attempt: next_attempt,
                        } => {
                            info!(
                                url = %request.url,
                                attempt = next_attempt,
                                max_attempts = self.policy.max_attempts(),
                                delay_ms = delay.as_millis(),
                                error = %error,
                                "retrying request"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            debug!(url = %request.url, attempt, %reason, "not retrying request");
                            return Err(error);
                        }
                    }
                }
            }
        }
    }

    async fn send_once(&self, request: &PreparedRequest) -> Result<(u16, Value), FetchError> {
        let url = request.url.as_str();
        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;
        let status = response.status();

        if !status.is_success() {
            // The status decides retry; an unreadable body only loses the snippet.
            let text = response.text().await.unwrap_or_default();
            return Err(FetchError::http_status_with_body(
                url,
                status.as_u16(),
                &text,
            ));
        }

        let text = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;
        let body = serde_json::from_str(&text).map_err(|e| FetchError::decode(url, e))?;
        Ok((status.as_u16(), body))
    }
}

fn map_reqwest_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::timeout(url)
    } else if error.is_connect() {
        FetchError::connect(url, error)
    } else {
        FetchError::network(url, error)
    }
}

fn build_header_map(headers: &[(String, String)]) -> Result<HeaderMap, FetchError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| FetchError::invalid_header(name.clone()))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| FetchError::invalid_header(name.clone()))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}
