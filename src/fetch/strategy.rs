//! Request strategies: how a record ID turns into an HTTP request.
//!
//! Two strategies cover the record APIs this crate talks to:
//! - [`TemplatedRead`] substitutes the ID into a URL template and sends a GET.
//! - [`FixedEndpointWrite`] POSTs a JSON body built from the ID to a constant URL.
//!
//! Both implement [`RequestStrategy`], so the fetch operation and dispatcher
//! never care which one they are driving.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};
use url::Url;

use super::FetchError;
use super::constants::ID_PLACEHOLDER;
use super::transport::{PreparedRequest, Transport, TransportResponse};

/// Builds the POST body for one record ID.
pub type PayloadFn = Arc<dyn Fn(&str) -> Value + Send + Sync>;

/// Turns a record ID into a request and submits it.
#[async_trait]
pub trait RequestStrategy: Send + Sync + fmt::Debug {
    /// Method of every request this strategy builds.
    fn method(&self) -> Method;

    /// Builds the request for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] when the resulting URL is malformed.
    fn build_request(&self, id: &str) -> Result<PreparedRequest, FetchError>;

    /// Builds and sends the request for `id` through `transport`.
    ///
    /// # Errors
    ///
    /// Returns any build error, or the transport's terminal failure.
    async fn submit(&self, transport: &Transport, id: &str) -> Result<TransportResponse, FetchError> {
        let request = self.build_request(id)?;
        transport.submit(&request).await
    }
}

/// GET a URL with the record ID substituted for `{id}`.
#[derive(Debug, Clone)]
pub struct TemplatedRead {
    template: String,
}

impl TemplatedRead {
    /// Creates a read strategy for `template`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidTemplate`] if `template` lacks `{id}`.
    pub fn new(template: impl Into<String>) -> Result<Self, FetchError> {
        let template = template.into();
        if !template.contains(ID_PLACEHOLDER) {
            return Err(FetchError::invalid_template(template));
        }
        Ok(Self { template })
    }

    /// Returns the URL template.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }
}

#[async_trait]
impl RequestStrategy for TemplatedRead {
    fn method(&self) -> Method {
        Method::GET
    }

    fn build_request(&self, id: &str) -> Result<PreparedRequest, FetchError> {
        let url = self
            .template
            .replace(ID_PLACEHOLDER, &urlencoding::encode(id));
        validate_url(&url)?;
        Ok(PreparedRequest::get(url))
    }
}

/// POST a JSON body built from the record ID to a constant URL.
#[derive(Clone)]
pub struct FixedEndpointWrite {
    url: String,
    payload: Option<PayloadFn>,
}

impl FixedEndpointWrite {
    /// Creates a write strategy posting `{"id": <id>}` to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] if `url` does not parse.
    pub fn new(url: impl Into<String>) -> Result<Self, FetchError> {
        let url = url.into();
        validate_url(&url)?;
        Ok(Self { url, payload: None })
    }

    /// Replaces the default body with one produced by `payload`.
    ///
    /// The builder decides the shape entirely, for example wrapping the ID
    /// in a list or a nested object.
    #[must_use]
    pub fn with_payload<F>(mut self, payload: F) -> Self
    where
        F: Fn(&str) -> Value + Send + Sync + 'static,
    {
        self.payload = Some(Arc::new(payload));
        self
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_payload(&self, id: &str) -> Value {
        match &self.payload {
            Some(build) => build(id),
            None => json!({ "id": id }),
        }
    }
}

impl fmt::Debug for FixedEndpointWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedEndpointWrite")
            .field("url", &self.url)
            .field("custom_payload", &self.payload.is_some())
            .finish()
    }
}

#[async_trait]
impl RequestStrategy for FixedEndpointWrite {
    fn method(&self) -> Method {
        Method::POST
    }

    fn build_request(&self, id: &str) -> Result<PreparedRequest, FetchError> {
        Ok(PreparedRequest::post(&self.url, self.build_payload(id)))
    }
}

fn validate_url(url: &str) -> Result<(), FetchError> {
    Url::parse(url)
        .map(|_| ())
        .map_err(|_| FetchError::invalid_url(url))
}
