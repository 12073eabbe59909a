//! Error types for the fetch module.
//!
//! This module defines structured errors for transport and request-building
//! operations, carrying the URL or input that failed so log lines and
//! failure reports can name it.

use thiserror::Error;

use super::constants::MAX_BODY_SNIPPET;

/// Errors that can occur while building or submitting a request.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The TCP/TLS connection could not be established.
    #[error("connection error requesting {url}: {source}")]
    Connect {
        /// The URL that could not be reached.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before a response was received.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Any other transport or protocol failure (reset mid-body, bad framing, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status.
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// Leading part of the response body (servers often explain 429s here).
        body: String,
    },

    /// The response body was not valid JSON.
    #[error("could not decode response from {url}: {source}")]
    Decode {
        /// The URL whose body failed to decode.
        url: String,
        /// The underlying decoding error.
        #[source]
        source: serde_json::Error,
    },

    /// The URL built for a record is malformed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// A URL template without the `{id}` placeholder.
    #[error("URL template has no {{id}} placeholder: {template}")]
    InvalidTemplate {
        /// The offending template.
        template: String,
    },

    /// No request strategy exists for this HTTP method.
    #[error("unsupported method {method}: expected GET or POST")]
    UnsupportedMethod {
        /// The rejected method.
        method: String,
    },

    /// A configured header name or value is not valid HTTP.
    #[error("invalid header {name:?}")]
    InvalidHeader {
        /// Name of the rejected header.
        name: String,
    },

    /// The underlying HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Creates an unsupported-method error.
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod {
            method: method.into(),
        }
    }

    /// Creates a connection error.
    pub fn connect(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Connect {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a generic network error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error with no body.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::http_status_with_body(url, status, "")
    }

    /// Creates an HTTP status error, keeping at most [`MAX_BODY_SNIPPET`] bytes of body.
    pub fn http_status_with_body(url: impl Into<String>, status: u16, body: &str) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            body: truncate_body(body),
        }
    }

    /// Creates a decode error.
    pub fn decode(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            url: url.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an invalid template error.
    pub fn invalid_template(template: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            template: template.into(),
        }
    }

    /// Creates an invalid header error.
    pub fn invalid_header(name: impl Into<String>) -> Self {
        Self::InvalidHeader { name: name.into() }
    }

    /// Returns the HTTP status carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// No `From<reqwest::Error>` / `From<serde_json::Error>`: every variant needs the
// URL for context, so callers go through the constructors above.

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_BODY_SNIPPET {
        return body.to_string();
    }
    let mut end = MAX_BODY_SNIPPET;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
