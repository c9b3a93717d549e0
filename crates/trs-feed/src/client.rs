//! HTTP client for TRS providers
//!
//! Wraps `reqwest::Client` with the endpoint's Basic credentials and a
//! per-request timeout, and maps every failure onto [`FeedError`] so the
//! sync engine can decide whether to retry.
//!
//! | Response                      | FeedError          | Transient |
//! |-------------------------------|--------------------|-----------|
//! | 401, 403                      | `Unauthorized`     | no        |
//! | 408                           | `Timeout`          | yes       |
//! | 410                           | `CursorExpired`    | no        |
//! | 429                           | `Throttled`        | yes       |
//! | other 4xx                     | `Client`           | no        |
//! | 5xx                           | `Server`           | yes       |
//! | connect / send failure        | `Network`          | yes       |
//! | request timeout               | `Timeout`          | yes       |
//! | undecodable body              | `InvalidResponse`  | no        |

use std::time::Duration;

use reqwest::header::{HeaderMap, ACCEPT, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use trs_core::domain::{BasicCredentials, EndpointDescriptor};
use trs_core::ports::FeedError;
use url::Url;

use crate::retry_after::parse_retry_after;

/// Error bodies are truncated to this many characters in messages
const MAX_ERROR_BODY: usize = 256;

/// HTTP client bound to one endpoint's credentials
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: Client,
    credentials: Option<BasicCredentials>,
}

impl FeedClient {
    /// Creates a client for `endpoint` with the given request timeout
    pub fn new(endpoint: &EndpointDescriptor, timeout: Duration) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("trsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            credentials: endpoint.credentials().cloned(),
        })
    }

    /// Creates an authenticated GET request for `url`
    pub fn request(&self, url: &Url) -> RequestBuilder {
        let builder = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json");
        match &self.credentials {
            Some(creds) => builder.basic_auth(creds.username(), Some(creds.password())),
            None => builder,
        }
    }

    /// GETs `url` and decodes the JSON body as `T`
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, FeedError> {
        debug!(%url, "GET");

        let response = self.request(url).send().await.map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_header(response.headers());
            let body = response.text().await.unwrap_or_default();
            let err = classify_status(status, retry_after, &body);
            warn!(%url, status = status.as_u16(), error = %err, "Feed request failed");
            return Err(err);
        }

        let bytes = response.bytes().await.map_err(map_transport_error)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| FeedError::InvalidResponse(format!("{url}: {e}")))
    }
}

/// Maps a non-success status to a [`FeedError`]
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> FeedError {
    let message = truncate(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            FeedError::Unauthorized(format!("{status}: {message}"))
        }
        StatusCode::TOO_MANY_REQUESTS => FeedError::Throttled { retry_after },
        StatusCode::REQUEST_TIMEOUT => FeedError::Timeout(format!("{status}")),
        StatusCode::GONE => FeedError::CursorExpired(format!("{status}: {message}")),
        s if s.is_server_error() => FeedError::Server {
            status: s.as_u16(),
            message,
        },
        s if s.is_client_error() => FeedError::Client {
            status: s.as_u16(),
            message,
        },
        s => FeedError::InvalidResponse(format!("unexpected status {s}")),
    }
}

fn map_transport_error(err: reqwest::Error) -> FeedError {
    if err.is_timeout() {
        FeedError::Timeout(err.to_string())
    } else if err.is_decode() {
        FeedError::InvalidResponse(err.to_string())
    } else {
        FeedError::Network(err.to_string())
    }
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after)
}

fn truncate(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
