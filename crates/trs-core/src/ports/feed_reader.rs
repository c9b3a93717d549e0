//! Feed reader port (driven/secondary port)
//!
//! Abstracts the TRS provider. A reader is bound to a single feed and
//! hands out opaque page tokens that only it understands.

use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::domain::{BasePage, ChangePage, PageToken, SequenceId, SyncError};

/// Errors raised by a feed reader
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Credentials missing or rejected (401/403)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Provider asked us to slow down (429)
    #[error("Throttled by provider")]
    Throttled {
        /// Delay requested by the provider, if any
        retry_after: Option<Duration>,
    },

    /// Request did not complete within the configured timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// Provider-side failure (5xx)
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// The change log no longer covers the requested position (410 Gone)
    #[error("Change log no longer covers the cursor: {0}")]
    CursorExpired(String),

    /// Request rejected by the provider (other 4xx)
    #[error("Client error {status}: {message}")]
    Client { status: u16, message: String },

    /// Body could not be decoded as a TRS resource
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl FeedError {
    /// Returns true if repeating the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FeedError::Throttled { .. }
                | FeedError::Timeout(_)
                | FeedError::Network(_)
                | FeedError::Server { .. }
        )
    }

    /// Server-requested delay before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FeedError::Throttled { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<FeedError> for SyncError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::Unauthorized(msg) => SyncError::Auth(msg),
            other => SyncError::Transport {
                transient: other.is_transient(),
                message: other.to_string(),
            },
        }
    }
}

/// Port trait for reading a TRS feed
#[async_trait::async_trait]
pub trait IFeedReader: Send + Sync {
    /// The feed this reader is bound to
    fn feed_uri(&self) -> &Url;

    /// Fetches a page of the base snapshot
    ///
    /// `None` requests the first page; otherwise pass the `next_page`
    /// token of the previous page.
    async fn fetch_base_page(&self, page: Option<&PageToken>) -> Result<BasePage, FeedError>;

    /// Fetches a page of the change log
    ///
    /// On the first page `since` selects records strictly after the cursor
    /// (`None` means from the start). Continuation pages are addressed by
    /// `page` alone.
    async fn fetch_changes_page(
        &self,
        since: Option<SequenceId>,
        page: Option<&PageToken>,
    ) -> Result<ChangePage, FeedError>;
}
