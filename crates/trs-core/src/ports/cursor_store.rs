//! Cursor store port (driven/secondary port)
//!
//! Persists the last applied change per feed. Implementations must be safe
//! for concurrent use by several feed tasks; each feed only ever writes its
//! own key.

use thiserror::Error;
use url::Url;

use crate::domain::{Cursor, SequenceId, SyncError};

/// Errors raised by a cursor store
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Save would move the stored cursor backwards; nothing was written
    #[error("Stale cursor write: stored {stored}, attempted {attempted}")]
    StaleWrite {
        stored: SequenceId,
        attempted: SequenceId,
    },

    /// The backing storage failed
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// A stored row could not be decoded
    #[error("Corrupt cursor record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Returns true if the save may succeed when repeated
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        SyncError::Persistence(err.to_string())
    }
}

/// Port trait for cursor persistence
#[async_trait::async_trait]
pub trait ICursorStore: Send + Sync {
    /// Loads the cursor of a feed, `None` if it was never saved
    async fn load(&self, feed_uri: &Url) -> Result<Option<Cursor>, StoreError>;

    /// Durably saves a cursor
    ///
    /// Saving a cursor whose `last_applied` is lower than the stored one
    /// fails with [`StoreError::StaleWrite`] and leaves the stored value
    /// untouched. Saving the same value again is accepted.
    async fn save(&self, cursor: &Cursor) -> Result<(), StoreError>;

    /// All stored cursors, ordered by feed URI
    async fn list(&self) -> Result<Vec<Cursor>, StoreError>;

    /// Forgets a feed; returns true if a cursor was removed
    async fn remove(&self, feed_uri: &Url) -> Result<bool, StoreError>;
}
