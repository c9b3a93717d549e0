//! Persisted synchronization cursor
//!
//! A [`Cursor`] records the last change durably applied for a feed. It is a
//! value: advancing it produces a new cursor, so the processor can keep the
//! old one in memory until the new one has been saved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::errors::SyncError;
use super::newtypes::SequenceId;

/// Resumption point for a tracked feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    feed_uri: Url,
    last_applied: Option<SequenceId>,
    updated_at: DateTime<Utc>,
}

impl Cursor {
    /// A cursor with nothing applied yet (forces base sync)
    pub fn empty(feed_uri: Url) -> Self {
        Self {
            feed_uri,
            last_applied: None,
            updated_at: Utc::now(),
        }
    }

    /// A cursor positioned at `sequence`
    pub fn at(feed_uri: Url, sequence: SequenceId) -> Self {
        Self {
            feed_uri,
            last_applied: Some(sequence),
            updated_at: Utc::now(),
        }
    }

    /// Rebuilds a cursor from persisted fields
    pub fn from_parts(
        feed_uri: Url,
        last_applied: Option<SequenceId>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            feed_uri,
            last_applied,
            updated_at,
        }
    }

    pub fn feed_uri(&self) -> &Url {
        &self.feed_uri
    }

    pub fn last_applied(&self) -> Option<SequenceId> {
        self.last_applied
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if the feed must be initialized from its base
    pub fn needs_base_sync(&self) -> bool {
        self.last_applied.is_none()
    }

    /// Returns true if `sequence` has already been applied
    pub fn covers(&self, sequence: SequenceId) -> bool {
        self.last_applied.is_some_and(|last| sequence <= last)
    }

    /// Returns the cursor advanced to `sequence`
    ///
    /// Moving backwards is an ordering violation; staying in place is
    /// allowed (a base marker equal to the stored position).
    pub fn advance(&self, sequence: SequenceId) -> Result<Cursor, SyncError> {
        if let Some(last) = self.last_applied {
            if sequence < last {
                return Err(SyncError::OrderingViolation {
                    previous: last,
                    next: sequence,
                });
            }
        }
        Ok(Cursor {
            feed_uri: self.feed_uri.clone(),
            last_applied: Some(sequence),
            updated_at: Utc::now(),
        })
    }
}
