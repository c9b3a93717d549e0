//! In-memory implementation of [`ICursorStore`]
//!
//! Cursors are kept in a [`DashMap`]; the monotonic check and the write
//! happen under the entry's shard lock. Nothing survives the process.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use trs_core::domain::{Cursor, SequenceId};
use trs_core::ports::{ICursorStore, StoreError};
use url::Url;

/// Process-local cursor store
#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    cursors: DashMap<Url, Cursor>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked feeds
    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}

#[async_trait::async_trait]
impl ICursorStore for InMemoryCursorStore {
    async fn load(&self, feed_uri: &Url) -> Result<Option<Cursor>, StoreError> {
        Ok(self.cursors.get(feed_uri).map(|c| c.value().clone()))
    }

    async fn save(&self, cursor: &Cursor) -> Result<(), StoreError> {
        match self.cursors.entry(cursor.feed_uri().clone()) {
            Entry::Vacant(slot) => {
                slot.insert(cursor.clone());
            }
            Entry::Occupied(mut slot) => {
                if let Some(stored) = slot.get().last_applied() {
                    let attempted = cursor.last_applied().unwrap_or(SequenceId::ZERO);
                    if cursor.last_applied().map_or(true, |a| a < stored) {
                        return Err(StoreError::StaleWrite { stored, attempted });
                    }
                }
                slot.insert(cursor.clone());
            }
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Cursor>, StoreError> {
        let mut all: Vec<Cursor> = self.cursors.iter().map(|c| c.value().clone()).collect();
        all.sort_by(|a, b| a.feed_uri().as_str().cmp(b.feed_uri().as_str()));
        Ok(all)
    }

    async fn remove(&self, feed_uri: &Url) -> Result<bool, StoreError> {
        Ok(self.cursors.remove(feed_uri).is_some())
    }
}
