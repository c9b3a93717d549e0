//! Change application
//!
//! The [`ChangeProcessor`] owns a feed's in-memory cursor and is the only
//! component that moves it. Each record is applied to the sink first and
//! the advanced cursor persisted second; the in-memory cursor is replaced
//! only after the store has accepted the new value. A crash between the two
//! steps re-delivers that one record on restart, never skips it.

use std::sync::Arc;

use tracing::{debug, info, warn};
use trs_core::domain::{BasePage, ChangePage, ChangeRecord, Cursor, SequenceId, SyncError};
use trs_core::ports::{IChangeSink, ICursorStore};

use crate::retry::{retry, RetryPolicy};

/// What happened to the records of one page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageOutcome {
    /// Records delivered to the sink
    pub applied: u64,
    /// Records at or below the cursor, dropped as duplicates
    pub skipped: u64,
}

/// Applies base members and change records for one feed
pub struct ChangeProcessor {
    cursor: Cursor,
    sink: Arc<dyn IChangeSink>,
    store: Arc<dyn ICursorStore>,
    apply_retry: RetryPolicy,
    persist_retry: RetryPolicy,
}

impl ChangeProcessor {
    pub fn new(
        cursor: Cursor,
        sink: Arc<dyn IChangeSink>,
        store: Arc<dyn ICursorStore>,
        apply_retry: RetryPolicy,
        persist_retry: RetryPolicy,
    ) -> Self {
        Self {
            cursor,
            sink,
            store,
            apply_retry,
            persist_retry,
        }
    }

    /// The last durably applied position
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Delivers every member of a base page as a synthetic creation
    ///
    /// The cursor is not touched; call [`complete_base`](Self::complete_base)
    /// once the last page is applied.
    pub async fn apply_base_page(
        &mut self,
        page: &BasePage,
        marker: SequenceId,
    ) -> Result<u64, SyncError> {
        for member in &page.members {
            let record = ChangeRecord::base_member(member, marker);
            self.deliver(&record).await?;
        }
        debug!(
            feed = %self.cursor.feed_uri(),
            members = page.members.len(),
            %marker,
            "Applied base page"
        );
        Ok(page.members.len() as u64)
    }

    /// Records the end of the base sync by persisting the cursor at `marker`
    pub async fn complete_base(&mut self, marker: SequenceId) -> Result<(), SyncError> {
        let next = self.cursor.advance(marker)?;
        self.persist(next).await?;
        info!(feed = %self.cursor.feed_uri(), cursor = %marker, "Base sync complete");
        Ok(())
    }

    /// Applies a change-log page in order
    ///
    /// The whole page is checked for ordering before anything is applied.
    /// On a sink or store failure the records before the failing one stay
    /// applied and persisted; the failing record and the rest of the page
    /// are left for the next attempt.
    pub async fn apply_page(&mut self, page: &ChangePage) -> Result<PageOutcome, SyncError> {
        check_order(&page.records)?;

        let mut outcome = PageOutcome::default();
        for record in &page.records {
            if self.cursor.covers(record.sequence_id) {
                debug!(
                    feed = %self.cursor.feed_uri(),
                    sequence = %record.sequence_id,
                    "Skipping already applied record"
                );
                outcome.skipped += 1;
                continue;
            }

            self.deliver(record).await?;
            let next = self.cursor.advance(record.sequence_id)?;
            self.persist(next).await?;
            outcome.applied += 1;
        }

        if outcome.applied > 0 {
            debug!(
                feed = %self.cursor.feed_uri(),
                applied = outcome.applied,
                skipped = outcome.skipped,
                cursor = ?self.cursor.last_applied(),
                "Applied change page"
            );
        }
        Ok(outcome)
    }

    async fn deliver(&self, record: &ChangeRecord) -> Result<(), SyncError> {
        let sink = &self.sink;
        retry(&self.apply_retry, "apply change", || sink.apply(record))
            .await
            .map_err(|e| {
                warn!(
                    feed = %self.cursor.feed_uri(),
                    sequence = %record.sequence_id,
                    kind = %record.kind,
                    resource = %record.resource_uri,
                    error = %e,
                    "Sink failed to apply record"
                );
                SyncError::from(e)
            })
    }

    async fn persist(&mut self, next: Cursor) -> Result<(), SyncError> {
        let store = &self.store;
        retry(&self.persist_retry, "persist cursor", || store.save(&next))
            .await
            .map_err(SyncError::from)?;
        self.cursor = next;
        Ok(())
    }
}

/// Rejects a page whose sequence ids go down anywhere
pub fn check_order(records: &[ChangeRecord]) -> Result<(), SyncError> {
    match records
        .windows(2)
        .find(|w| w[1].sequence_id < w[0].sequence_id)
    {
        Some(w) => Err(SyncError::OrderingViolation {
            previous: w[0].sequence_id,
            next: w[1].sequence_id,
        }),
        None => Ok(()),
    }
}
