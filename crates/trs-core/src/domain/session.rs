//! SyncSession domain entity
//!
//! A [`SyncSession`] covers one poll cycle of one feed: the change pages
//! fetched since the cursor, the records applied or skipped, and the
//! transport retries spent. Sessions are not persisted; the orchestrator
//! logs them when the cycle ends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::newtypes::{SequenceId, SessionId};

/// Status of a sync session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Cycle in progress
    Running,
    /// Every page was fetched and applied
    Completed,
    /// Cycle ended early with an error
    Failed(String),
    /// Cycle interrupted by a stop request
    Cancelled,
}

impl SessionStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, SessionStatus::Running)
    }

    pub fn is_finished(&self) -> bool {
        !self.is_running()
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SessionStatus::Completed)
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Running
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed(msg) => write!(f, "failed: {}", msg),
            SessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One poll cycle of a feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSession {
    id: SessionId,
    feed_uri: Url,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    status: SessionStatus,
    pages_fetched: u64,
    records_applied: u64,
    duplicates_skipped: u64,
    transport_retries: u64,
    /// Cursor position when the cycle started
    cursor_start: Option<SequenceId>,
    /// Cursor position when the cycle ended
    cursor_end: Option<SequenceId>,
}

impl SyncSession {
    /// Starts a session for `feed_uri` at the given cursor position
    pub fn new(feed_uri: Url, cursor_start: Option<SequenceId>) -> Self {
        Self {
            id: SessionId::new(),
            feed_uri,
            started_at: Utc::now(),
            completed_at: None,
            status: SessionStatus::Running,
            pages_fetched: 0,
            records_applied: 0,
            duplicates_skipped: 0,
            transport_retries: 0,
            cursor_start,
            cursor_end: cursor_start,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn feed_uri(&self) -> &Url {
        &self.feed_uri
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    pub fn records_applied(&self) -> u64 {
        self.records_applied
    }

    pub fn duplicates_skipped(&self) -> u64 {
        self.duplicates_skipped
    }

    pub fn transport_retries(&self) -> u64 {
        self.transport_retries
    }

    pub fn cursor_start(&self) -> Option<SequenceId> {
        self.cursor_start
    }

    pub fn cursor_end(&self) -> Option<SequenceId> {
        self.cursor_end
    }

    pub fn record_page(&mut self) {
        self.pages_fetched += 1;
    }

    /// Counts applied and skipped records and moves the end cursor
    pub fn record_applied(&mut self, applied: u64, skipped: u64, cursor: Option<SequenceId>) {
        self.records_applied += applied;
        self.duplicates_skipped += skipped;
        if cursor > self.cursor_end {
            self.cursor_end = cursor;
        }
    }

    pub fn record_retry(&mut self) {
        self.transport_retries += 1;
    }

    /// Marks the session as completed
    pub fn complete(&mut self) {
        self.finish(SessionStatus::Completed);
    }

    /// Marks the session as failed
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.finish(SessionStatus::Failed(reason.into()));
    }

    /// Marks the session as cancelled
    pub fn cancel(&mut self) {
        self.finish(SessionStatus::Cancelled);
    }

    /// Wall-clock duration, up to now for a running session
    pub fn duration(&self) -> chrono::Duration {
        self.completed_at.unwrap_or_else(Utc::now) - self.started_at
    }

    fn finish(&mut self, status: SessionStatus) {
        // first outcome wins
        if self.status.is_finished() {
            return;
        }
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}
