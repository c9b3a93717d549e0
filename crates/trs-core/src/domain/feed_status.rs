//! Per-feed synchronization state machine
//!
//! ```text
//! Uninitialized ──→ BaseSynced ──→ Polling ⇄ Backoff
//!       │      ↖           ↑         ⇅
//!       │       Degraded   │       Degraded
//!       │   (base retried) │
//!       └─────(resume)─────┘
//!
//! any non-terminal ──→ Failed | Stopped
//! ```
//!
//! `Failed` and `Stopped` are terminal for the running process: a failed
//! feed stays down until it is restarted externally.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Lifecycle state of one tracked feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    /// No cursor loaded yet; base sync pending or running
    Uninitialized,
    /// Base snapshot applied, cursor set to the base marker
    BaseSynced,
    /// Steady state: polling the change log
    Polling,
    /// Waiting before retrying a transient transport failure
    Backoff,
    /// Change application is failing; polling continues
    Degraded(String),
    /// Polling abandoned until restarted
    Failed(String),
    /// Stopped on request
    Stopped,
}

impl FeedStatus {
    /// Human-readable name of the state, without the reason
    pub fn name(&self) -> &'static str {
        match self {
            FeedStatus::Uninitialized => "Uninitialized",
            FeedStatus::BaseSynced => "BaseSynced",
            FeedStatus::Polling => "Polling",
            FeedStatus::Backoff => "Backoff",
            FeedStatus::Degraded(_) => "Degraded",
            FeedStatus::Failed(_) => "Failed",
            FeedStatus::Stopped => "Stopped",
        }
    }

    /// Returns true once the feed loop has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, FeedStatus::Failed(_) | FeedStatus::Stopped)
    }

    /// Returns true if the feed is actively polling (healthy or not)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            FeedStatus::Polling | FeedStatus::Backoff | FeedStatus::Degraded(_)
        )
    }

    /// Checks whether moving from `self` to `target` is allowed
    pub fn can_transition_to(&self, target: &FeedStatus) -> bool {
        if self.is_terminal() {
            return false;
        }

        // Any live state may fail or be stopped
        if target.is_terminal() {
            return true;
        }

        match (self, target) {
            (FeedStatus::Uninitialized, FeedStatus::BaseSynced) => true,
            // resume from a persisted cursor skips the base
            (FeedStatus::Uninitialized, FeedStatus::Polling) => true,
            // sink failing while the base is applied
            (FeedStatus::Uninitialized, FeedStatus::Degraded(_)) => true,

            (FeedStatus::BaseSynced, FeedStatus::Polling) => true,

            (FeedStatus::Polling, FeedStatus::Backoff) => true,
            (FeedStatus::Polling, FeedStatus::Degraded(_)) => true,

            (FeedStatus::Backoff, FeedStatus::Polling) => true,

            (FeedStatus::Degraded(_), FeedStatus::Polling) => true,
            (FeedStatus::Degraded(_), FeedStatus::Degraded(_)) => true,
            (FeedStatus::Degraded(_), FeedStatus::Backoff) => true,
            (FeedStatus::Degraded(_), FeedStatus::BaseSynced) => true,

            _ => false,
        }
    }

    /// Moves to `target`, rejecting transitions the state machine forbids
    pub fn transition_to(&mut self, target: FeedStatus) -> Result<(), DomainError> {
        if !self.can_transition_to(&target) {
            return Err(DomainError::InvalidState {
                from: self.name().to_string(),
                to: target.name().to_string(),
            });
        }
        *self = target;
        Ok(())
    }
}

impl Default for FeedStatus {
    fn default() -> Self {
        FeedStatus::Uninitialized
    }
}

impl std::fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedStatus::Degraded(reason) => write!(f, "degraded: {reason}"),
            FeedStatus::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(&other.name().to_ascii_lowercase()),
        }
    }
}
