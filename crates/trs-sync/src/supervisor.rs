//! Multi-feed supervisor
//!
//! Runs one [`FeedSynchronizer`] per feed as an independent tokio task.
//! Each feed gets a child of the supervisor's cancellation token, so a feed
//! can be stopped alone or all of them at once. A feed that fails or panics
//! does not touch the others.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use trs_core::domain::{FeedStatus, SyncError};
use trs_core::ports::{IChangeSink, ICursorStore, IFeedReader};
use url::Url;

use crate::orchestrator::{FeedReport, FeedSynchronizer, SyncSettings};

struct FeedHandle {
    status: watch::Receiver<FeedStatus>,
    nudge: Arc<Notify>,
    cancel: CancellationToken,
}

/// Owns the per-feed tasks
pub struct SyncSupervisor {
    tasks: JoinSet<FeedReport>,
    feeds: BTreeMap<Url, FeedHandle>,
    cancel: CancellationToken,
}

impl SyncSupervisor {
    /// Starts one task per reader
    ///
    /// Two readers for the same feed URI would both write its cursor, so
    /// duplicates are rejected before anything is spawned.
    pub fn spawn(
        readers: Vec<Arc<dyn IFeedReader>>,
        store: Arc<dyn ICursorStore>,
        sink: Arc<dyn IChangeSink>,
        settings: SyncSettings,
    ) -> Result<Self, SyncError> {
        let mut seen = HashSet::new();
        for reader in &readers {
            if !seen.insert(reader.feed_uri().clone()) {
                return Err(SyncError::InvalidConfiguration(format!(
                    "feed {} configured more than once",
                    reader.feed_uri()
                )));
            }
        }

        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let mut feeds = BTreeMap::new();

        for reader in readers {
            let feed_uri = reader.feed_uri().clone();
            let token = cancel.child_token();
            let synchronizer = FeedSynchronizer::new(
                reader,
                Arc::clone(&store),
                Arc::clone(&sink),
                settings.clone(),
                token.clone(),
            );

            feeds.insert(
                feed_uri,
                FeedHandle {
                    status: synchronizer.subscribe(),
                    nudge: synchronizer.nudge_handle(),
                    cancel: token,
                },
            );
            tasks.spawn(synchronizer.run());
        }

        info!(feeds = feeds.len(), "Sync supervisor started");
        Ok(Self {
            tasks,
            feeds,
            cancel,
        })
    }

    /// Feed URIs in order
    pub fn feeds(&self) -> impl Iterator<Item = &Url> {
        self.feeds.keys()
    }

    /// Snapshot of every feed's status
    pub fn statuses(&self) -> BTreeMap<Url, FeedStatus> {
        self.feeds
            .iter()
            .map(|(uri, h)| (uri.clone(), h.status.borrow().clone()))
            .collect()
    }

    pub fn status(&self, feed_uri: &Url) -> Option<FeedStatus> {
        self.feeds.get(feed_uri).map(|h| h.status.borrow().clone())
    }

    /// Live status channel for one feed
    pub fn subscribe(&self, feed_uri: &Url) -> Option<watch::Receiver<FeedStatus>> {
        self.feeds.get(feed_uri).map(|h| h.status.clone())
    }

    /// Asks a feed to poll now instead of waiting out its interval
    ///
    /// Returns false for an unknown feed. A nudge sent while the feed is busy
    /// is kept and consumed by its next idle wait.
    pub fn nudge(&self, feed_uri: &Url) -> bool {
        match self.feeds.get(feed_uri) {
            Some(h) => {
                h.nudge.notify_one();
                true
            }
            None => {
                warn!(feed = %feed_uri, "Nudge for unknown feed");
                false
            }
        }
    }

    /// Stops a single feed; the others keep running
    pub fn stop(&self, feed_uri: &Url) -> bool {
        match self.feeds.get(feed_uri) {
            Some(h) => {
                h.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Waits for the next feed to finish
    ///
    /// Returns `None` once no feed is running. A panicked feed task is
    /// logged and skipped.
    pub async fn next_report(&mut self) -> Option<FeedReport> {
        loop {
            match self.tasks.join_next().await? {
                Ok(report) => return Some(report),
                Err(e) => error!(error = %e, "Feed task aborted"),
            }
        }
    }

    /// Stops every feed and collects one report per feed, ordered by URI
    ///
    /// A feed whose report was already taken through
    /// [`next_report`](Self::next_report) is listed with its last status and
    /// no cursor.
    pub async fn shutdown(mut self) -> Vec<FeedReport> {
        info!("Stopping all feeds");
        self.cancel.cancel();

        let mut reports = BTreeMap::new();
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(report) => {
                    reports.insert(report.feed_uri.clone(), report);
                }
                Err(e) => error!(error = %e, "Feed task aborted"),
            }
        }

        std::mem::take(&mut self.feeds)
            .into_iter()
            .map(|(uri, handle)| {
                reports.remove(&uri).unwrap_or_else(|| FeedReport {
                    feed_uri: uri,
                    status: last_status(&handle),
                    cursor: None,
                    cycles: 0,
                })
            })
            .collect()
    }
}

/// Status for a feed whose task produced no report
fn last_status(handle: &FeedHandle) -> FeedStatus {
    let status = handle.status.borrow().clone();
    if status.is_terminal() {
        status
    } else {
        FeedStatus::Failed("feed task panicked".to_string())
    }
}

impl Drop for SyncSupervisor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
