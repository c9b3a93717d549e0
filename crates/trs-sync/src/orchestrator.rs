//! Per-feed synchronization loop
//!
//! A [`FeedSynchronizer`] drives one feed from its stored cursor (or from
//! scratch, through a base sync) into a poll loop:
//!
//! ```text
//! load cursor ─┬─ none ──→ base pages ──→ cursor = marker ──┐
//!              └─ some ─────────────────────────────────────┤
//!                                                           ▼
//!        ┌──→ poll cycle: change pages since cursor → processor
//!        │                          │
//!        └── sleep(poll_interval) ◄─┘   (woken early by a nudge)
//! ```
//!
//! The loop ends when the feed fails or is stopped. Stopping is checked
//! between pages and races every fetch; a page already handed to the
//! processor is finished first.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use trs_core::config::Config;
use trs_core::domain::{
    Cursor, DomainError, FeedStatus, PageToken, SequenceId, SyncError, SyncSession,
};
use trs_core::ports::{FeedError, IChangeSink, ICursorStore, IFeedReader};
use url::Url;

use crate::processor::ChangeProcessor;
use crate::retry::{retry, retry_notify, RetryPolicy};

/// Timing and retry settings shared by every feed
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub poll_interval: Duration,
    pub transport_retry: RetryPolicy,
    pub apply_retry: RetryPolicy,
    pub persist_retry: RetryPolicy,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.sync.poll_interval(),
            transport_retry: RetryPolicy::from(&config.transport_retry),
            apply_retry: RetryPolicy::from(&config.apply_retry),
            persist_retry: RetryPolicy::from(&config.persist_retry),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Final state of a feed loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedReport {
    pub feed_uri: Url,
    pub status: FeedStatus,
    /// Last durably applied position, `None` if the base never completed
    pub cursor: Option<SequenceId>,
    /// Poll cycles run (base sync not included)
    pub cycles: u64,
}

/// Why the feed loop ended
enum Halt {
    Stopped,
    Failed(SyncError),
}

impl From<SyncError> for Halt {
    fn from(err: SyncError) -> Self {
        Halt::Failed(err)
    }
}

/// Runs base sync and the poll loop of one feed
pub struct FeedSynchronizer {
    reader: Arc<dyn IFeedReader>,
    store: Arc<dyn ICursorStore>,
    sink: Arc<dyn IChangeSink>,
    settings: SyncSettings,
    status: watch::Sender<FeedStatus>,
    nudge: Arc<Notify>,
    cancel: CancellationToken,
}

impl FeedSynchronizer {
    pub fn new(
        reader: Arc<dyn IFeedReader>,
        store: Arc<dyn ICursorStore>,
        sink: Arc<dyn IChangeSink>,
        settings: SyncSettings,
        cancel: CancellationToken,
    ) -> Self {
        let (status, _) = watch::channel(FeedStatus::Uninitialized);
        Self {
            reader,
            store,
            sink,
            settings,
            status,
            nudge: Arc::new(Notify::new()),
            cancel,
        }
    }

    pub fn feed_uri(&self) -> &Url {
        self.reader.feed_uri()
    }

    /// Live view of the feed status
    pub fn subscribe(&self) -> watch::Receiver<FeedStatus> {
        self.status.subscribe()
    }

    /// Handle that wakes the loop for an immediate poll
    pub fn nudge_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.nudge)
    }

    /// Runs until the feed fails or the cancellation token fires
    pub async fn run(self) -> FeedReport {
        let mut cycles = 0;
        let mut cursor = None;

        info!(feed = %self.feed_uri(), "Feed synchronizer starting");
        let final_status = match self.drive(&mut cycles, &mut cursor).await {
            Halt::Stopped => FeedStatus::Stopped,
            Halt::Failed(err) => {
                error!(
                    feed = %self.feed_uri(),
                    kind = err.kind(),
                    error = %err,
                    "Feed failed; polling stopped until restart"
                );
                FeedStatus::Failed(err.to_string())
            }
        };
        self.publish(final_status);

        let status = self.status.borrow().clone();
        info!(feed = %self.feed_uri(), %status, ?cursor, cycles, "Feed synchronizer finished");

        FeedReport {
            feed_uri: self.feed_uri().clone(),
            status,
            cursor,
            cycles,
        }
    }

    async fn drive(&self, cycles: &mut u64, cursor: &mut Option<SequenceId>) -> Halt {
        let mut processor = match self.initialize().await {
            Ok(p) => p,
            Err(halt) => return halt,
        };
        *cursor = processor.cursor().last_applied();

        loop {
            if self.cancel.is_cancelled() {
                return Halt::Stopped;
            }
            if *self.status.borrow() == FeedStatus::BaseSynced {
                self.publish(FeedStatus::Polling);
            }

            let mut session = SyncSession::new(
                self.feed_uri().clone(),
                processor.cursor().last_applied(),
            );
            let result = self.poll_cycle(&mut processor, &mut session).await;
            *cursor = processor.cursor().last_applied();
            *cycles += 1;

            match result {
                Ok(()) => {
                    session.complete();
                    self.publish(FeedStatus::Polling);
                }
                Err(Halt::Stopped) => {
                    session.cancel();
                    log_session(&session);
                    return Halt::Stopped;
                }
                Err(Halt::Failed(SyncError::Application(reason))) => {
                    session.fail(reason.clone());
                    warn!(
                        feed = %self.feed_uri(),
                        %reason,
                        "Sink failing; feed degraded, retrying next cycle"
                    );
                    self.publish(FeedStatus::Degraded(reason));
                }
                Err(Halt::Failed(err)) => {
                    session.fail(err.to_string());
                    log_session(&session);
                    return Halt::Failed(err);
                }
            }
            log_session(&session);

            if let Err(halt) = self.idle().await {
                return halt;
            }
        }
    }

    /// Loads the cursor and, if there is none, performs the base sync
    ///
    /// A sink failure during the base marks the feed `Degraded` and restarts
    /// the whole base after one poll interval.
    async fn initialize(&self) -> Result<ChangeProcessor, Halt> {
        let feed_uri = self.feed_uri();
        let store = &self.store;
        let stored = retry(&self.settings.persist_retry, "load cursor", || {
            store.load(feed_uri)
        })
        .await
        .map_err(SyncError::from)?;

        if let Some(cursor) = stored.filter(|c| !c.needs_base_sync()) {
            info!(
                feed = %feed_uri,
                cursor = ?cursor.last_applied(),
                "Resuming from stored cursor"
            );
            self.publish(FeedStatus::Polling);
            return Ok(self.processor(cursor));
        }

        loop {
            let mut processor = self.processor(Cursor::empty(feed_uri.clone()));
            match self.base_sync(&mut processor).await {
                Ok(()) => {
                    self.publish(FeedStatus::BaseSynced);
                    return Ok(processor);
                }
                Err(Halt::Failed(SyncError::Application(reason))) => {
                    warn!(feed = %feed_uri, %reason, "Base sync interrupted by sink failure");
                    self.publish(FeedStatus::Degraded(reason));
                    self.idle().await?;
                }
                Err(halt) => return Err(halt),
            }
        }
    }

    #[tracing::instrument(skip(self, processor), fields(feed = %self.feed_uri()))]
    async fn base_sync(&self, processor: &mut ChangeProcessor) -> Result<(), Halt> {
        info!("Starting base sync");

        let reader = &self.reader;
        let mut token: Option<PageToken> = None;
        let mut cutoff: Option<SequenceId> = None;
        let mut members = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(Halt::Stopped);
            }

            let tok = token.as_ref();
            let (page, _) = self
                .fetch("fetch base page", false, || reader.fetch_base_page(tok))
                .await?;

            // the first page's cutoff marks the whole base
            let marker = *cutoff.get_or_insert(page.cutoff.unwrap_or(SequenceId::ZERO));
            members += processor.apply_base_page(&page, marker).await?;

            match page.next_page {
                Some(next) => token = Some(next),
                None => {
                    processor.complete_base(marker).await?;
                    info!(members, %marker, "Base sync finished");
                    return Ok(());
                }
            }
        }
    }

    #[tracing::instrument(skip_all, fields(feed = %self.feed_uri(), session = %session.id()))]
    async fn poll_cycle(
        &self,
        processor: &mut ChangeProcessor,
        session: &mut SyncSession,
    ) -> Result<(), Halt> {
        let reader = &self.reader;
        let mut token: Option<PageToken> = None;

        loop {
            if self.cancel.is_cancelled() {
                return Err(Halt::Stopped);
            }

            let since = processor.cursor().last_applied();
            let tok = token.as_ref();
            let (page, retries) = self
                .fetch("fetch change page", true, || {
                    reader.fetch_changes_page(since, tok)
                })
                .await?;
            session.record_page();
            for _ in 0..retries {
                session.record_retry();
            }

            let outcome = processor.apply_page(&page).await?;
            session.record_applied(
                outcome.applied,
                outcome.skipped,
                processor.cursor().last_applied(),
            );

            match page.next_page {
                Some(next) => token = Some(next),
                None => return Ok(()),
            }
        }
    }

    /// Fetches with transport retry, abandoning the request on stop
    ///
    /// Returns the value and the number of retries it took.
    async fn fetch<T, F, Fut>(
        &self,
        operation: &str,
        show_backoff: bool,
        f: F,
    ) -> Result<(T, u32), Halt>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FeedError>>,
    {
        let mut retries = 0;
        let result = {
            let attempt = retry_notify(
                &self.settings.transport_retry,
                operation,
                f,
                |_, _, _| {
                    retries += 1;
                    if show_backoff {
                        self.publish(FeedStatus::Backoff);
                    }
                },
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(operation, "Fetch abandoned on stop");
                    return Err(Halt::Stopped);
                }
                result = attempt => result,
            }
        };

        if show_backoff && *self.status.borrow() == FeedStatus::Backoff {
            self.publish(FeedStatus::Polling);
        }

        result
            .map(|value| (value, retries))
            .map_err(|e| Halt::Failed(e.into()))
    }

    /// Sleeps one poll interval, waking early on nudge or stop
    async fn idle(&self) -> Result<(), Halt> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Halt::Stopped),
            _ = self.nudge.notified() => {
                debug!(feed = %self.feed_uri(), "Nudged, polling now");
                Ok(())
            }
            _ = tokio::time::sleep(self.settings.poll_interval) => Ok(()),
        }
    }

    fn processor(&self, cursor: Cursor) -> ChangeProcessor {
        ChangeProcessor::new(
            cursor,
            Arc::clone(&self.sink),
            Arc::clone(&self.store),
            self.settings.apply_retry.clone(),
            self.settings.persist_retry.clone(),
        )
    }

    /// Moves the published status to `target`
    ///
    /// Re-publishing the current state is a no-op. A transition the state
    /// machine forbids is logged and ignored.
    fn publish(&self, target: FeedStatus) {
        let mut rejected: Option<DomainError> = None;
        self.status.send_if_modified(|current| {
            if *current == target {
                return false;
            }
            match current.transition_to(target.clone()) {
                Ok(()) => true,
                Err(e) => {
                    rejected = Some(e);
                    false
                }
            }
        });

        match rejected {
            Some(e) => error!(feed = %self.feed_uri(), error = %e, "Rejected status change"),
            None => debug!(feed = %self.feed_uri(), status = %*self.status.borrow(), "Status"),
        }
    }
}

fn log_session(session: &SyncSession) {
    let duration_ms = session.duration().num_milliseconds();
    if session.status().is_success() {
        debug!(
            feed = %session.feed_uri(),
            session = %session.id(),
            pages = session.pages_fetched(),
            applied = session.records_applied(),
            skipped = session.duplicates_skipped(),
            retries = session.transport_retries(),
            cursor = ?session.cursor_end(),
            duration_ms,
            "Poll cycle complete"
        );
    } else {
        info!(
            feed = %session.feed_uri(),
            session = %session.id(),
            status = %session.status(),
            pages = session.pages_fetched(),
            applied = session.records_applied(),
            cursor_start = ?session.cursor_start(),
            cursor_end = ?session.cursor_end(),
            duration_ms,
            "Poll cycle ended early"
        );
    }
}
