//! trsync Sync - Change-log synchronization engine
//!
//! Provides:
//! - Bounded exponential retry with jitter
//! - Exactly-once, in-order application of change records
//! - One polling loop per feed, with cursor resumption across restarts
//! - A supervisor running many feeds side by side
//!
//! ## Modules
//!
//! - [`retry`] - [`RetryPolicy`] and the generic retry combinator
//! - [`processor`] - [`ChangeProcessor`]: apply-then-persist per record
//! - [`orchestrator`] - [`FeedSynchronizer`]: base sync and the poll loop of one feed
//! - [`supervisor`] - [`SyncSupervisor`]: feed tasks, status, nudges, shutdown
//! - [`sink`] - [`JsonLinesSink`], a file-backed downstream sink
//!
//! ## Flow
//!
//! ```text
//! FeedSynchronizer ──→ IFeedReader (pages) ──→ ChangeProcessor ──→ IChangeSink
//!        ▲                                           │
//!        └──────── next poll ◄──── ICursorStore ◄────┘
//! ```

pub mod orchestrator;
pub mod processor;
pub mod retry;
pub mod sink;
pub mod supervisor;

pub use orchestrator::{FeedReport, FeedSynchronizer, SyncSettings};
pub use processor::{ChangeProcessor, PageOutcome};
pub use retry::{retry, retry_notify, RetryPolicy, Retryable};
pub use sink::JsonLinesSink;
pub use supervisor::SyncSupervisor;
