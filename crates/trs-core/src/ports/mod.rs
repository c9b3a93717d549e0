//! Port definitions (hexagonal architecture interfaces)
//!
//! The sync engine depends only on these traits; their implementations
//! live in adapter crates.
//!
//! - [`IFeedReader`] - Pulls base and change-log pages from a TRS provider
//! - [`ICursorStore`] - Durable per-feed cursor persistence
//! - [`IChangeSink`] - Downstream application of change records

pub mod change_sink;
pub mod cursor_store;
pub mod feed_reader;

pub use change_sink::{IChangeSink, SinkError};
pub use cursor_store::{ICursorStore, StoreError};
pub use feed_reader::{FeedError, IFeedReader};
