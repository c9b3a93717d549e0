//! Integration tests for the sync engine
//!
//! Feeds run against a scripted reader, a recording sink and an in-memory
//! cursor store, under paused tokio time.

mod test_base_sync;
mod test_polling;
mod test_supervisor;
