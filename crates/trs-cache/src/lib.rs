//! trsync Cache - Cursor persistence
//!
//! Implements the [`ICursorStore`](trs_core::ports::ICursorStore) port twice:
//!
//! - [`SqliteCursorStore`] - durable SQLite storage used by the daemon
//! - [`InMemoryCursorStore`] - process-local storage for tests and dry runs
//!
//! Both enforce the same rule: the stored cursor of a feed never moves
//! backwards. A save that would lower it fails with
//! [`StoreError::StaleWrite`](trs_core::ports::StoreError::StaleWrite).
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use trs_cache::{DatabasePool, SqliteCursorStore};
//!
//! # async fn example() -> Result<(), trs_cache::CacheError> {
//! let pool = DatabasePool::new(Path::new("/var/lib/trsync/cursors.db")).await?;
//! let store = SqliteCursorStore::new(pool.pool().clone());
//! // Use store as ICursorStore...
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod pool;
pub mod sqlite;

pub use memory::InMemoryCursorStore;
pub use pool::DatabasePool;
pub use sqlite::SqliteCursorStore;

use trs_core::ports::StoreError;

/// Failures of the cursor database
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cannot open cursor database: {0}")]
    ConnectionFailed(String),

    #[error("Cursor query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Cursor schema migration failed: {0}")]
    MigrationFailed(String),

    /// A stored column does not map back to a cursor
    #[error("Unreadable cursor value: {0}")]
    InvalidValue(String),
}

impl From<CacheError> for StoreError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::InvalidValue(msg) => StoreError::Corrupt(msg),
            other => StoreError::Backend(other.to_string()),
        }
    }
}
