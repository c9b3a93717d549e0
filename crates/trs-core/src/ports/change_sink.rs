//! Downstream sink port (driving side of change application)

use thiserror::Error;

use crate::domain::{ChangeRecord, SyncError};

/// Errors raised while applying a record downstream
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Failure that may clear up on retry
    #[error("Sink temporarily unavailable: {0}")]
    Transient(String),

    /// Failure that retrying will not fix
    #[error("Sink rejected record: {0}")]
    Permanent(String),
}

impl SinkError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Transient(_))
    }
}

impl From<SinkError> for SyncError {
    fn from(err: SinkError) -> Self {
        SyncError::Application(err.to_string())
    }
}

/// Port trait for the consumer of change records
///
/// `apply` returning `Ok` means the record is durably applied; only then
/// does the engine advance the cursor past it. Records may be delivered
/// again after a crash between apply and cursor persistence, so
/// implementations should tolerate re-delivery.
#[async_trait::async_trait]
pub trait IChangeSink: Send + Sync {
    async fn apply(&self, record: &ChangeRecord) -> Result<(), SinkError>;
}
