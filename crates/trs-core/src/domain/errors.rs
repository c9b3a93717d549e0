//! Domain error types
//!
//! [`DomainError`] covers validation failures and invalid state transitions
//! inside the domain. [`SyncError`] is the error taxonomy the sync engine
//! reasons about: every adapter error is converted into one of its variants
//! so retry and feed-status decisions are made in one place.

use thiserror::Error;

use super::newtypes::SequenceId;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The feed URI could not be parsed or uses an unsupported scheme
    #[error("Invalid feed URI: {0}")]
    InvalidUri(String),

    /// Exactly one of username/password was supplied
    #[error("Partial credentials: {0}")]
    PartialCredentials(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Synchronization error taxonomy
///
/// | Variant                | Retryable                 | Feed outcome            |
/// |------------------------|---------------------------|-------------------------|
/// | `InvalidConfiguration` | no                        | never started           |
/// | `Transport`            | when `transient` is true  | `Failed` after the cap  |
/// | `Auth`                 | no                        | `Failed`                |
/// | `Persistence`          | yes (bounded)             | `Failed` after the cap  |
/// | `Application`          | yes (bounded)             | `Degraded`              |
/// | `OrderingViolation`    | no                        | `Failed`                |
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Construction-time configuration problem
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Network or HTTP failure talking to the feed
    #[error("Transport error ({}): {message}", transient_label(.transient))]
    Transport {
        /// Whether retrying the same request may succeed
        transient: bool,
        /// Description of the failure
        message: String,
    },

    /// The feed rejected the configured credentials
    #[error("Authentication rejected: {0}")]
    Auth(String),

    /// The cursor could not be durably persisted
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The downstream sink failed to apply a record
    #[error("Application error: {0}")]
    Application(String),

    /// The feed delivered records out of order
    #[error("Ordering violation: sequence {next} delivered after {previous}")]
    OrderingViolation {
        /// The sequence id seen first
        previous: SequenceId,
        /// The lower sequence id seen after it
        next: SequenceId,
    },
}

fn transient_label(transient: &bool) -> &'static str {
    if *transient {
        "transient"
    } else {
        "permanent"
    }
}

impl SyncError {
    /// Returns true if the operation that produced this error may be retried
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Transport { transient, .. } => *transient,
            SyncError::Persistence(_) | SyncError::Application(_) => true,
            _ => false,
        }
    }

    /// Short machine-friendly name of the variant, used in logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::InvalidConfiguration(_) => "invalid_configuration",
            SyncError::Transport { .. } => "transport",
            SyncError::Auth(_) => "auth",
            SyncError::Persistence(_) => "persistence",
            SyncError::Application(_) => "application",
            SyncError::OrderingViolation { .. } => "ordering_violation",
        }
    }
}

impl From<DomainError> for SyncError {
    fn from(err: DomainError) -> Self {
        SyncError::InvalidConfiguration(err.to_string())
    }
}
