//! Domain entities and business logic
//!
//! - Newtypes for sequence identifiers and paging tokens
//! - The endpoint descriptor (feed URI + optional basic-auth credentials)
//! - Change records, base members and feed pages
//! - The persisted cursor
//! - The per-feed status state machine
//! - Per-cycle sync sessions
//! - Domain and synchronization error types

pub mod change;
pub mod cursor;
pub mod endpoint;
pub mod errors;
pub mod feed_status;
pub mod newtypes;
pub mod session;

// Re-export commonly used types
pub use change::{BasePage, ChangeKind, ChangePage, ChangeRecord, ResourceRef};
pub use cursor::Cursor;
pub use endpoint::{BasicCredentials, EndpointDescriptor};
pub use errors::{DomainError, SyncError};
pub use feed_status::FeedStatus;
pub use newtypes::*;
pub use session::{SessionStatus, SyncSession};
