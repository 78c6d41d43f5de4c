//! Notification Engine Library
//!
//! Real-time notification delivery: a live subscription against an event
//! source, deduplication of the delivered records, and the mutations a client
//! performs on its own notifications.

pub mod batch;
pub mod config;
pub mod error;
pub mod identity;
pub mod listener;
pub mod metrics;
pub mod notifications;
pub mod source;
pub mod store;

// Re-export commonly used types for convenience
pub use error::{BackendError, BackendErrorCode, BatchError, ErrorKind, NotificationError};
pub use identity::{IdentityProvider, StaticIdentity};
pub use notifications::{FanoutPayload, FanoutReport, NotificationRecord, NotificationType};
pub use source::{EventSource, InMemoryEventSource, SqliteEventSource};
pub use store::{NotificationFilter, NotificationStore, NotificationsSnapshot};
