//! Notification store: the in-memory notification list owned by one actor task,
//! driven through [`NotificationStore`] and observed through published snapshots.

mod actor;
mod commands;
mod fanout;
mod handle;
mod state;

pub use handle::NotificationStore;
pub use state::{NotificationFilter, NotificationList, NotificationsSnapshot};
