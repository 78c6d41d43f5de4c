//! User notifications module

mod dedup;
mod models;

pub use dedup::{dedup, sort_newest_first};
pub use models::{
    ActorRef, FanoutPayload, FanoutReport, NotificationRecord, NotificationType,
};
