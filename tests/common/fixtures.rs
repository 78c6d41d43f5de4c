//! Record builders for end-to-end tests

use notification_engine::{NotificationRecord, NotificationType};

/// An unread record from `actor` to `recipient`.
pub fn record(
    recipient: &str,
    notification_type: NotificationType,
    actor: &str,
    created_at: i64,
) -> NotificationRecord {
    NotificationRecord {
        actor_id: Some(actor.to_string()),
        ..NotificationRecord::new(recipient, notification_type, created_at)
    }
}

/// `count` unread mentions from distinct actors, so none collapse in dedup.
pub fn distinct_unread(recipient: &str, count: usize) -> Vec<NotificationRecord> {
    (0..count)
        .map(|i| {
            record(
                recipient,
                NotificationType::Mention,
                &format!("actor-{i}"),
                1_000 + i as i64,
            )
        })
        .collect()
}
