//! Notification data models

use serde::{Deserialize, Serialize};

/// Kind of event a notification describes.
///
/// Unrecognized wire values decode to `Unknown` instead of failing, so a newer
/// producer never breaks an older consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationType {
    Follow,
    Reaction,
    Comment,
    Mention,
    Reply,
    Repost,
    FollowAccepted,
    MessageRequestAccepted,
    SharedItem,
    #[serde(other)]
    Unknown,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Follow => "follow",
            NotificationType::Reaction => "reaction",
            NotificationType::Comment => "comment",
            NotificationType::Mention => "mention",
            NotificationType::Reply => "reply",
            NotificationType::Repost => "repost",
            NotificationType::FollowAccepted => "followAccepted",
            NotificationType::MessageRequestAccepted => "messageRequestAccepted",
            NotificationType::SharedItem => "sharedItem",
            NotificationType::Unknown => "unknown",
        }
    }

    /// Parse a wire value. Never fails: anything unrecognized is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "follow" => NotificationType::Follow,
            "reaction" => NotificationType::Reaction,
            "comment" => NotificationType::Comment,
            "mention" => NotificationType::Mention,
            "reply" => NotificationType::Reply,
            "repost" => NotificationType::Repost,
            "followAccepted" => NotificationType::FollowAccepted,
            "messageRequestAccepted" => NotificationType::MessageRequestAccepted,
            "sharedItem" => NotificationType::SharedItem,
            _ => NotificationType::Unknown,
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A secondary actor of an aggregated notification ("N people did X").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

/// One user-facing notification as stored in the event source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Assigned by the event source; `None` until persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub recipient_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_image_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub read: bool,
    /// Unix timestamp in milliseconds.
    pub created_at: i64,
    /// Last activity of an aggregated record, Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actors: Option<Vec<ActorRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_count: Option<u32>,
}

impl NotificationRecord {
    /// Create an unpersisted record with only the required fields set.
    pub fn new(
        recipient_id: impl Into<String>,
        notification_type: NotificationType,
        created_at: i64,
    ) -> Self {
        Self {
            id: None,
            recipient_id: recipient_id.into(),
            notification_type,
            actor_id: None,
            actor_display_name: None,
            actor_handle: None,
            actor_image_ref: None,
            subject_id: None,
            body: None,
            read: false,
            created_at,
            updated_at: None,
            actors: None,
            actor_count: None,
        }
    }

    /// `updated_at` when present, `created_at` otherwise.
    pub fn effective_timestamp(&self) -> i64 {
        self.updated_at.unwrap_or(self.created_at)
    }

    /// Grouping key used by deduplication.
    ///
    /// `type_actor_subject` when a subject is present, `type_actor` otherwise.
    /// A missing actor is spelled `unknown`.
    pub fn identity_key(&self) -> String {
        let actor = self.actor_id.as_deref().unwrap_or("unknown");
        match &self.subject_id {
            Some(subject) => format!("{}_{}_{}", self.notification_type, actor, subject),
            None => format!("{}_{}", self.notification_type, actor),
        }
    }

    pub fn is_aggregated(&self) -> bool {
        self.actors.is_some()
    }

    /// Number of people behind this notification.
    pub fn total_actor_count(&self) -> u32 {
        if let Some(count) = self.actor_count {
            return count;
        }
        match &self.actors {
            Some(actors) => actors.len() as u32,
            None if self.actor_id.is_some() => 1,
            None => 0,
        }
    }
}

/// The originating action of a fan-out: everything a new record needs except its
/// recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanoutPayload {
    pub notification_type: NotificationType,
    pub subject_id: Option<String>,
    pub body: Option<String>,
    pub actor_display_name: Option<String>,
    pub actor_handle: Option<String>,
    pub actor_image_ref: Option<String>,
}

impl FanoutPayload {
    pub fn new(notification_type: NotificationType) -> Self {
        Self {
            notification_type,
            subject_id: None,
            body: None,
            actor_display_name: None,
            actor_handle: None,
            actor_image_ref: None,
        }
    }

    /// Build the unpersisted record delivered to `recipient_id`.
    pub fn to_record(&self, actor_id: &str, recipient_id: &str, created_at: i64) -> NotificationRecord {
        NotificationRecord {
            actor_id: Some(actor_id.to_string()),
            actor_display_name: self.actor_display_name.clone(),
            actor_handle: self.actor_handle.clone(),
            actor_image_ref: self.actor_image_ref.clone(),
            subject_id: self.subject_id.clone(),
            body: self.body.clone(),
            ..NotificationRecord::new(recipient_id, self.notification_type, created_at)
        }
    }
}

/// Outcome of a fan-out write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    pub delivered: usize,
    pub skipped_self: usize,
    pub skipped_duplicates: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(notification_type: NotificationType, actor: Option<&str>, subject: Option<&str>) -> NotificationRecord {
        NotificationRecord {
            actor_id: actor.map(str::to_string),
            subject_id: subject.map(str::to_string),
            ..NotificationRecord::new("user-1", notification_type, 1_700_000_000_000)
        }
    }

    #[test]
    fn test_notification_type_serialization() {
        let serialized = serde_json::to_string(&NotificationType::FollowAccepted).unwrap();
        assert_eq!(serialized, "\"followAccepted\"");

        let deserialized: NotificationType = serde_json::from_str("\"sharedItem\"").unwrap();
        assert_eq!(deserialized, NotificationType::SharedItem);
    }

    #[test]
    fn test_unrecognized_type_decodes_to_unknown() {
        let deserialized: NotificationType = serde_json::from_str("\"birthdayReminder\"").unwrap();
        assert_eq!(deserialized, NotificationType::Unknown);
        assert_eq!(NotificationType::parse("birthdayReminder"), NotificationType::Unknown);
    }

    #[test]
    fn test_as_str_and_parse_agree() {
        let all = [
            NotificationType::Follow,
            NotificationType::Reaction,
            NotificationType::Comment,
            NotificationType::Mention,
            NotificationType::Reply,
            NotificationType::Repost,
            NotificationType::FollowAccepted,
            NotificationType::MessageRequestAccepted,
            NotificationType::SharedItem,
            NotificationType::Unknown,
        ];
        for t in all {
            assert_eq!(NotificationType::parse(t.as_str()), t);
        }
    }

    #[test]
    fn test_record_deserializes_with_defaults() {
        let json = serde_json::json!({
            "recipient_id": "user-1",
            "type": "comment",
            "actor_id": "alice",
            "subject_id": "post-9",
            "created_at": 1700000000000i64
        });
        let record: NotificationRecord = serde_json::from_value(json).unwrap();

        assert!(record.id.is_none());
        assert!(!record.read);
        assert!(record.updated_at.is_none());
        assert!(record.actors.is_none());
        assert_eq!(record.notification_type, NotificationType::Comment);
    }

    #[test]
    fn test_effective_timestamp_prefers_updated_at() {
        let mut r = record(NotificationType::Reaction, Some("alice"), Some("post-1"));
        assert_eq!(r.effective_timestamp(), 1_700_000_000_000);

        r.updated_at = Some(1_700_000_999_000);
        assert_eq!(r.effective_timestamp(), 1_700_000_999_000);
    }

    #[test]
    fn test_identity_key() {
        assert_eq!(
            record(NotificationType::Comment, Some("alice"), Some("post-1")).identity_key(),
            "comment_alice_post-1"
        );
        assert_eq!(
            record(NotificationType::Follow, Some("alice"), None).identity_key(),
            "follow_alice"
        );
        assert_eq!(
            record(NotificationType::Unknown, None, None).identity_key(),
            "unknown_unknown"
        );
    }

    #[test]
    fn test_total_actor_count() {
        let mut r = record(NotificationType::Reaction, Some("alice"), Some("post-1"));
        assert_eq!(r.total_actor_count(), 1);
        assert!(!r.is_aggregated());

        r.actors = Some(vec![
            ActorRef { id: "bob".into(), display_name: None, handle: None, image_ref: None },
            ActorRef { id: "carol".into(), display_name: None, handle: None, image_ref: None },
        ]);
        assert!(r.is_aggregated());
        assert_eq!(r.total_actor_count(), 2);

        r.actor_count = Some(17);
        assert_eq!(r.total_actor_count(), 17);

        assert_eq!(record(NotificationType::Unknown, None, None).total_actor_count(), 0);
    }

    #[test]
    fn test_fanout_payload_to_record() {
        let payload = FanoutPayload {
            subject_id: Some("post-3".into()),
            body: Some("hey @bob".into()),
            ..FanoutPayload::new(NotificationType::Mention)
        };

        let r = payload.to_record("alice", "bob", 42);
        assert_eq!(r.recipient_id, "bob");
        assert_eq!(r.actor_id.as_deref(), Some("alice"));
        assert_eq!(r.subject_id.as_deref(), Some("post-3"));
        assert_eq!(r.body.as_deref(), Some("hey @bob"));
        assert_eq!(r.created_at, 42);
        assert!(r.id.is_none());
        assert!(!r.read);
    }
}
