//! Collapses redundant event records into one record per identity key.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use super::models::NotificationRecord;

/// Keep the most recent record per identity key, sorted newest first.
///
/// Recency is the effective timestamp. On an exact tie the record appearing later
/// in `records` wins. Running it again on its own output changes nothing.
pub fn dedup(records: Vec<NotificationRecord>) -> Vec<NotificationRecord> {
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut kept: Vec<NotificationRecord> = Vec::with_capacity(records.len());

    for record in records {
        match slots.entry(record.identity_key()) {
            Entry::Occupied(slot) => {
                let existing = &mut kept[*slot.get()];
                if record.effective_timestamp() >= existing.effective_timestamp() {
                    *existing = record;
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(kept.len());
                kept.push(record);
            }
        }
    }

    sort_newest_first(&mut kept);
    kept
}

/// Stable sort by effective timestamp, descending.
pub fn sort_newest_first(records: &mut [NotificationRecord]) {
    records.sort_by(|a, b| b.effective_timestamp().cmp(&a.effective_timestamp()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::models::NotificationType;

    fn rec(
        id: &str,
        notification_type: NotificationType,
        actor: &str,
        subject: Option<&str>,
        created_at: i64,
    ) -> NotificationRecord {
        NotificationRecord {
            id: Some(id.to_string()),
            actor_id: Some(actor.to_string()),
            subject_id: subject.map(str::to_string),
            ..NotificationRecord::new("me", notification_type, created_at)
        }
    }

    fn ids(records: &[NotificationRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_deref().unwrap()).collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(dedup(Vec::new()).is_empty());
    }

    #[test]
    fn test_duplicate_follow_keeps_latest() {
        let out = dedup(vec![
            rec("a", NotificationType::Follow, "A", None, 10),
            rec("b", NotificationType::Follow, "A", None, 12),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].created_at, 12);
        assert_eq!(ids(&out), vec!["b"]);
    }

    #[test]
    fn test_latest_wins_regardless_of_arrival_order() {
        let out = dedup(vec![
            rec("newer", NotificationType::Follow, "A", None, 12),
            rec("older", NotificationType::Follow, "A", None, 10),
        ]);
        assert_eq!(ids(&out), vec!["newer"]);
    }

    #[test]
    fn test_updated_at_counts_as_recency() {
        let mut aggregated = rec("agg", NotificationType::Reaction, "A", Some("p1"), 5);
        aggregated.updated_at = Some(100);
        let out = dedup(vec![
            aggregated,
            rec("plain", NotificationType::Reaction, "A", Some("p1"), 50),
        ]);
        assert_eq!(ids(&out), vec!["agg"]);
    }

    #[test]
    fn test_subject_is_part_of_the_key() {
        let out = dedup(vec![
            rec("c1", NotificationType::Comment, "A", Some("post-1"), 10),
            rec("c2", NotificationType::Comment, "A", Some("post-2"), 11),
        ]);
        assert_eq!(out.len(), 2);

        let out = dedup(vec![
            rec("c1", NotificationType::Comment, "A", Some("post-1"), 10),
            rec("c2", NotificationType::Comment, "A", Some("post-1"), 11),
        ]);
        assert_eq!(ids(&out), vec!["c2"]);
    }

    #[test]
    fn test_type_and_actor_are_part_of_the_key() {
        let out = dedup(vec![
            rec("f", NotificationType::Follow, "A", None, 10),
            rec("m", NotificationType::Mention, "A", None, 11),
            rec("g", NotificationType::Follow, "B", None, 12),
        ]);
        assert_eq!(ids(&out), vec!["g", "m", "f"]);
    }

    #[test]
    fn test_tie_keeps_later_input() {
        let out = dedup(vec![
            rec("first", NotificationType::Follow, "A", None, 10),
            rec("second", NotificationType::Follow, "A", None, 10),
        ]);
        assert_eq!(ids(&out), vec!["second"]);
    }

    #[test]
    fn test_output_sorted_newest_first() {
        let out = dedup(vec![
            rec("x", NotificationType::Follow, "A", None, 1),
            rec("y", NotificationType::Follow, "B", None, 3),
            rec("z", NotificationType::Follow, "C", None, 2),
        ]);
        assert_eq!(ids(&out), vec!["y", "z", "x"]);
    }

    #[test]
    fn test_idempotent() {
        let input = vec![
            rec("1", NotificationType::Follow, "A", None, 10),
            rec("2", NotificationType::Follow, "A", None, 12),
            rec("3", NotificationType::Comment, "A", Some("p"), 12),
            rec("4", NotificationType::Comment, "B", Some("p"), 12),
            rec("5", NotificationType::Comment, "A", Some("p"), 9),
            rec("6", NotificationType::Repost, "C", Some("q"), 1),
            rec("7", NotificationType::Repost, "C", Some("q"), 1),
        ];
        let once = dedup(input);
        let twice = dedup(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_missing_actor_groups_as_unknown() {
        let mut a = NotificationRecord::new("me", NotificationType::Unknown, 1);
        a.id = Some("a".into());
        let mut b = NotificationRecord::new("me", NotificationType::Unknown, 2);
        b.id = Some("b".into());
        let out = dedup(vec![a, b]);
        assert_eq!(ids(&out), vec!["b"]);
    }
}
