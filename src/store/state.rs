use std::collections::HashSet;

use serde::Serialize;

use crate::error::NotificationError;
use crate::listener::ListenerState;
use crate::notifications::{dedup, NotificationRecord};

/// Which records the published list shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationFilter {
    #[default]
    All,
    Unread,
}

impl NotificationFilter {
    pub fn matches(&self, record: &NotificationRecord) -> bool {
        match self {
            NotificationFilter::All => true,
            NotificationFilter::Unread => !record.read,
        }
    }
}

/// Read-only state published to observers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsSnapshot {
    /// Newest first, after `filter`.
    pub notifications: Vec<NotificationRecord>,
    /// Unread records in the whole in-memory set, regardless of `filter`.
    pub unread_count: usize,
    pub is_loading: bool,
    pub last_error: Option<NotificationError>,
    pub listener_state: ListenerState,
    pub filter: NotificationFilter,
}

/// The store's in-memory notification list. Always deduplicated, newest first
/// and at most `max_records` long.
#[derive(Debug, Clone)]
pub struct NotificationList {
    records: Vec<NotificationRecord>,
    max_records: usize,
}

impl NotificationList {
    pub fn new(max_records: usize) -> Self {
        Self {
            records: Vec::new(),
            max_records: max_records.max(1),
        }
    }

    /// Replace the contents with a delivered result set.
    pub fn replace(&mut self, records: Vec<NotificationRecord>) {
        let mut records = dedup(records);
        records.truncate(self.max_records);
        self.records = records;
    }

    pub fn records(&self) -> &[NotificationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.records.iter().filter(|r| !r.read).count()
    }

    /// Ids of unread records, in list order.
    pub fn unread_ids(&self) -> Vec<String> {
        self.ids_where(|r| !r.read)
    }

    /// Ids of read records, in list order.
    pub fn read_ids(&self) -> Vec<String> {
        self.ids_where(|r| r.read)
    }

    /// Returns whether a record was changed.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self
            .records
            .iter_mut()
            .find(|r| r.id.as_deref() == Some(id))
        {
            Some(record) if !record.read => {
                record.read = true;
                true
            }
            _ => false,
        }
    }

    pub fn mark_read_many(&mut self, ids: &[String]) -> usize {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut changed = 0;
        for record in &mut self.records {
            if !record.read && record.id.as_deref().is_some_and(|id| ids.contains(id)) {
                record.read = true;
                changed += 1;
            }
        }
        changed
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.id.as_deref() != Some(id));
        self.records.len() != before
    }

    pub fn remove_many(&mut self, ids: &[String]) -> usize {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let before = self.records.len();
        self.records
            .retain(|r| !r.id.as_deref().is_some_and(|id| ids.contains(id)));
        before - self.records.len()
    }

    pub fn view(&self, filter: NotificationFilter) -> Vec<NotificationRecord> {
        self.records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    fn ids_where(&self, predicate: impl Fn(&NotificationRecord) -> bool) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| predicate(r))
            .filter_map(|r| r.id.clone())
            .collect()
    }
}
