//! Event source abstraction: the remote store notifications are read from,
//! subscribed to and mutated through.

mod memory;
mod schema;
mod sqlite;

pub use memory::InMemoryEventSource;
pub use sqlite::{SqliteEventSource, DEFAULT_POLL_INTERVAL};

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::batch::MAX_BATCH_OPERATIONS;
use crate::error::BackendError;
use crate::notifications::NotificationRecord;

/// Queue depth between a subscription producer and its consumer.
pub const SUBSCRIPTION_BUFFER: usize = 32;

/// How a record changed between two deliveries of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordChange {
    pub id: String,
    pub kind: ChangeKind,
}

/// One delivery: the full current result set plus what changed since the
/// previous delivery on the same subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotBatch {
    pub records: Vec<NotificationRecord>,
    pub changes: Vec<RecordChange>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Snapshot(SnapshotBatch),
    /// Terminal: nothing follows an error on the same subscription.
    Error(BackendError),
}

/// Live query handle. Dropping it releases the backend listener.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<SubscriptionEvent>,
}

impl Subscription {
    /// Create a subscription and the sender its producer pushes through.
    pub fn channel() -> (mpsc::Sender<SubscriptionEvent>, Self) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        (tx, Self { receiver: rx })
    }

    /// Next event; `None` when the producer went away.
    pub async fn recv(&mut self) -> Option<SubscriptionEvent> {
        self.receiver.recv().await
    }
}

/// Remote store of notification records.
///
/// Every read and mutation is scoped to a recipient. Bulk calls are atomic and
/// accept at most [`MAX_BATCH_OPERATIONS`] items.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Records for `recipient_id`, newest `created_at` first, at most `limit`.
    async fn query_recent(
        &self,
        recipient_id: &str,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, BackendError>;

    /// Open a live query with the same shape as [`query_recent`](Self::query_recent).
    /// The current result set is delivered first.
    async fn subscribe(&self, recipient_id: &str, limit: usize) -> Result<Subscription, BackendError>;

    /// Fails with `NotFound` when the record does not exist for the recipient.
    async fn set_read(&self, recipient_id: &str, id: &str) -> Result<(), BackendError>;

    /// Deleting a missing record succeeds.
    async fn delete(&self, recipient_id: &str, id: &str) -> Result<(), BackendError>;

    async fn batch_set_read(&self, recipient_id: &str, ids: &[String]) -> Result<(), BackendError>;

    async fn batch_delete(&self, recipient_id: &str, ids: &[String]) -> Result<(), BackendError>;

    /// Persist new records, returning their assigned ids in input order.
    async fn batch_create(&self, records: &[NotificationRecord]) -> Result<Vec<String>, BackendError>;
}

/// Reject bulk calls over the operation ceiling.
pub fn check_batch_size(len: usize) -> Result<(), BackendError> {
    if len > MAX_BATCH_OPERATIONS {
        return Err(BackendError::invalid_argument(format!(
            "batch of {} operations exceeds the limit of {}",
            len, MAX_BATCH_OPERATIONS
        )));
    }
    Ok(())
}

/// Compute the changes turning `previous` into `next`, keyed by record id.
/// Records without an id are ignored.
pub fn diff_snapshots(previous: &[NotificationRecord], next: &[NotificationRecord]) -> Vec<RecordChange> {
    let before: HashMap<&str, &NotificationRecord> = previous
        .iter()
        .filter_map(|r| r.id.as_deref().map(|id| (id, r)))
        .collect();
    let mut changes = Vec::new();
    let mut present = std::collections::HashSet::new();

    for record in next {
        let Some(id) = record.id.as_deref() else {
            continue;
        };
        present.insert(id);
        match before.get(id) {
            None => changes.push(RecordChange {
                id: id.to_string(),
                kind: ChangeKind::Added,
            }),
            Some(old) if *old != record => changes.push(RecordChange {
                id: id.to_string(),
                kind: ChangeKind::Modified,
            }),
            Some(_) => {}
        }
    }

    for record in previous {
        if let Some(id) = record.id.as_deref() {
            if !present.contains(id) {
                changes.push(RecordChange {
                    id: id.to_string(),
                    kind: ChangeKind::Removed,
                });
            }
        }
    }

    changes
}
