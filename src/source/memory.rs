//! In-process event source.
//!
//! Keeps records in a map and pushes a fresh snapshot to every live
//! subscription after each write. Writes land in a per-subscriber latest-value
//! slot that a forwarder task drains into the subscription channel, so a slow
//! consumer sees fewer snapshots but never a stale one. Failures can be
//! injected for the subscription, query, point and bulk paths, and every call
//! is logged so tests can assert on backend traffic.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::{check_batch_size, diff_snapshots, EventSource, SnapshotBatch, Subscription, SubscriptionEvent};
use crate::error::BackendError;
use crate::notifications::NotificationRecord;

/// A bulk call as seen by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCall {
    pub operation: &'static str,
    pub ids: Vec<String>,
}

#[derive(Debug, Default)]
struct CallLog {
    subscribe_calls: usize,
    query_calls: usize,
    point_calls: Vec<(&'static str, String)>,
    batch_calls: Vec<BatchCall>,
}

/// Newest state a subscriber has yet to see.
#[derive(Debug, Clone)]
enum Pending {
    Records(Vec<NotificationRecord>),
    Broken(BackendError),
}

struct Subscriber {
    recipient_id: String,
    limit: usize,
    sender: mpsc::Sender<SubscriptionEvent>,
    latest: watch::Sender<Pending>,
}

#[derive(Default)]
struct MemoryState {
    records: HashMap<String, NotificationRecord>,
    subscribers: Vec<Subscriber>,
    subscribe_failures: VecDeque<BackendError>,
    query_failure: Option<BackendError>,
    point_failure: Option<BackendError>,
    /// Successful bulk calls still allowed before the injected error fires.
    batch_failure: Option<(usize, BackendError)>,
    log: CallLog,
}

impl MemoryState {
    fn query(&self, recipient_id: &str, limit: usize) -> Vec<NotificationRecord> {
        let mut records: Vec<NotificationRecord> = self
            .records
            .values()
            .filter(|r| r.recipient_id == recipient_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        records.truncate(limit);
        records
    }

    fn publish(&mut self) {
        let mut subscribers = std::mem::take(&mut self.subscribers);
        subscribers.retain(|s| !s.sender.is_closed());

        for subscriber in &subscribers {
            let current = self.query(&subscriber.recipient_id, subscriber.limit);
            subscriber.latest.send_if_modified(|pending| match pending {
                Pending::Records(records) if *records != current => {
                    *records = current;
                    true
                }
                _ => false,
            });
        }

        self.subscribers = subscribers;
    }

    fn take_batch_failure(&mut self) -> Option<BackendError> {
        match self.batch_failure.take() {
            Some((0, err)) => Some(err),
            Some((remaining, err)) => {
                self.batch_failure = Some((remaining - 1, err));
                None
            }
            None => None,
        }
    }

    fn owned_ids<'a>(&self, recipient_id: &str, ids: &'a [String]) -> Vec<&'a String> {
        ids.iter()
            .filter(|id| {
                self.records
                    .get(id.as_str())
                    .is_some_and(|r| r.recipient_id == recipient_id)
            })
            .collect()
    }
}

/// Move the newest pending state into the subscription, waiting for channel
/// capacity. States overwritten while waiting are skipped.
async fn forward(
    recipient_id: String,
    mut last_delivered: Vec<NotificationRecord>,
    mut pending: watch::Receiver<Pending>,
    tx: mpsc::Sender<SubscriptionEvent>,
) {
    loop {
        tokio::select! {
            _ = tx.closed() => break,
            changed = pending.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let next = pending.borrow_and_update().clone();
        match next {
            Pending::Records(current) => {
                if current == last_delivered {
                    continue;
                }
                let batch = SnapshotBatch {
                    changes: diff_snapshots(&last_delivered, &current),
                    records: current.clone(),
                };
                if tx.send(SubscriptionEvent::Snapshot(batch)).await.is_err() {
                    break;
                }
                last_delivered = current;
            }
            Pending::Broken(err) => {
                let _ = tx.send(SubscriptionEvent::Error(err)).await;
                break;
            }
        }
    }

    debug!("Subscription for {} released", recipient_id);
}

/// Event source held entirely in memory.
#[derive(Default)]
pub struct InMemoryEventSource {
    state: Mutex<MemoryState>,
}

impl InMemoryEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record, assigning an id when missing. Pushes to
    /// live subscriptions like any other write.
    pub fn upsert(&self, mut record: NotificationRecord) -> String {
        let id = record
            .id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();
        let mut state = self.state.lock().unwrap();
        state.records.insert(id.clone(), record);
        state.publish();
        id
    }

    pub fn get(&self, id: &str) -> Option<NotificationRecord> {
        self.state.lock().unwrap().records.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records addressed to `recipient_id`, newest first.
    pub fn records_for(&self, recipient_id: &str) -> Vec<NotificationRecord> {
        self.state.lock().unwrap().query(recipient_id, usize::MAX)
    }

    /// The next `count` subscribe attempts deliver `err` as their first event.
    pub fn fail_next_subscribes(&self, count: usize, err: BackendError) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..count {
            state.subscribe_failures.push_back(err.clone());
        }
    }

    /// Push a terminal error into every live subscription.
    pub fn break_subscriptions(&self, err: BackendError) {
        let mut state = self.state.lock().unwrap();
        for subscriber in state.subscribers.drain(..) {
            subscriber.latest.send_replace(Pending::Broken(err.clone()));
        }
    }

    pub fn fail_next_query(&self, err: BackendError) {
        self.state.lock().unwrap().query_failure = Some(err);
    }

    pub fn fail_next_point_mutation(&self, err: BackendError) {
        self.state.lock().unwrap().point_failure = Some(err);
    }

    /// Let `successes` bulk calls through, then fail the next one with `err`.
    pub fn fail_batch_after(&self, successes: usize, err: BackendError) {
        self.state.lock().unwrap().batch_failure = Some((successes, err));
    }

    pub fn subscribe_calls(&self) -> usize {
        self.state.lock().unwrap().log.subscribe_calls
    }

    pub fn query_calls(&self) -> usize {
        self.state.lock().unwrap().log.query_calls
    }

    pub fn point_calls(&self) -> Vec<(&'static str, String)> {
        self.state.lock().unwrap().log.point_calls.clone()
    }

    pub fn batch_calls(&self) -> Vec<BatchCall> {
        self.state.lock().unwrap().log.batch_calls.clone()
    }

    /// Total backend calls other than subscribe.
    pub fn mutation_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.log.point_calls.len() + state.log.batch_calls.len()
    }

    /// Subscriptions whose consumer is still holding the handle.
    pub fn active_subscriptions(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .subscribers
            .iter()
            .filter(|s| !s.sender.is_closed())
            .count()
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn query_recent(
        &self,
        recipient_id: &str,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.log.query_calls += 1;
        if let Some(err) = state.query_failure.take() {
            return Err(err);
        }
        Ok(state.query(recipient_id, limit))
    }

    async fn subscribe(&self, recipient_id: &str, limit: usize) -> Result<Subscription, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.log.subscribe_calls += 1;
        let (tx, subscription) = Subscription::channel();

        if let Some(err) = state.subscribe_failures.pop_front() {
            debug!("Injected subscribe failure for {}: {}", recipient_id, err);
            let _ = tx.try_send(SubscriptionEvent::Error(err));
            return Ok(subscription);
        }

        let current = state.query(recipient_id, limit);
        let initial = SnapshotBatch {
            changes: diff_snapshots(&[], &current),
            records: current.clone(),
        };
        // The channel is fresh, so the first send cannot be full.
        let _ = tx.try_send(SubscriptionEvent::Snapshot(initial));

        let (latest, pending) = watch::channel(Pending::Records(current.clone()));
        tokio::spawn(forward(recipient_id.to_string(), current, pending, tx.clone()));
        state.subscribers.push(Subscriber {
            recipient_id: recipient_id.to_string(),
            limit,
            sender: tx,
            latest,
        });
        Ok(subscription)
    }

    async fn set_read(&self, recipient_id: &str, id: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.log.point_calls.push(("set_read", id.to_string()));
        if let Some(err) = state.point_failure.take() {
            return Err(err);
        }
        match state.records.get_mut(id) {
            Some(record) if record.recipient_id == recipient_id => record.read = true,
            _ => return Err(BackendError::not_found(format!("notification {} not found", id))),
        }
        state.publish();
        Ok(())
    }

    async fn delete(&self, recipient_id: &str, id: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.log.point_calls.push(("delete", id.to_string()));
        if let Some(err) = state.point_failure.take() {
            return Err(err);
        }
        if state
            .records
            .get(id)
            .is_some_and(|r| r.recipient_id == recipient_id)
        {
            state.records.remove(id);
            state.publish();
        }
        Ok(())
    }

    async fn batch_set_read(&self, recipient_id: &str, ids: &[String]) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.log.batch_calls.push(BatchCall {
            operation: "set_read",
            ids: ids.to_vec(),
        });
        check_batch_size(ids.len())?;
        if let Some(err) = state.take_batch_failure() {
            return Err(err);
        }
        let owned: Vec<String> = state.owned_ids(recipient_id, ids).into_iter().cloned().collect();
        if owned.len() != ids.len() {
            return Err(BackendError::not_found("one or more notifications not found"));
        }
        for id in &owned {
            if let Some(record) = state.records.get_mut(id) {
                record.read = true;
            }
        }
        state.publish();
        Ok(())
    }

    async fn batch_delete(&self, recipient_id: &str, ids: &[String]) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.log.batch_calls.push(BatchCall {
            operation: "delete",
            ids: ids.to_vec(),
        });
        check_batch_size(ids.len())?;
        if let Some(err) = state.take_batch_failure() {
            return Err(err);
        }
        let owned: Vec<String> = state.owned_ids(recipient_id, ids).into_iter().cloned().collect();
        for id in &owned {
            state.records.remove(id);
        }
        state.publish();
        Ok(())
    }

    async fn batch_create(&self, records: &[NotificationRecord]) -> Result<Vec<String>, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.log.batch_calls.push(BatchCall {
            operation: "create",
            ids: records.iter().map(|r| r.recipient_id.clone()).collect(),
        });
        check_batch_size(records.len())?;
        if let Some(err) = state.take_batch_failure() {
            return Err(err);
        }
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let id = uuid::Uuid::new_v4().to_string();
            let mut record = record.clone();
            record.id = Some(id.clone());
            state.records.insert(id.clone(), record);
            ids.push(id);
        }
        state.publish();
        Ok(ids)
    }
}
