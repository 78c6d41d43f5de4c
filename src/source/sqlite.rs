//! SQLite-backed event source.
//!
//! Subscriptions are tokio tasks that re-run the scoped query when this source
//! writes (woken through a `Notify`) or when another connection commits
//! (detected by polling `PRAGMA data_version`). A snapshot is pushed only when
//! the result set actually changed.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::{mpsc, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::schema::{NOTIFICATIONS_SCHEMA_SQL, NOTIFICATION_COLUMNS};
use super::{check_batch_size, diff_snapshots, EventSource, SnapshotBatch, Subscription, SubscriptionEvent};
use crate::error::BackendError;
use crate::notifications::{ActorRef, NotificationRecord, NotificationType};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// SQLite implementation of EventSource.
pub struct SqliteEventSource {
    conn: Arc<Mutex<Connection>>,
    /// Bumped after every local write.
    writes: Arc<AtomicU64>,
    changed: Arc<Notify>,
    poll_interval: Duration,
}

impl SqliteEventSource {
    /// Open or create a notifications database.
    pub fn open(path: &Path, poll_interval: Duration) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open notifications database: {:?}", path))?;
        Self::with_connection(conn, poll_interval)
    }

    /// Create an in-memory database (for testing).
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, Duration::from_millis(50))
    }

    fn with_connection(conn: Connection, poll_interval: Duration) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(NOTIFICATIONS_SCHEMA_SQL)
            .context("Failed to apply notifications schema")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            writes: Arc::new(AtomicU64::new(0)),
            changed: Arc::new(Notify::new()),
            poll_interval,
        })
    }

    /// Insert or replace a record, assigning an id when missing.
    pub fn upsert(&self, record: &NotificationRecord) -> Result<String, BackendError> {
        let id = {
            let conn = self.conn.lock().unwrap();
            Self::write_record(&conn, record)?
        };
        self.mark_written();
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<Option<NotificationRecord>, BackendError> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                &format!("SELECT {} FROM notifications WHERE id = ?1", NOTIFICATION_COLUMNS),
                params![id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn mark_written(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    fn write_record(conn: &Connection, record: &NotificationRecord) -> Result<String, BackendError> {
        let id = record
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let actors = match &record.actors {
            Some(actors) => Some(
                serde_json::to_string(actors)
                    .map_err(|e| BackendError::invalid_argument(e.to_string()))?,
            ),
            None => None,
        };

        conn.execute(
            r#"
            INSERT OR REPLACE INTO notifications (
                id, recipient_id, type, actor_id, actor_display_name, actor_handle,
                actor_image_ref, subject_id, body, read, created_at, updated_at,
                actors, actor_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                id,
                record.recipient_id,
                record.notification_type.as_str(),
                record.actor_id,
                record.actor_display_name,
                record.actor_handle,
                record.actor_image_ref,
                record.subject_id,
                record.body,
                record.read as i32,
                record.created_at,
                record.updated_at,
                actors,
                record.actor_count,
            ],
        )?;
        Ok(id)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<NotificationRecord> {
        // Malformed aggregation data degrades to "not aggregated".
        let actors: Option<Vec<ActorRef>> = row
            .get::<_, Option<String>>("actors")?
            .and_then(|s| serde_json::from_str(&s).ok());

        Ok(NotificationRecord {
            id: row.get("id")?,
            recipient_id: row.get("recipient_id")?,
            notification_type: NotificationType::parse(&row.get::<_, String>("type")?),
            actor_id: row.get("actor_id")?,
            actor_display_name: row.get("actor_display_name")?,
            actor_handle: row.get("actor_handle")?,
            actor_image_ref: row.get("actor_image_ref")?,
            subject_id: row.get("subject_id")?,
            body: row.get("body")?,
            read: row.get::<_, i32>("read")? != 0,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            actors,
            actor_count: row.get("actor_count")?,
        })
    }

    fn query(conn: &Connection, recipient_id: &str, limit: usize) -> rusqlite::Result<Vec<NotificationRecord>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM notifications WHERE recipient_id = ?1 \
             ORDER BY created_at DESC, id ASC LIMIT ?2",
            NOTIFICATION_COLUMNS
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = stmt
            .query_map(params![recipient_id, limit], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn data_version(conn: &Connection) -> rusqlite::Result<i64> {
        conn.query_row("PRAGMA data_version", [], |row| row.get(0))
    }
}

/// Poll loop behind one subscription.
struct SubscriptionTask {
    conn: Arc<Mutex<Connection>>,
    writes: Arc<AtomicU64>,
    changed: Arc<Notify>,
    poll_interval: Duration,
    recipient_id: String,
    limit: usize,
}

impl SubscriptionTask {
    /// `seen` is the (local writes, data_version) pair the initial snapshot was
    /// read at.
    async fn run(
        self,
        mut last_delivered: Vec<NotificationRecord>,
        mut seen: (u64, i64),
        tx: mpsc::Sender<SubscriptionEvent>,
    ) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                _ = self.changed.notified() => {}
                _ = ticker.tick() => {}
            }

            let (marker, current) = match self.poll(seen) {
                Ok(Some(found)) => found,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Subscription query for {} failed: {}", self.recipient_id, e);
                    let _ = tx.send(SubscriptionEvent::Error(e.into())).await;
                    break;
                }
            };
            seen = marker;

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

        debug!("Subscription for {} released", self.recipient_id);
    }

    /// Re-run the query unless nothing was written since `seen`.
    #[allow(clippy::type_complexity)]
    fn poll(&self, seen: (u64, i64)) -> rusqlite::Result<Option<((u64, i64), Vec<NotificationRecord>)>> {
        let conn = self.conn.lock().unwrap();
        let marker = (
            self.writes.load(Ordering::SeqCst),
            SqliteEventSource::data_version(&conn)?,
        );
        if marker == seen {
            return Ok(None);
        }
        let records = SqliteEventSource::query(&conn, &self.recipient_id, self.limit)?;
        Ok(Some((marker, records)))
    }
}

#[async_trait]
impl EventSource for SqliteEventSource {
    async fn query_recent(
        &self,
        recipient_id: &str,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, BackendError> {
        let conn = self.conn.lock().unwrap();
        Ok(Self::query(&conn, recipient_id, limit)?)
    }

    async fn subscribe(&self, recipient_id: &str, limit: usize) -> Result<Subscription, BackendError> {
        let (initial, seen) = {
            let conn = self.conn.lock().unwrap();
            let version = Self::data_version(&conn)?;
            let marker = (self.writes.load(Ordering::SeqCst), version);
            (Self::query(&conn, recipient_id, limit)?, marker)
        };

        let (tx, subscription) = Subscription::channel();
        let batch = SnapshotBatch {
            changes: diff_snapshots(&[], &initial),
            records: initial.clone(),
        };
        // The channel is fresh, so the first send cannot be full.
        let _ = tx.try_send(SubscriptionEvent::Snapshot(batch));

        let task = SubscriptionTask {
            conn: self.conn.clone(),
            writes: self.writes.clone(),
            changed: self.changed.clone(),
            poll_interval: self.poll_interval,
            recipient_id: recipient_id.to_string(),
            limit,
        };
        tokio::spawn(task.run(initial, seen, tx));

        debug!("Opened subscription for {} (limit {})", recipient_id, limit);
        Ok(subscription)
    }

    async fn set_read(&self, recipient_id: &str, id: &str) -> Result<(), BackendError> {
        let updated = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "UPDATE notifications SET read = 1 WHERE id = ?1 AND recipient_id = ?2",
                params![id, recipient_id],
            )?
        };
        if updated == 0 {
            return Err(BackendError::not_found(format!("notification {} not found", id)));
        }
        self.mark_written();
        Ok(())
    }

    async fn delete(&self, recipient_id: &str, id: &str) -> Result<(), BackendError> {
        let deleted = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "DELETE FROM notifications WHERE id = ?1 AND recipient_id = ?2",
                params![id, recipient_id],
            )?
        };
        if deleted > 0 {
            self.mark_written();
        }
        Ok(())
    }

    async fn batch_set_read(&self, recipient_id: &str, ids: &[String]) -> Result<(), BackendError> {
        check_batch_size(ids.len())?;
        {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;
            for id in ids {
                let updated = tx.execute(
                    "UPDATE notifications SET read = 1 WHERE id = ?1 AND recipient_id = ?2",
                    params![id, recipient_id],
                )?;
                if updated == 0 {
                    // Dropping the transaction rolls back the whole batch.
                    return Err(BackendError::not_found(format!("notification {} not found", id)));
                }
            }
            tx.commit()?;
        }
        self.mark_written();
        Ok(())
    }

    async fn batch_delete(&self, recipient_id: &str, ids: &[String]) -> Result<(), BackendError> {
        check_batch_size(ids.len())?;
        {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;
            for id in ids {
                tx.execute(
                    "DELETE FROM notifications WHERE id = ?1 AND recipient_id = ?2",
                    params![id, recipient_id],
                )?;
            }
            tx.commit()?;
        }
        self.mark_written();
        Ok(())
    }

    async fn batch_create(&self, records: &[NotificationRecord]) -> Result<Vec<String>, BackendError> {
        check_batch_size(records.len())?;
        let ids = {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;
            let mut ids = Vec::with_capacity(records.len());
            for record in records {
                let mut record = record.clone();
                record.id = Some(uuid::Uuid::new_v4().to_string());
                ids.push(Self::write_record(&tx, &record)?);
            }
            tx.commit()?;
            ids
        };
        self.mark_written();
        Ok(ids)
    }
}
