use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::actor::StoreActor;
use super::commands::{Reply, StoreCommand};
use super::state::{NotificationFilter, NotificationsSnapshot};
use crate::config::EngineSettings;
use crate::error::{BatchError, NotificationError};
use crate::identity::IdentityProvider;
use crate::notifications::{FanoutPayload, FanoutReport};
use crate::source::EventSource;

/// Handle to the notification store actor.
///
/// Cheap to clone. The actor stops when [`shutdown`](Self::shutdown) is called
/// or the last handle is dropped.
#[derive(Clone)]
pub struct NotificationStore {
    command_tx: mpsc::Sender<StoreCommand>,
    snapshots: watch::Receiver<NotificationsSnapshot>,
    shutdown_token: CancellationToken,
}

impl NotificationStore {
    /// Spawn the store actor on the current tokio runtime.
    pub fn spawn(
        source: Arc<dyn EventSource>,
        identity: Arc<dyn IdentityProvider>,
        settings: &EngineSettings,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(settings.command_buffer.max(1));
        let (snapshot_tx, snapshots) = watch::channel(NotificationsSnapshot::default());
        let shutdown_token = CancellationToken::new();

        let actor = StoreActor::new(
            source,
            identity,
            settings,
            command_rx,
            snapshot_tx,
            shutdown_token.clone(),
        );
        tokio::spawn(actor.run());

        Self {
            command_tx,
            snapshots,
            shutdown_token,
        }
    }

    /// Start listening for pushes. A no-op when already listening.
    pub async fn start(&self) -> Result<(), NotificationError> {
        self.request(|response| StoreCommand::Start { response }).await
    }

    /// Stop listening and cancel any pending reconnection.
    pub async fn stop(&self) -> Result<(), NotificationError> {
        self.request(|response| StoreCommand::Stop { response }).await
    }

    /// One point read, published regardless of the listener state.
    pub async fn refresh(&self) -> Result<(), NotificationError> {
        self.request(|response| StoreCommand::Refresh { response }).await
    }

    pub async fn mark_read(&self, id: impl Into<String>) -> Result<(), NotificationError> {
        let id = id.into();
        self.request(|response| StoreCommand::MarkRead { id, response }).await
    }

    /// Mark every unread record read. Returns how many were marked. On a
    /// failed chunk the earlier chunks stay applied and their count is carried
    /// by the error.
    pub async fn mark_all_read(&self) -> Result<usize, BatchError> {
        self.request(|response| StoreCommand::MarkAllRead { response }).await
    }

    pub async fn delete(&self, id: impl Into<String>) -> Result<(), NotificationError> {
        let id = id.into();
        self.request(|response| StoreCommand::Delete { id, response }).await
    }

    /// Delete every read record. Returns how many were deleted.
    pub async fn delete_all_read(&self) -> Result<usize, BatchError> {
        self.request(|response| StoreCommand::DeleteAllRead { response }).await
    }

    /// Write one notification per target on behalf of the current user.
    /// A failed chunk reports how many were written before it.
    pub async fn send_fanout_notifications(
        &self,
        targets: Vec<String>,
        payload: FanoutPayload,
    ) -> Result<FanoutReport, BatchError> {
        self.request(|response| StoreCommand::SendFanout {
            targets,
            payload,
            response,
        })
        .await
    }

    pub async fn set_filter(&self, filter: NotificationFilter) -> Result<(), NotificationError> {
        self.request(|response| StoreCommand::SetFilter { filter, response }).await
    }

    /// Current published state.
    pub fn snapshot(&self) -> NotificationsSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every published change.
    pub fn subscribe(&self) -> watch::Receiver<NotificationsSnapshot> {
        self.snapshots.clone()
    }

    /// Stop the listener and end the actor. Waits until the actor has exited.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        self.command_tx.closed().await;
    }

    async fn request<T, E>(
        &self,
        command: impl FnOnce(Reply<T, E>) -> StoreCommand,
    ) -> Result<T, E>
    where
        E: From<NotificationError>,
    {
        let (response, rx) = oneshot::channel();
        self.command_tx
            .send(command(response))
            .await
            .map_err(|_| E::from(store_shut_down()))?;
        rx.await.map_err(|_| E::from(store_shut_down()))?
    }
}

fn store_shut_down() -> NotificationError {
    NotificationError::Opaque("notification store is shut down".to_string())
}
