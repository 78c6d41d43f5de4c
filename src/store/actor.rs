use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::commands::{Completion, Reply, StoreCommand};
use super::fanout::build_fanout_records;
use super::state::{NotificationFilter, NotificationList, NotificationsSnapshot};
use crate::batch::BatchExecutor;
use crate::config::EngineSettings;
use crate::error::{BatchError, NotificationError};
use crate::identity::IdentityProvider;
use crate::listener::{ListenerAction, ListenerManager};
use crate::metrics;
use crate::notifications::{FanoutPayload, FanoutReport, NotificationRecord};
use crate::source::EventSource;

/// Task owning all notification state. Every command and every backend
/// completion is handled here, one at a time.
pub(crate) struct StoreActor {
    source: Arc<dyn EventSource>,
    identity: Arc<dyn IdentityProvider>,
    listener: ListenerManager,
    list: NotificationList,
    executor: BatchExecutor,
    max_records: usize,
    filter: NotificationFilter,
    /// Set once any result set has been applied.
    delivered: bool,
    is_loading: bool,
    last_error: Option<NotificationError>,

    command_receiver: mpsc::Receiver<StoreCommand>,
    completion_sender: mpsc::UnboundedSender<Completion>,
    completion_receiver: mpsc::UnboundedReceiver<Completion>,
    snapshot_sender: watch::Sender<NotificationsSnapshot>,
    shutdown_token: CancellationToken,
}

impl StoreActor {
    pub(crate) fn new(
        source: Arc<dyn EventSource>,
        identity: Arc<dyn IdentityProvider>,
        settings: &EngineSettings,
        command_receiver: mpsc::Receiver<StoreCommand>,
        snapshot_sender: watch::Sender<NotificationsSnapshot>,
        shutdown_token: CancellationToken,
    ) -> Self {
        let (completion_sender, completion_receiver) = mpsc::unbounded_channel();
        Self {
            listener: ListenerManager::new(settings.retry_policy(), identity.clone()),
            source,
            identity,
            list: NotificationList::new(settings.max_records),
            executor: BatchExecutor::new(settings.batch_chunk_size),
            max_records: settings.max_records,
            filter: NotificationFilter::All,
            delivered: false,
            is_loading: false,
            last_error: None,
            command_receiver,
            completion_sender,
            completion_receiver,
            snapshot_sender,
            shutdown_token,
        }
    }

    /// Main actor loop.
    pub(crate) async fn run(mut self) {
        info!(
            "Starting notification store (max {} records, chunk size {})",
            self.max_records,
            self.executor.chunk_size()
        );

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    info!("Notification store received shutdown signal");
                    break;
                }
                cmd = self.command_receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        debug!("All notification store handles dropped");
                        break;
                    }
                },
                Some(done) = self.completion_receiver.recv() => {
                    self.handle_completion(done);
                }
                signal = self.listener.next_signal() => {
                    let action = self.listener.on_signal(signal);
                    self.apply_listener_action(action);
                }
            }
        }

        self.listener.stop();
        self.is_loading = false;
        self.publish();
        info!("Notification store stopped");
    }

    fn handle_command(&mut self, cmd: StoreCommand) {
        match cmd {
            StoreCommand::Start { response } => match self.listener.start() {
                Ok(action) => {
                    if matches!(action, ListenerAction::Open { .. }) && !self.delivered {
                        self.is_loading = true;
                    }
                    self.apply_listener_action(action);
                    let _ = response.send(Ok(()));
                }
                Err(err) => {
                    let _ = response.send(Err(err));
                }
            },
            StoreCommand::Stop { response } => {
                self.listener.stop();
                self.is_loading = false;
                self.publish();
                let _ = response.send(Ok(()));
            }
            StoreCommand::Refresh { response } => self.refresh(response),
            StoreCommand::MarkRead { id, response } => self.mark_read(id, response),
            StoreCommand::MarkAllRead { response } => self.mark_all_read(response),
            StoreCommand::Delete { id, response } => self.delete(id, response),
            StoreCommand::DeleteAllRead { response } => self.delete_all_read(response),
            StoreCommand::SendFanout {
                targets,
                payload,
                response,
            } => self.send_fanout(targets, payload, response),
            StoreCommand::SetFilter { filter, response } => {
                if self.filter != filter {
                    debug!("Notification filter set to {:?}", filter);
                    self.filter = filter;
                    self.publish();
                }
                let _ = response.send(Ok(()));
            }
        }
    }

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::Opened { generation, result } => {
                let action = self
                    .listener
                    .on_opened(generation, result.map_err(NotificationError::from));
                self.apply_listener_action(action);
            }
            Completion::Refreshed { result, response } => match result {
                Ok(records) => {
                    debug!("Refresh returned {} records", records.len());
                    self.listener.reset_attempts();
                    self.apply_records(records);
                    self.publish();
                    let _ = response.send(Ok(()));
                }
                Err(err) => {
                    let err = NotificationError::from(err);
                    warn!("Refresh failed: {}", err);
                    self.last_error = Some(err.clone());
                    self.publish();
                    let _ = response.send(Err(err));
                }
            },
            Completion::MarkedRead { result, response } => {
                if let Err(err) = &result {
                    warn!("Failed to mark notification read: {}", err);
                }
                let _ = response.send(result.map_err(NotificationError::from));
            }
            Completion::MarkedAllRead {
                ids,
                outcome,
                response,
            } => {
                let changed = self.list.mark_read_many(&ids[..outcome.succeeded]);
                debug!("Marked {} of {} notifications read", changed, ids.len());
                self.publish();
                let _ = response.send(outcome.into_batch_result());
            }
            Completion::Deleted {
                id,
                result,
                response,
            } => {
                match &result {
                    Ok(()) => {
                        if self.list.remove(&id) {
                            self.publish();
                        }
                    }
                    Err(err) => warn!("Failed to delete notification {}: {}", id, err),
                }
                let _ = response.send(result.map_err(NotificationError::from));
            }
            Completion::DeletedAllRead {
                ids,
                outcome,
                response,
            } => {
                let removed = self.list.remove_many(&ids[..outcome.succeeded]);
                debug!("Deleted {} of {} read notifications", removed, ids.len());
                self.publish();
                let _ = response.send(outcome.into_batch_result());
            }
            Completion::FanoutSent {
                report,
                outcome,
                response,
            } => {
                let result = outcome.into_batch_result().map(|delivered| {
                    info!("Fan-out delivered {} notifications", delivered);
                    FanoutReport {
                        delivered,
                        ..report
                    }
                });
                let _ = response.send(result);
            }
        }
    }

    fn apply_listener_action(&mut self, action: ListenerAction) {
        match action {
            ListenerAction::None | ListenerAction::RetryScheduled { .. } => {}
            ListenerAction::Open {
                generation,
                recipient_id,
            } => {
                let source = self.source.clone();
                let limit = self.max_records;
                self.spawn_task(async move {
                    let result = source.subscribe(&recipient_id, limit).await;
                    Completion::Opened { generation, result }
                });
            }
            ListenerAction::Publish(batch) => self.apply_records(batch.records),
            ListenerAction::Failed(err) => {
                self.last_error = Some(err);
                self.is_loading = false;
            }
        }
        self.publish();
    }

    fn refresh(&mut self, response: Reply<()>) {
        let Some(recipient_id) = self.identity.current_user_id() else {
            let _ = response.send(Err(NotificationError::Unauthenticated));
            return;
        };

        let source = self.source.clone();
        let limit = self.max_records;
        self.spawn_task(async move {
            let result = source.query_recent(&recipient_id, limit).await;
            Completion::Refreshed { result, response }
        });
    }

    fn mark_read(&mut self, id: String, response: Reply<()>) {
        let recipient_id = match self.require_identity(&id) {
            Ok(recipient_id) => recipient_id,
            Err(err) => {
                let _ = response.send(Err(err));
                return;
            }
        };

        // Optimistic: applied before the backend confirms and never reverted.
        if self.list.mark_read(&id) {
            self.publish();
        }

        let source = self.source.clone();
        self.spawn_task(async move {
            let result = source.set_read(&recipient_id, &id).await;
            Completion::MarkedRead { result, response }
        });
    }

    fn mark_all_read(&mut self, response: Reply<usize, BatchError>) {
        let ids = self.list.unread_ids();
        if ids.is_empty() {
            debug!("No unread notifications to mark read");
            let _ = response.send(Ok(0));
            return;
        }
        let Some(recipient_id) = self.identity.current_user_id() else {
            let _ = response.send(Err(NotificationError::Unauthenticated.into()));
            return;
        };

        let source = self.source.clone();
        let executor = self.executor;
        self.spawn_task(async move {
            let outcome = executor
                .run("set_read", &ids, |chunk| {
                    let source = source.clone();
                    let recipient_id = recipient_id.clone();
                    async move { source.batch_set_read(&recipient_id, &chunk).await }
                })
                .await;
            Completion::MarkedAllRead {
                ids,
                outcome,
                response,
            }
        });
    }

    fn delete(&mut self, id: String, response: Reply<()>) {
        let recipient_id = match self.require_identity(&id) {
            Ok(recipient_id) => recipient_id,
            Err(err) => {
                let _ = response.send(Err(err));
                return;
            }
        };

        let source = self.source.clone();
        self.spawn_task(async move {
            let result = source.delete(&recipient_id, &id).await;
            Completion::Deleted {
                id,
                result,
                response,
            }
        });
    }

    fn delete_all_read(&mut self, response: Reply<usize, BatchError>) {
        let ids = self.list.read_ids();
        if ids.is_empty() {
            debug!("No read notifications to delete");
            let _ = response.send(Ok(0));
            return;
        }
        let Some(recipient_id) = self.identity.current_user_id() else {
            let _ = response.send(Err(NotificationError::Unauthenticated.into()));
            return;
        };

        let source = self.source.clone();
        let executor = self.executor;
        self.spawn_task(async move {
            let outcome = executor
                .run("delete", &ids, |chunk| {
                    let source = source.clone();
                    let recipient_id = recipient_id.clone();
                    async move { source.batch_delete(&recipient_id, &chunk).await }
                })
                .await;
            Completion::DeletedAllRead {
                ids,
                outcome,
                response,
            }
        });
    }

    fn send_fanout(
        &mut self,
        targets: Vec<String>,
        payload: FanoutPayload,
        response: Reply<FanoutReport, BatchError>,
    ) {
        let Some(actor_id) = self.identity.current_user_id() else {
            let _ = response.send(Err(NotificationError::Unauthenticated.into()));
            return;
        };

        let created_at = chrono::Utc::now().timestamp_millis();
        let (records, report) =
            match build_fanout_records(&actor_id, &targets, &payload, created_at) {
                Ok(built) => built,
                Err(err) => {
                    let _ = response.send(Err(err.into()));
                    return;
                }
            };
        debug!(
            "Fan-out of {} from {} to {} recipients ({} self, {} duplicate skipped)",
            payload.notification_type,
            actor_id,
            records.len(),
            report.skipped_self,
            report.skipped_duplicates
        );

        let source = self.source.clone();
        let executor = self.executor;
        self.spawn_task(async move {
            let outcome = executor
                .run("create", &records, |chunk| {
                    let source = source.clone();
                    async move { source.batch_create(&chunk).await.map(|_| ()) }
                })
                .await;
            Completion::FanoutSent {
                report,
                outcome,
                response,
            }
        });
    }

    /// Validate a point-mutation id and resolve the current user.
    fn require_identity(&self, id: &str) -> Result<String, NotificationError> {
        if id.is_empty() {
            return Err(NotificationError::InvalidInput(
                "notification id must not be empty".to_string(),
            ));
        }
        self.identity
            .current_user_id()
            .ok_or(NotificationError::Unauthenticated)
    }

    fn apply_records(&mut self, records: Vec<NotificationRecord>) {
        self.list.replace(records);
        self.delivered = true;
        self.is_loading = false;
        self.last_error = None;
    }

    fn spawn_task<F>(&self, task: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let completion_sender = self.completion_sender.clone();
        tokio::spawn(async move {
            // The actor may have stopped; the reply is dropped with the completion.
            let _ = completion_sender.send(task.await);
        });
    }

    fn publish(&self) {
        let unread_count = self.list.unread_count();
        metrics::set_unread_notifications(unread_count);
        self.snapshot_sender.send_replace(NotificationsSnapshot {
            notifications: self.list.view(self.filter),
            unread_count,
            is_loading: self.is_loading,
            last_error: self.last_error.clone(),
            listener_state: self.listener.state(),
            filter: self.filter,
        });
    }
}
