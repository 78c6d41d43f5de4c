//! Owns the single live subscription and its reconnection timer.
//!
//! The manager is a plain state machine driven by its owner: it never performs
//! backend I/O itself. `start()` and a fired retry timer return
//! [`ListenerAction::Open`], the owner opens the subscription and hands the
//! result back through [`ListenerManager::on_opened`].

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Sleep;
use tracing::{debug, error, info, warn};

use super::{ListenerState, RetryPolicy};
use crate::error::NotificationError;
use crate::identity::IdentityProvider;
use crate::metrics;
use crate::source::{SnapshotBatch, Subscription, SubscriptionEvent};

/// What the owner must do after a transition.
#[derive(Debug)]
pub enum ListenerAction {
    None,
    /// Open a subscription for `recipient_id` and report back with `generation`.
    Open { generation: u64, recipient_id: String },
    /// A pushed batch to dedup and publish.
    Publish(SnapshotBatch),
    RetryScheduled { attempt: u32, delay: Duration },
    /// Terminal failure to publish.
    Failed(NotificationError),
}

/// Something the manager is waiting on has happened.
#[derive(Debug)]
pub enum ListenerSignal {
    RetryDue,
    /// `None` when the subscription stream ended.
    Event(Option<SubscriptionEvent>),
}

pub struct ListenerManager {
    state: ListenerState,
    attempts: u32,
    /// Bumped on every open and every stop, so late open results can be told apart.
    generation: u64,
    subscription: Option<Subscription>,
    retry_timer: Option<Pin<Box<Sleep>>>,
    policy: RetryPolicy,
    identity: Arc<dyn IdentityProvider>,
}

impl ListenerManager {
    pub fn new(policy: RetryPolicy, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            state: ListenerState::Idle,
            attempts: 0,
            generation: 0,
            subscription: None,
            retry_timer: None,
            policy,
            identity,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Reconnections attempted since the last delivered batch.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn has_subscription(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn has_pending_retry(&self) -> bool {
        self.retry_timer.is_some()
    }

    /// Begin listening. A no-op while already starting, listening or retrying.
    pub fn start(&mut self) -> Result<ListenerAction, NotificationError> {
        if self.state.is_active() {
            debug!("Listener already {}, ignoring start", self.state);
            return Ok(ListenerAction::None);
        }

        let recipient_id = self
            .identity
            .current_user_id()
            .ok_or(NotificationError::Unauthenticated)?;

        self.attempts = 0;
        Ok(self.open(recipient_id))
    }

    /// Release the subscription and cancel any pending retry. Idempotent.
    pub fn stop(&mut self) {
        if self.state == ListenerState::Idle && self.subscription.is_none() {
            debug!("Listener already idle");
            return;
        }

        self.subscription = None;
        self.retry_timer = None;
        self.generation += 1;
        self.transition(ListenerState::Idle);
    }

    pub fn reset_attempts(&mut self) {
        self.attempts = 0;
    }

    /// Result of the open requested with `generation`.
    pub fn on_opened(
        &mut self,
        generation: u64,
        result: Result<Subscription, NotificationError>,
    ) -> ListenerAction {
        if generation != self.generation || self.state != ListenerState::Starting {
            debug!(
                "Discarding stale subscription open (generation {}, current {})",
                generation, self.generation
            );
            return ListenerAction::None;
        }

        match result {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                self.transition(ListenerState::Listening);
                ListenerAction::None
            }
            Err(err) => self.fail(err),
        }
    }

    /// Wait for the retry timer or the next subscription event.
    ///
    /// Pending forever when there is neither. Cancel safe.
    pub async fn next_signal(&mut self) -> ListenerSignal {
        if let Some(timer) = self.retry_timer.as_mut() {
            timer.as_mut().await;
            self.retry_timer = None;
            return ListenerSignal::RetryDue;
        }

        match self.subscription.as_mut() {
            Some(subscription) => ListenerSignal::Event(subscription.recv().await),
            None => std::future::pending().await,
        }
    }

    pub fn on_signal(&mut self, signal: ListenerSignal) -> ListenerAction {
        match signal {
            ListenerSignal::RetryDue => self.reconnect(),
            ListenerSignal::Event(Some(SubscriptionEvent::Snapshot(batch))) => {
                self.attempts = 0;
                metrics::record_push();
                debug!(
                    "Received batch of {} records ({} changes)",
                    batch.records.len(),
                    batch.changes.len()
                );
                ListenerAction::Publish(batch)
            }
            ListenerSignal::Event(Some(SubscriptionEvent::Error(err))) => self.fail(err.into()),
            ListenerSignal::Event(None) => self.fail(NotificationError::Transient(
                "subscription stream ended".to_string(),
            )),
        }
    }

    fn open(&mut self, recipient_id: String) -> ListenerAction {
        self.generation += 1;
        self.transition(ListenerState::Starting);
        ListenerAction::Open {
            generation: self.generation,
            recipient_id,
        }
    }

    fn reconnect(&mut self) -> ListenerAction {
        if self.state != ListenerState::Retrying {
            return ListenerAction::None;
        }

        match self.identity.current_user_id() {
            Some(recipient_id) => {
                info!("Reconnecting subscription (attempt {})", self.attempts);
                self.open(recipient_id)
            }
            None => self.fail(NotificationError::Unauthenticated),
        }
    }

    fn fail(&mut self, err: NotificationError) -> ListenerAction {
        self.subscription = None;

        if self.policy.should_retry(&err, self.attempts) {
            let delay = self.policy.backoff(self.attempts);
            self.attempts += 1;
            self.retry_timer = Some(Box::pin(tokio::time::sleep(delay)));
            self.transition(ListenerState::Retrying);
            metrics::record_retry_scheduled();
            warn!(
                "Subscription failed ({}), retry {}/{} in {:?}",
                err, self.attempts, self.policy.max_retries, delay
            );
            return ListenerAction::RetryScheduled {
                attempt: self.attempts,
                delay,
            };
        }

        self.retry_timer = None;
        self.transition(ListenerState::Failed);
        metrics::record_listener_failure(err.kind().as_str());
        error!("{}", describe_failure(&err, self.attempts));
        ListenerAction::Failed(err)
    }

    fn transition(&mut self, next: ListenerState) {
        if self.state != next {
            info!("Listener {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

/// Terminal log line. Retries are only mentioned for errors that were retried.
fn describe_failure(err: &NotificationError, attempts: u32) -> String {
    if err.is_transient() {
        format!("Subscription failed after {} retries: {}", attempts, err)
    } else {
        format!("Subscription failed ({}): {}", err.kind().as_str(), err)
    }
}
