//! Test engine lifecycle management
//!
//! Each test gets an isolated in-memory event source and a store actor bound
//! to it.

use super::constants::*;
use notification_engine::config::EngineSettings;
use notification_engine::{
    InMemoryEventSource, NotificationRecord, NotificationStore, NotificationsSnapshot,
    StaticIdentity,
};
use std::sync::Arc;
use std::time::Duration;

pub struct TestEngine {
    pub source: Arc<InMemoryEventSource>,
    pub identity: Arc<StaticIdentity>,
    pub store: NotificationStore,
}

impl TestEngine {
    /// Engine with default settings, signed in as [`TEST_USER`].
    pub fn spawn() -> Self {
        Self::spawn_with(EngineSettings::default())
    }

    pub fn spawn_with(settings: EngineSettings) -> Self {
        Self::build(settings, StaticIdentity::signed_in(TEST_USER))
    }

    pub fn signed_out() -> Self {
        Self::build(EngineSettings::default(), StaticIdentity::signed_out())
    }

    fn build(settings: EngineSettings, identity: StaticIdentity) -> Self {
        let source = Arc::new(InMemoryEventSource::new());
        let identity = Arc::new(identity);
        let store = NotificationStore::spawn(source.clone(), identity.clone(), &settings);
        Self {
            source,
            identity,
            store,
        }
    }

    /// Seed records into the source, returning their ids.
    pub fn seed(&self, records: Vec<NotificationRecord>) -> Vec<String> {
        records.into_iter().map(|r| self.source.upsert(r)).collect()
    }

    /// Seed and load through a refresh so the store holds them.
    pub async fn seed_and_refresh(&self, records: Vec<NotificationRecord>) -> Vec<String> {
        let ids = self.seed(records);
        self.store.refresh().await.expect("refresh failed");
        ids
    }

    /// Wait until a published snapshot satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&NotificationsSnapshot) -> bool,
    ) -> NotificationsSnapshot {
        let mut updates = self.store.subscribe();
        let result = tokio::time::timeout(
            Duration::from_secs(WAIT_TIMEOUT_SECS),
            updates.wait_for(predicate),
        )
        .await
        .expect("timed out waiting for snapshot");
        let snapshot = result.expect("store stopped while waiting");
        snapshot.clone()
    }
}
