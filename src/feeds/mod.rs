//! Subscription-backed feeds
//!
//! A feed owns one store subscription and projects every snapshot into a
//! typed value. The projected value replaces the previous one wholesale and
//! is published through a `watch` channel, so readers always see the latest
//! complete state and never a partial merge.
//!
//! ## Feeds
//!
//! - [`ReadingFeed`]: current sensor reading
//! - [`AlertsFeed`]: most recent alerts, newest first
//! - [`SystemFeed`]: system info with liveness derived per snapshot
//! - [`NotificationFeed`]: latest-notification banner pointer
//! - [`HistoryFeed`]: bounded reading history as chart series
//!
//! A store error moves the feed to [`FeedState::Failed`]; the last good value
//! is dropped rather than presented as current.

mod alerts;
mod history;
mod notification;
mod reading;
mod system;

pub use alerts::{alerts_in_collection_order, AlertsFeed};
pub use history::{ChartSeries, HistoryFeed, ReadingHistory, Trend, TrendDirection};
pub use notification::NotificationFeed;
pub use reading::ReadingFeed;
pub use system::SystemFeed;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::store::{QuerySpec, Snapshot, SnapshotEvent, StorePath, StorePtr, StoreResult};

/// Published state of a feed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum FeedState<T> {
    /// No snapshot received yet
    Loading,
    Ready(T),
    Failed(String),
}

impl<T> FeedState<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            FeedState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, FeedState::Loading)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FeedState::Failed(_))
    }
}

/// What a feed subscribes to and how it projects snapshots
pub trait FeedSpec: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    /// Short name used for logging and topics
    fn name(&self) -> &'static str;

    fn path(&self) -> StorePath;

    fn query(&self) -> QuerySpec {
        QuerySpec::all()
    }

    /// Turn a snapshot into the feed value
    fn project(&self, snapshot: &Snapshot) -> StoreResult<Self::Output>;
}

/// An active feed
pub struct Feed<T> {
    name: &'static str,
    state: watch::Receiver<FeedState<T>>,
    task: Option<JoinHandle<()>>,
}

impl<T: Clone + Send + Sync + 'static> Feed<T> {
    /// Subscribe and start projecting snapshots
    pub async fn activate<S>(store: StorePtr, spec: S) -> StoreResult<Self>
    where
        S: FeedSpec<Output = T>,
    {
        let name = spec.name();
        let mut subscription = store.subscribe(&spec.path(), spec.query()).await?;
        let (tx, rx) = watch::channel(FeedState::Loading);

        let task = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                let next = match event {
                    SnapshotEvent::Value(snapshot) => match spec.project(&snapshot) {
                        Ok(value) => FeedState::Ready(value),
                        Err(e) => {
                            warn!(feed = name, error = %e, "Malformed snapshot");
                            FeedState::Failed(e.to_string())
                        }
                    },
                    SnapshotEvent::Error(e) => {
                        warn!(feed = name, error = %e, "Subscription failed");
                        FeedState::Failed(e.to_string())
                    }
                };
                tx.send_replace(next);
            }
            debug!(feed = name, "Feed subscription ended");
        });

        debug!(feed = name, "Feed activated");
        Ok(Self {
            name,
            state: rx,
            task: Some(task),
        })
    }
}

impl<T: Clone> Feed<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current state
    pub fn state(&self) -> FeedState<T> {
        self.state.borrow().clone()
    }

    /// A receiver that observes every replacement
    pub fn watch(&self) -> watch::Receiver<FeedState<T>> {
        self.state.clone()
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    /// Stop the subscription. Safe to call more than once.
    pub fn deactivate(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(feed = self.name, "Feed deactivated");
        }
    }
}

impl<T> Drop for Feed<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Wait until `rx` leaves `Loading`, returning the state it settled in
pub async fn settled<T: Clone>(rx: &mut watch::Receiver<FeedState<T>>) -> FeedState<T> {
    loop {
        {
            let current = rx.borrow_and_update();
            if !current.is_loading() {
                return current.clone();
            }
        }
        if rx.changed().await.is_err() {
            return rx.borrow().clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct RawFeed;

    impl FeedSpec for RawFeed {
        type Output = Option<Value>;

        fn name(&self) -> &'static str {
            "raw"
        }

        fn path(&self) -> StorePath {
            StorePath::new("raw")
        }

        fn project(&self, snapshot: &Snapshot) -> StoreResult<Self::Output> {
            Ok(snapshot.value.clone())
        }
    }

    async fn next_state<T: Clone>(rx: &mut watch::Receiver<FeedState<T>>) -> FeedState<T> {
        rx.changed().await.unwrap();
        let state = rx.borrow_and_update().clone();
        state
    }

    #[tokio::test]
    async fn test_state_is_replaced_not_merged() {
        let store = MemoryStore::new();
        store.set("raw", json!({"a": 1, "b": 2})).await;

        let feed = Feed::activate(Arc::new(store.clone()), RawFeed).await.unwrap();
        let mut rx = feed.watch();
        assert_eq!(
            settled(&mut rx).await,
            FeedState::Ready(Some(json!({"a": 1, "b": 2})))
        );

        store.set("raw", json!({"c": 3})).await;
        assert_eq!(next_state(&mut rx).await, FeedState::Ready(Some(json!({"c": 3}))));
    }

    #[tokio::test]
    async fn test_error_drops_last_good_value() {
        let store = MemoryStore::new();
        store.set("raw", json!(1)).await;

        let feed = Feed::activate(Arc::new(store.clone()), RawFeed).await.unwrap();
        let mut rx = feed.watch();
        settled(&mut rx).await;

        store
            .fail("raw", StoreError::PermissionDenied("raw".into()))
            .await;
        let state = next_state(&mut rx).await;
        assert!(state.is_failed());
        assert!(state.ready().is_none());
    }

    #[tokio::test]
    async fn test_absent_path_is_ready_not_failed() {
        let store = MemoryStore::new();
        let feed = Feed::activate(Arc::new(store), RawFeed).await.unwrap();
        let mut rx = feed.watch();
        assert_eq!(settled(&mut rx).await, FeedState::Ready(None));
    }

    #[tokio::test]
    async fn test_deactivate_is_idempotent_and_unsubscribes() {
        let store = MemoryStore::new();
        let mut feed = Feed::activate(Arc::new(store.clone()), RawFeed).await.unwrap();
        assert_eq!(store.subscriber_count().await, 1);

        feed.deactivate();
        feed.deactivate();
        assert!(!feed.is_active());

        // Let the aborted task drop its subscription.
        for _ in 0..50 {
            if store.subscriber_count().await == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(store.subscriber_count().await, 0);
    }

    #[test]
    fn test_feed_state_serialization() {
        let ready: FeedState<u32> = FeedState::Ready(5);
        assert_eq!(
            serde_json::to_value(&ready).unwrap(),
            json!({"state": "ready", "data": 5})
        );
        let loading: FeedState<u32> = FeedState::Loading;
        assert_eq!(serde_json::to_value(&loading).unwrap(), json!({"state": "loading"}));
    }
}
