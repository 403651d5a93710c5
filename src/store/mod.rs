//! Realtime Store
//!
//! Abstraction over the hosted, path-addressed JSON realtime database the
//! sensor writes into.
//!
//! ## Architecture
//!
//! - **RealtimeStore**: point reads, atomic multi-field updates and push
//!   subscriptions that fire on attach and on every change
//! - **FirebaseStore**: REST + event-stream client for the hosted database
//! - **MemoryStore**: in-process backend with identical semantics
//!
//! ## Snapshots
//!
//! A subscription always delivers the full value at its path. An absent
//! path is a `Snapshot` with `value: None`, which is distinct from an
//! error event.

mod error;
mod firebase;
mod memory;
mod sse;
pub mod tree;

pub use error::{StoreError, StoreResult};
pub use firebase::{FirebaseConfig, FirebaseStore};
pub use memory::MemoryStore;
pub use sse::{SseDecoder, SseEvent, StreamEvent};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Shared handle to a store backend
pub type StorePtr = Arc<dyn RealtimeStore>;

/// Normalised slash-separated location in the tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StorePath(String);

impl StorePath {
    /// Build a path, trimming redundant slashes
    pub fn new(path: impl AsRef<str>) -> Self {
        let normalized = path
            .as_ref()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self(normalized)
    }

    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn child(&self, key: &str) -> Self {
        if self.0.is_empty() {
            Self::new(key)
        } else {
            Self::new(format!("{}/{}", self.0, key))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> Vec<&str> {
        self.0.split('/').filter(|s| !s.is_empty()).collect()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a write at `other` can change the value at `self`
    pub fn overlaps(&self, other: &StorePath) -> bool {
        let mine = self.segments();
        let theirs = other.segments();
        mine.iter().zip(theirs.iter()).all(|(a, b)| a == b)
    }

    /// Reject keys the hosted database does not accept
    pub fn validate(&self) -> StoreResult<()> {
        const FORBIDDEN: [char; 5] = ['.', '#', '$', '[', ']'];
        if self.0.contains(FORBIDDEN) {
            return Err(StoreError::InvalidPath(self.0.clone()));
        }
        Ok(())
    }
}

impl std::fmt::Display for StorePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.0)
    }
}

impl From<&str> for StorePath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Ordering and limit applied to a collection read or subscription
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySpec {
    pub order_by_child: Option<String>,
    pub limit_to_last: Option<usize>,
}

impl QuerySpec {
    /// Whole value, no ordering
    pub fn all() -> Self {
        Self::default()
    }

    pub fn order_by_child(mut self, child: impl Into<String>) -> Self {
        self.order_by_child = Some(child.into());
        self
    }

    pub fn limit_to_last(mut self, limit: usize) -> Self {
        self.limit_to_last = Some(limit);
        self
    }

    pub fn is_plain(&self) -> bool {
        self.order_by_child.is_none() && self.limit_to_last.is_none()
    }
}

/// Full value at a path at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub path: StorePath,
    pub query: QuerySpec,
    /// `None` when the path does not exist
    pub value: Option<Value>,
}

impl Snapshot {
    pub fn new(path: StorePath, query: QuerySpec, value: Option<Value>) -> Self {
        Self { path, query, value }
    }

    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    /// Decode the whole value
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<Option<T>> {
        match &self.value {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Children in collection order
    pub fn ordered_children(&self) -> Vec<(&str, &Value)> {
        match &self.value {
            Some(value) => tree::ordered_children(value, &self.query),
            None => Vec::new(),
        }
    }

    /// Decode each child in collection order, paired with its key
    pub fn decode_children<T: DeserializeOwned>(&self) -> StoreResult<Vec<(String, T)>> {
        self.ordered_children()
            .into_iter()
            .map(|(key, value)| {
                let decoded = serde_json::from_value(value.clone())?;
                Ok((key.to_string(), decoded))
            })
            .collect()
    }
}

/// Event delivered to a subscription
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotEvent {
    Value(Snapshot),
    Error(StoreError),
}

/// Live subscription to one path
///
/// Dropping the subscription unsubscribes it.
pub struct Subscription {
    path: StorePath,
    receiver: mpsc::UnboundedReceiver<SnapshotEvent>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(path: StorePath, receiver: mpsc::UnboundedReceiver<SnapshotEvent>) -> Self {
        Self {
            path,
            receiver,
            task: None,
        }
    }

    /// Attach the background task feeding this subscription
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// Wait for the next event. `None` once unsubscribed or the backend is gone.
    pub async fn next(&mut self) -> Option<SnapshotEvent> {
        self.receiver.recv().await
    }

    /// Stop receiving events. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.receiver.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Path-addressed realtime database
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Point read
    async fn get(&self, path: &StorePath, query: &QuerySpec) -> StoreResult<Snapshot>;

    /// Atomically merge `fields` into the object at `path`
    async fn update(&self, path: &StorePath, fields: Map<String, Value>) -> StoreResult<()>;

    /// Subscribe to `path`. The current value is delivered first.
    async fn subscribe(&self, path: &StorePath, query: QuerySpec) -> StoreResult<Subscription>;
}
