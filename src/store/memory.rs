//! In-memory realtime store
//!
//! Keeps the whole tree in process and fans snapshots out to subscribers on
//! every write. Used by tests, benches and offline demos; the hosted backend
//! is expected to behave the same way.
//!
//! ## Semantics
//!
//! - `subscribe()` delivers the current value immediately.
//! - Every write re-delivers a full snapshot to each subscription whose path
//!   overlaps the written path, in write order.
//! - `fail()` cancels matching subscriptions with an error, the way a rules
//!   denial cancels a listener. Later reads of that path fail until
//!   `clear_failure()`.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use super::error::{StoreError, StoreResult};
use super::tree;
use super::{QuerySpec, RealtimeStore, Snapshot, SnapshotEvent, StorePath, Subscription};

struct Subscriber {
    path: StorePath,
    query: QuerySpec,
    sender: mpsc::UnboundedSender<SnapshotEvent>,
}

struct Inner {
    root: RwLock<Value>,
    subscribers: RwLock<Vec<Subscriber>>,
    failures: RwLock<HashMap<StorePath, StoreError>>,
    push_seq: AtomicU64,
}

/// In-process store
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_root(Value::Null)
    }

    /// Start from an existing tree
    pub fn with_root(root: Value) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: RwLock::new(root),
                subscribers: RwLock::new(Vec::new()),
                failures: RwLock::new(HashMap::new()),
                push_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Replace the value at `path`. `Value::Null` deletes it.
    pub async fn set(&self, path: impl Into<StorePath>, value: Value) {
        let path = path.into();
        let mut root = self.inner.root.write().await;
        tree::set_at(&mut root, &path.segments(), value);
        self.notify(&root, &path).await;
    }

    /// Delete the value at `path`
    pub async fn remove(&self, path: impl Into<StorePath>) {
        self.set(path, Value::Null).await;
    }

    /// Append a child under a generated, chronologically sortable key
    pub async fn push(&self, path: impl Into<StorePath>, value: Value) -> String {
        let path = path.into();
        let seq = self.inner.push_seq.fetch_add(1, Ordering::SeqCst);
        let key = format!("-N{:018}", seq);
        self.set(path.child(&key), value).await;
        key
    }

    /// Cancel subscriptions overlapping `path` with `error`
    pub async fn fail(&self, path: impl Into<StorePath>, error: StoreError) {
        let path = path.into();
        self.inner
            .failures
            .write()
            .await
            .insert(path.clone(), error.clone());

        let mut subscribers = self.inner.subscribers.write().await;
        subscribers.retain(|sub| {
            if sub.path.overlaps(&path) {
                let _ = sub.sender.send(SnapshotEvent::Error(error.clone()));
                false
            } else {
                !sub.sender.is_closed()
            }
        });
    }

    /// Allow reads of `path` again
    pub async fn clear_failure(&self, path: impl Into<StorePath>) {
        self.inner.failures.write().await.remove(&path.into());
    }

    /// Copy of the whole tree
    pub async fn dump(&self) -> Value {
        self.inner.root.read().await.clone()
    }

    /// Number of live subscriptions
    pub async fn subscriber_count(&self) -> usize {
        let mut subscribers = self.inner.subscribers.write().await;
        subscribers.retain(|sub| !sub.sender.is_closed());
        subscribers.len()
    }

    async fn check_access(&self, path: &StorePath) -> StoreResult<()> {
        let failures = self.inner.failures.read().await;
        match failures.iter().find(|(failed, _)| failed.overlaps(path)) {
            Some((_, error)) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn notify(&self, root: &Value, written: &StorePath) {
        let mut subscribers = self.inner.subscribers.write().await;
        subscribers.retain(|sub| {
            if !sub.path.overlaps(written) {
                return !sub.sender.is_closed();
            }
            let snapshot = snapshot_of(root, &sub.path, &sub.query);
            sub.sender.send(SnapshotEvent::Value(snapshot)).is_ok()
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot_of(root: &Value, path: &StorePath, query: &QuerySpec) -> Snapshot {
    let value = tree::normalize(tree::value_at(root, &path.segments()))
        .map(|value| tree::apply_query(value, query));
    Snapshot::new(path.clone(), query.clone(), value)
}

#[async_trait]
impl RealtimeStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, path: &StorePath, query: &QuerySpec) -> StoreResult<Snapshot> {
        path.validate()?;
        self.check_access(path).await?;
        let root = self.inner.root.read().await;
        Ok(snapshot_of(&root, path, query))
    }

    async fn update(&self, path: &StorePath, fields: Map<String, Value>) -> StoreResult<()> {
        path.validate()?;
        self.check_access(path).await?;
        let mut root = self.inner.root.write().await;
        tree::merge_at(&mut root, &path.segments(), &fields);
        self.notify(&root, path).await;
        Ok(())
    }

    async fn subscribe(&self, path: &StorePath, query: QuerySpec) -> StoreResult<Subscription> {
        path.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();

        if let Err(error) = self.check_access(path).await {
            let _ = tx.send(SnapshotEvent::Error(error));
            return Ok(Subscription::new(path.clone(), rx));
        }

        // Hold the tree lock so no write can slip between the initial
        // snapshot and registration.
        let root = self.inner.root.read().await;
        let _ = tx.send(SnapshotEvent::Value(snapshot_of(&root, path, &query)));
        self.inner.subscribers.write().await.push(Subscriber {
            path: path.clone(),
            query,
            sender: tx,
        });
        drop(root);

        Ok(Subscription::new(path.clone(), rx))
    }
}
