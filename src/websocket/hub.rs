//! WebSocket Connection Hub
//!
//! Tracks dashboard connections and their topic subscriptions, and fans
//! events out to subscribers. A broadcast channel mirrors every published
//! event for in-process listeners.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, RwLock};
use uuid::Uuid;

use super::messages::{ServerMessage, WsEvent};

/// Unique identifier for a WebSocket connection
pub type ConnectionId = String;

/// Feed names accepted in `feeds.{name}` topics
const FEED_TOPICS: [&str; 5] = ["reading", "alerts", "system", "notification", "history"];

/// Configuration for the connection hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Capacity of the broadcast channel
    pub broadcast_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            broadcast_capacity: 256,
        }
    }
}

struct ConnectionHandle {
    sender: mpsc::UnboundedSender<ServerMessage>,
    subscriptions: HashSet<String>,
    /// Registration order, used to pick a dashboard to focus
    seq: u64,
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    /// Topic → subscribed connections
    subscriptions: HashMap<String, HashSet<ConnectionId>>,
    next_seq: u64,
}

/// Manages all WebSocket connections and subscriptions
#[derive(Clone)]
pub struct ConnectionHub {
    state: Arc<RwLock<HubState>>,
    broadcast_tx: broadcast::Sender<WsEvent>,
    config: HubConfig,
}

impl ConnectionHub {
    pub fn new(config: HubConfig) -> Self {
        let (broadcast_tx, _) = broadcast::channel(config.broadcast_capacity.max(1));
        Self {
            state: Arc::new(RwLock::new(HubState::default())),
            broadcast_tx,
            config,
        }
    }

    /// Register a new WebSocket connection
    pub async fn register(
        &self,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<ConnectionId, HubError> {
        let mut state = self.state.write().await;
        if state.connections.len() >= self.config.max_connections {
            return Err(HubError::TooManyConnections(self.config.max_connections));
        }

        let id = Uuid::new_v4().to_string();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.connections.insert(
            id.clone(),
            ConnectionHandle {
                sender,
                subscriptions: HashSet::new(),
                seq,
            },
        );

        tracing::info!(connection_id = %id, "WebSocket connected");
        Ok(id)
    }

    /// Unregister a connection and clean up its subscriptions
    pub async fn unregister(&self, id: &str) {
        let mut state = self.state.write().await;
        if let Some(handle) = state.connections.remove(id) {
            for topic in handle.subscriptions {
                if let Some(subscribers) = state.subscriptions.get_mut(&topic) {
                    subscribers.remove(id);
                    if subscribers.is_empty() {
                        state.subscriptions.remove(&topic);
                    }
                }
            }
        }

        tracing::info!(connection_id = %id, "WebSocket disconnected");
    }

    /// Subscribe a connection to topics. Invalid topics are skipped.
    pub async fn subscribe(&self, id: &str, topics: Vec<String>) -> Result<Vec<String>, HubError> {
        let mut state = self.state.write().await;
        let HubState {
            connections,
            subscriptions,
            ..
        } = &mut *state;
        let handle = connections.get_mut(id).ok_or(HubError::ConnectionNotFound)?;

        let mut subscribed = Vec::new();
        for topic in topics {
            if !is_valid_topic(&topic) {
                tracing::warn!(topic = %topic, "Invalid topic ignored");
                continue;
            }
            handle.subscriptions.insert(topic.clone());
            subscriptions
                .entry(topic.clone())
                .or_default()
                .insert(id.to_string());
            subscribed.push(topic);
        }

        tracing::debug!(connection_id = %id, topics = ?subscribed, "Subscribed to topics");
        Ok(subscribed)
    }

    /// Unsubscribe a connection from topics
    pub async fn unsubscribe(
        &self,
        id: &str,
        topics: Vec<String>,
    ) -> Result<Vec<String>, HubError> {
        let mut state = self.state.write().await;
        let HubState {
            connections,
            subscriptions,
            ..
        } = &mut *state;
        let handle = connections.get_mut(id).ok_or(HubError::ConnectionNotFound)?;

        let mut unsubscribed = Vec::new();
        for topic in topics {
            if handle.subscriptions.remove(&topic) {
                if let Some(subscribers) = subscriptions.get_mut(&topic) {
                    subscribers.remove(id);
                    if subscribers.is_empty() {
                        subscriptions.remove(&topic);
                    }
                }
                unsubscribed.push(topic);
            }
        }

        tracing::debug!(connection_id = %id, topics = ?unsubscribed, "Unsubscribed from topics");
        Ok(unsubscribed)
    }

    /// Deliver an event to every subscriber of its topic, including
    /// wildcard subscribers (`feeds.*` matches `feeds.reading`).
    /// Returns the number of connections reached.
    pub async fn broadcast(&self, event: &WsEvent) -> usize {
        let _ = self.broadcast_tx.send(event.clone());

        let state = self.state.read().await;
        let mut targets: HashSet<&ConnectionId> = HashSet::new();
        if let Some(ids) = state.subscriptions.get(&event.topic) {
            targets.extend(ids);
        }
        if let Some((prefix, _)) = event.topic.split_once('.') {
            if let Some(ids) = state.subscriptions.get(&format!("{}.*", prefix)) {
                targets.extend(ids);
            }
        }

        let mut sent = 0;
        for id in targets {
            if let Some(handle) = state.connections.get(id) {
                if handle.sender.send(event.message.clone()).is_ok() {
                    sent += 1;
                }
            }
        }

        if sent > 0 {
            tracing::trace!(topic = %event.topic, subscribers = sent, "Broadcast event");
        }
        sent
    }

    /// Broadcast without waiting
    pub fn publish(&self, event: WsEvent) {
        let hub = self.clone();
        tokio::spawn(async move {
            hub.broadcast(&event).await;
        });
    }

    /// Send a message directly to a specific connection
    pub async fn send_to(&self, id: &str, message: ServerMessage) -> Result<(), HubError> {
        let state = self.state.read().await;
        let handle = state
            .connections
            .get(id)
            .ok_or(HubError::ConnectionNotFound)?;
        handle.sender.send(message).map_err(|_| HubError::SendFailed)
    }

    /// The longest-connected dashboard, if any
    pub async fn oldest_connection(&self) -> Option<ConnectionId> {
        let state = self.state.read().await;
        state
            .connections
            .iter()
            .filter(|(_, handle)| !handle.sender.is_closed())
            .min_by_key(|(_, handle)| handle.seq)
            .map(|(id, _)| id.clone())
    }

    /// In-process view of every broadcast event
    pub fn subscribe_broadcast(&self) -> broadcast::Receiver<WsEvent> {
        self.broadcast_tx.subscribe()
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Subscriber count for one exact topic
    pub async fn subscription_count(&self, topic: &str) -> usize {
        self.state
            .read()
            .await
            .subscriptions
            .get(topic)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

/// Valid topics:
/// - `feeds.*` and `feeds.{reading|alerts|system|notification|history}`
/// - `notifications` (notification show/dismiss)
/// - `health` (device/client divergence)
fn is_valid_topic(topic: &str) -> bool {
    match topic.strip_prefix("feeds.") {
        Some("*") => true,
        Some(feed) => FEED_TOPICS.contains(&feed),
        None => topic == "notifications" || topic == "health",
    }
}

/// Errors that can occur in the connection hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Connection not found")]
    ConnectionNotFound,

    #[error("Failed to send message")]
    SendFailed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.max_connections, 100);
        assert_eq!(config.broadcast_capacity, 256);
    }

    #[test]
    fn test_valid_topics() {
        assert!(is_valid_topic("feeds.reading"));
        assert!(is_valid_topic("feeds.*"));
        assert!(is_valid_topic("feeds.history"));
        assert!(is_valid_topic("notifications"));
        assert!(is_valid_topic("health"));

        assert!(!is_valid_topic("feeds.unknown"));
        assert!(!is_valid_topic("metrics.mood"));
        assert!(!is_valid_topic(""));
    }

    #[tokio::test]
    async fn test_register_unregister() {
        let hub = ConnectionHub::new(HubConfig::default());
        let (tx, _rx) = mpsc::unbounded_channel();

        let id = hub.register(tx).await.unwrap();
        assert_eq!(hub.connection_count().await, 1);

        hub.unregister(&id).await;
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_subscribe_unsubscribe() {
        let hub = ConnectionHub::new(HubConfig::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = hub.register(tx).await.unwrap();

        let subscribed = hub
            .subscribe(&id, vec!["feeds.alerts".to_string(), "bogus".to_string()])
            .await
            .unwrap();
        assert_eq!(subscribed, vec!["feeds.alerts"]);
        assert_eq!(hub.subscription_count("feeds.alerts").await, 1);

        let unsubscribed = hub
            .unsubscribe(&id, vec!["feeds.alerts".to_string()])
            .await
            .unwrap();
        assert_eq!(unsubscribed, vec!["feeds.alerts"]);
        assert_eq!(hub.subscription_count("feeds.alerts").await, 0);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let hub = ConnectionHub::new(HubConfig {
            max_connections: 1,
            broadcast_capacity: 16,
        });
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        hub.register(tx1).await.unwrap();
        let result = hub.register(tx2).await;
        assert!(matches!(result, Err(HubError::TooManyConnections(1))));
    }

    #[tokio::test]
    async fn test_broadcast_respects_topics_and_wildcards() {
        let hub = ConnectionHub::new(HubConfig::default());
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let (tx3, mut rx3) = mpsc::unbounded_channel();

        let id1 = hub.register(tx1).await.unwrap();
        let id2 = hub.register(tx2).await.unwrap();
        let _id3 = hub.register(tx3).await.unwrap();
        hub.subscribe(&id1, vec!["feeds.reading".into()]).await.unwrap();
        hub.subscribe(&id2, vec!["feeds.*".into()]).await.unwrap();

        let sent = hub
            .broadcast(&WsEvent::feed_update("reading", json!({"state": "loading"})))
            .await;
        assert_eq!(sent, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_mirrors_to_internal_listeners() {
        let hub = ConnectionHub::new(HubConfig::default());
        let mut listener = hub.subscribe_broadcast();

        hub.broadcast(&WsEvent::dismissed("a1")).await;
        let event = listener.recv().await.unwrap();
        assert_eq!(event.topic, "notifications");
    }

    #[tokio::test]
    async fn test_oldest_connection() {
        let hub = ConnectionHub::new(HubConfig::default());
        assert!(hub.oldest_connection().await.is_none());

        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let first = hub.register(tx1).await.unwrap();
        hub.register(tx2).await.unwrap();

        assert_eq!(hub.oldest_connection().await, Some(first));
    }
}
