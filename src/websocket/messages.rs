//! WebSocket Message Types
//!
//! Messages exchanged between dashboards and the monitor over `/ws`.

use serde::{Deserialize, Serialize};

use crate::notify::Notification;
use crate::status::HealthReport;

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to topics for real-time updates
    Subscribe {
        /// Topics such as "feeds.reading", "feeds.*", "notifications"
        topics: Vec<String>,
    },
    Unsubscribe {
        topics: Vec<String>,
    },
    /// The user clicked a notification shown by this dashboard
    NotificationClicked { tag: String },
    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A feed published a new state
    FeedUpdate {
        /// Feed name ("reading", "alerts", ...)
        feed: String,
        /// Serialized `FeedState`
        state: serde_json::Value,
    },
    /// Show a notification
    Notification { notification: Notification },
    /// Close the notification with this tag
    NotificationDismissed { tag: String },
    /// Bring the dashboard window to the front
    Focus { url: String },
    /// Device and client disagree about the current reading
    Health { report: HealthReport },
    Subscribed { topics: Vec<String> },
    Unsubscribed { topics: Vec<String> },
    Pong,
    Error { message: String },
    Connected { connection_id: String },
}

/// Internal event for broadcasting through the hub
#[derive(Debug, Clone)]
pub struct WsEvent {
    /// Topic this event belongs to (e.g., "feeds.alerts")
    pub topic: String,
    pub message: ServerMessage,
}

impl WsEvent {
    /// Feed state change, published on `feeds.{name}`
    pub fn feed_update(feed: &str, state: serde_json::Value) -> Self {
        Self {
            topic: format!("feeds.{}", feed),
            message: ServerMessage::FeedUpdate {
                feed: feed.to_string(),
                state,
            },
        }
    }

    pub fn notification(notification: Notification) -> Self {
        Self {
            topic: "notifications".to_string(),
            message: ServerMessage::Notification { notification },
        }
    }

    pub fn dismissed(tag: &str) -> Self {
        Self {
            topic: "notifications".to_string(),
            message: ServerMessage::NotificationDismissed {
                tag: tag.to_string(),
            },
        }
    }

    pub fn health(report: HealthReport) -> Self {
        Self {
            topic: "health".to_string(),
            message: ServerMessage::Health { report },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_deserialize_subscribe() {
        let json = r#"{"type": "subscribe", "topics": ["feeds.reading", "notifications"]}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Subscribe { topics } => {
                assert_eq!(topics, vec!["feeds.reading", "notifications"]);
            }
            _ => panic!("Expected Subscribe"),
        }
    }

    #[test]
    fn test_client_message_deserialize_click() {
        let json = r#"{"type": "notification_clicked", "tag": "a1"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::NotificationClicked { tag } if tag == "a1"));
    }

    #[test]
    fn test_server_message_serialize_feed_update() {
        let event = WsEvent::feed_update("system", json!({"state": "loading"}));
        assert_eq!(event.topic, "feeds.system");
        let value = serde_json::to_value(&event.message).unwrap();
        assert_eq!(
            value,
            json!({"type": "feed_update", "feed": "system", "state": {"state": "loading"}})
        );
    }

    #[test]
    fn test_server_message_serialize_notification() {
        let event = WsEvent::notification(Notification::new("Title", "Body", "a1"));
        assert_eq!(event.topic, "notifications");
        let value = serde_json::to_value(&event.message).unwrap();
        assert_eq!(value["type"], "notification");
        assert_eq!(value["notification"]["tag"], "a1");
    }

    #[test]
    fn test_server_message_serialize_focus() {
        let value = serde_json::to_value(ServerMessage::Focus { url: "/".into() }).unwrap();
        assert_eq!(value, json!({"type": "focus", "url": "/"}));
    }
}
