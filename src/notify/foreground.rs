//! Foreground delivery to connected dashboards
//!
//! Notifications are published on the `notifications` topic. An unclicked
//! notification is dismissed after `auto_dismiss`. A click dismisses it and
//! focuses a dashboard, or records an open request when none is connected.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{Delivery, Notification, Notifier};
use crate::websocket::{ConnectionHub, ConnectionId, ServerMessage, WsEvent};

/// Result of handling a notification click
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// A connected dashboard was asked to focus
    Focused(ConnectionId),
    /// No dashboard is connected; the page should be opened
    OpenRequested(String),
}

struct Shown {
    url: String,
    dismiss: JoinHandle<()>,
}

pub struct ForegroundNotifier {
    hub: ConnectionHub,
    auto_dismiss: Duration,
    shown: Arc<Mutex<HashMap<String, Shown>>>,
}

impl ForegroundNotifier {
    pub fn new(hub: ConnectionHub, auto_dismiss: Duration) -> Self {
        Self {
            hub,
            auto_dismiss,
            shown: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Tags currently on screen
    pub async fn visible(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.shown.lock().await.keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Handle a click on the notification with `tag`.
    ///
    /// `from` is the dashboard that reported the click, if any.
    pub async fn click(&self, tag: &str, from: Option<&str>) -> ClickOutcome {
        let url = match self.shown.lock().await.remove(tag) {
            Some(shown) => {
                shown.dismiss.abort();
                shown.url
            }
            None => "/".to_string(),
        };
        self.hub.broadcast(&WsEvent::dismissed(tag)).await;

        let target = match from {
            Some(id) => Some(id.to_string()),
            None => self.hub.oldest_connection().await,
        };

        if let Some(id) = target {
            let focus = ServerMessage::Focus { url: url.clone() };
            if self.hub.send_to(&id, focus).await.is_ok() {
                tracing::debug!(tag, connection_id = %id, "Focused dashboard");
                return ClickOutcome::Focused(id);
            }
        }

        tracing::info!(tag, url = %url, "No dashboard connected, open requested");
        ClickOutcome::OpenRequested(url)
    }
}

#[async_trait]
impl Notifier for ForegroundNotifier {
    fn name(&self) -> &str {
        "foreground"
    }

    async fn try_send(&self, notification: &Notification) -> Delivery {
        if self.hub.connection_count().await == 0 {
            return Delivery::Skipped("no dashboard connected".to_string());
        }

        let tag = notification.tag.clone();
        self.hub
            .broadcast(&WsEvent::notification(notification.clone()))
            .await;

        let hub = self.hub.clone();
        let shown = Arc::clone(&self.shown);
        let delay = self.auto_dismiss;
        let dismiss_tag = tag.clone();
        let dismiss = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shown.lock().await.remove(&dismiss_tag);
            hub.broadcast(&WsEvent::dismissed(&dismiss_tag)).await;
            tracing::debug!(tag = %dismiss_tag, "Notification auto-dismissed");
        });

        // Same tag replaces the previous notification and its timer.
        let previous = self.shown.lock().await.insert(
            tag,
            Shown {
                url: notification.url.clone(),
                dismiss,
            },
        );
        if let Some(previous) = previous {
            previous.dismiss.abort();
        }

        Delivery::Delivered
    }
}
