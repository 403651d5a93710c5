//! Notification delivery
//!
//! Everything that turns a classified alert into something a person sees.
//!
//! ## Architecture
//!
//! - **Notifier**: capability interface used by the alerting engine
//! - **DeliveryAdapter**: permission/capability gate that prefers the
//!   background agent and falls back to foreground delivery
//! - **ForegroundNotifier**: pushes to connected dashboards over WebSocket and
//!   auto-dismisses unclicked notifications
//! - **WebPushAgent**: background agent posting to an HTTP push endpoint
//! - **PushPayload**: parsing of inbound push payloads
//! - **NotificationPreferences**: per-session sound toggle
//!
//! Delivery never fails the caller: every outcome is reported as a
//! [`Delivery`] value.

mod adapter;
mod background;
mod foreground;
mod payload;
mod preferences;

pub use adapter::{DeliveryAdapter, NotificationStatus};
pub use background::{WebPushAgent, WebPushConfig};
pub use foreground::{ClickOutcome, ForegroundNotifier};
pub use payload::{PushData, PushPayload};
pub use preferences::{NotificationPreferences, PreferencesView};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default icon reference for every notification
pub const DEFAULT_ICON: &str = "/water-icon.png";

/// Default badge reference for every notification
pub const DEFAULT_BADGE: &str = "/badge-icon.png";

/// Default vibration pattern in milliseconds
pub const DEFAULT_VIBRATE: [u32; 3] = [200, 100, 200];

/// A notification as handed to a delivery surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    /// Dedup key honoured by the delivery surface
    pub tag: String,
    pub require_interaction: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vibrate: Vec<u32>,
    /// Page opened when the notification is clicked
    pub url: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            icon: DEFAULT_ICON.to_string(),
            badge: DEFAULT_BADGE.to_string(),
            tag: tag.into(),
            require_interaction: false,
            vibrate: Vec::new(),
            url: "/".to_string(),
        }
    }

    pub fn require_interaction(mut self, required: bool) -> Self {
        self.require_interaction = required;
        self
    }

    pub fn vibrate(mut self, pattern: &[u32]) -> Self {
        self.vibrate = pattern.to_vec();
        self
    }

    /// Sent once when permission becomes granted
    pub fn welcome() -> Self {
        Self::new(
            "Water Monitor Notifications Enabled",
            "You will now receive alerts for water quality issues and leaks.",
            "welcome",
        )
    }

    /// Sent on demand from the settings surface
    pub fn test() -> Self {
        Self::new(
            "Test Notification",
            "Notifications are working. You will be alerted about water issues.",
            "test",
        )
    }
}

/// Outcome of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Delivery {
    Delivered,
    /// Nothing was attempted (unsupported, not permitted, nobody listening)
    Skipped(String),
    Failed(String),
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}

/// Notification permission as granted by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    #[default]
    Default,
    Granted,
    Denied,
}

/// A surface that can show notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Surface name for logs
    fn name(&self) -> &str;

    /// Attempt delivery. Must not panic or propagate errors.
    async fn try_send(&self, notification: &Notification) -> Delivery;
}

/// Shared handle to a notifier
pub type NotifierPtr = Arc<dyn Notifier>;
