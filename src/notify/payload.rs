//! Inbound push payloads
//!
//! Payloads are JSON objects merged key-by-key over the defaults below. Any
//! payload that is not a usable JSON object is shown as plain text instead of
//! being rejected.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{Notification, DEFAULT_BADGE, DEFAULT_ICON, DEFAULT_VIBRATE};

const DEFAULT_TITLE: &str = "Water Monitor Alert";
const DEFAULT_BODY: &str = "Check your water system";
const DEFAULT_TAG: &str = "push";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushData {
    pub url: String,
}

/// A push message after merging over defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: PushData,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub require_interaction: bool,
}

impl Default for PushPayload {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            body: DEFAULT_BODY.to_string(),
            icon: DEFAULT_ICON.to_string(),
            badge: DEFAULT_BADGE.to_string(),
            vibrate: DEFAULT_VIBRATE.to_vec(),
            data: PushData {
                url: "/".to_string(),
            },
            tag: None,
            require_interaction: false,
        }
    }
}

impl PushPayload {
    /// Parse a raw push body. Never fails.
    pub fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        if text.trim().is_empty() {
            return Self::default();
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(fields)) => {
                let mut merged = defaults_object();
                if let Value::Object(base) = &mut merged {
                    base.extend(fields);
                }
                match serde_json::from_value(merged) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::debug!(error = %e, "Push payload has unexpected fields, using text");
                        Self::plain_text(&text)
                    }
                }
            }
            _ => Self::plain_text(&text),
        }
    }

    fn plain_text(text: &str) -> Self {
        Self {
            body: text.to_string(),
            ..Self::default()
        }
    }

    pub fn into_notification(self) -> Notification {
        let mut notification = Notification::new(
            self.title,
            self.body,
            self.tag.unwrap_or_else(|| DEFAULT_TAG.to_string()),
        )
        .require_interaction(self.require_interaction)
        .vibrate(&self.vibrate);
        notification.icon = self.icon;
        notification.badge = self.badge;
        notification.url = self.data.url;
        notification
    }
}

fn defaults_object() -> Value {
    json!(PushPayload::default())
}
