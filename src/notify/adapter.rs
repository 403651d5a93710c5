//! Delivery adapter
//!
//! Gate in front of the delivery surfaces. Nothing is sent unless
//! notifications are supported and permission is granted; an active
//! background agent is preferred over foreground delivery.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

use super::{Delivery, Notification, Notifier, NotifierPtr, Permission};

/// Snapshot of the adapter's gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotificationStatus {
    pub supported: bool,
    pub permission: Permission,
    pub enabled: bool,
}

pub struct DeliveryAdapter {
    supported: bool,
    permission: RwLock<Permission>,
    foreground: NotifierPtr,
    background: Option<NotifierPtr>,
}

impl DeliveryAdapter {
    /// `background` should only be given when the agent is active.
    pub fn new(
        supported: bool,
        permission: Permission,
        foreground: NotifierPtr,
        background: Option<NotifierPtr>,
    ) -> Self {
        let permission = if supported {
            permission
        } else {
            Permission::Denied
        };
        Self {
            supported,
            permission: RwLock::new(permission),
            foreground,
            background,
        }
    }

    pub async fn permission(&self) -> Permission {
        *self.permission.read().await
    }

    pub async fn status(&self) -> NotificationStatus {
        let permission = self.permission().await;
        NotificationStatus {
            supported: self.supported,
            permission,
            enabled: self.supported && permission == Permission::Granted,
        }
    }

    /// Record the user's answer to a permission prompt.
    ///
    /// A denial is final for the session, like a browser prompt. Moving to
    /// granted sends the welcome notification.
    pub async fn request_permission(&self, decision: Permission) -> Permission {
        if !self.supported {
            tracing::warn!("Notifications are not supported");
            return Permission::Denied;
        }

        let previous = {
            let mut permission = self.permission.write().await;
            let previous = *permission;
            if previous != Permission::Denied {
                *permission = decision;
            }
            previous
        };
        let current = self.permission().await;

        tracing::info!(?previous, ?current, "Notification permission updated");
        if previous != Permission::Granted && current == Permission::Granted {
            let outcome = self.try_send(&Notification::welcome()).await;
            tracing::debug!(?outcome, "Welcome notification");
        }
        current
    }

    /// Send the on-demand test notification
    pub async fn send_test(&self) -> Delivery {
        self.try_send(&Notification::test()).await
    }
}

#[async_trait]
impl Notifier for DeliveryAdapter {
    fn name(&self) -> &str {
        "adapter"
    }

    async fn try_send(&self, notification: &Notification) -> Delivery {
        if !self.supported {
            return Delivery::Skipped("notifications unsupported".to_string());
        }
        if self.permission().await != Permission::Granted {
            tracing::debug!(tag = %notification.tag, "Notifications not enabled");
            return Delivery::Skipped("permission not granted".to_string());
        }

        let surface = self.background.as_ref().unwrap_or(&self.foreground);
        let outcome = surface.try_send(notification).await;
        tracing::debug!(
            surface = surface.name(),
            tag = %notification.tag,
            ?outcome,
            "Notification dispatched"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use std::sync::Arc;

    fn adapter(
        supported: bool,
        permission: Permission,
        background: bool,
    ) -> (DeliveryAdapter, Arc<RecordingNotifier>, Arc<RecordingNotifier>) {
        let foreground = Arc::new(RecordingNotifier::default());
        let agent = Arc::new(RecordingNotifier::default());
        let background_ptr: Option<NotifierPtr> = if background {
            Some(agent.clone())
        } else {
            None
        };
        (
            DeliveryAdapter::new(supported, permission, foreground.clone(), background_ptr),
            foreground,
            agent,
        )
    }

    #[tokio::test]
    async fn test_denied_permission_is_noop() {
        let (adapter, foreground, _) = adapter(true, Permission::Denied, false);
        let outcome = adapter.try_send(&Notification::test()).await;
        assert!(matches!(outcome, Delivery::Skipped(_)));
        assert!(foreground.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_default_permission_is_noop() {
        let (adapter, foreground, _) = adapter(true, Permission::Default, false);
        assert!(matches!(adapter.send_test().await, Delivery::Skipped(_)));
        assert!(foreground.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_forces_denied() {
        let (adapter, _, _) = adapter(false, Permission::Granted, false);
        assert_eq!(adapter.permission().await, Permission::Denied);
        assert!(!adapter.status().await.enabled);
        assert_eq!(adapter.request_permission(Permission::Granted).await, Permission::Denied);
    }

    #[tokio::test]
    async fn test_background_agent_preferred() {
        let (adapter, foreground, agent) = adapter(true, Permission::Granted, true);
        assert!(adapter.send_test().await.is_delivered());
        assert_eq!(agent.titles().await, vec!["Test Notification"]);
        assert!(foreground.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_foreground_without_agent() {
        let (adapter, foreground, _) = adapter(true, Permission::Granted, false);
        assert!(adapter.send_test().await.is_delivered());
        assert_eq!(foreground.titles().await, vec!["Test Notification"]);
    }

    #[tokio::test]
    async fn test_grant_sends_welcome_once() {
        let (adapter, foreground, _) = adapter(true, Permission::Default, false);

        assert_eq!(adapter.request_permission(Permission::Granted).await, Permission::Granted);
        assert_eq!(adapter.request_permission(Permission::Granted).await, Permission::Granted);

        let sent = foreground.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].tag, "welcome");
    }

    #[tokio::test]
    async fn test_denial_is_final() {
        let (adapter, _, _) = adapter(true, Permission::Default, false);
        adapter.request_permission(Permission::Denied).await;
        assert_eq!(adapter.request_permission(Permission::Granted).await, Permission::Denied);
    }
}
