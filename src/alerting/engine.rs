//! Alert collection engine
//!
//! State machine over the id of the last alert already notified:
//!
//! ```text
//!            latest id == last seen
//!   ┌──────────────────────────────────┐
//!   ▼                                  │
//! Unset ──new latest id──► Seen(id) ───┘
//!                            │  ▲
//!                            └──┘ new latest id: notify
//! ```
//!
//! The id is recorded before delivery is attempted, so a failed delivery is
//! not retried (at most once per alert). This includes deliveries skipped
//! because notifications are not yet permitted: granting permission later
//! does not replay the alert that was latest at the time.
//!
//! [`AlertEngine::observe`] only decides; the returned [`PendingAlert`] is
//! delivered separately so a slow notifier never holds up the next snapshot.

use serde::Serialize;

use super::urgency::{classify, AlertKind, Urgency};
use super::Escalation;
use crate::model::Alert;
use crate::notify::{Delivery, Notification, DEFAULT_VIBRATE};

/// What one alerts snapshot caused
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AlertOutcome {
    /// The collection is empty
    NoAlerts,
    /// The latest alert was already notified
    Duplicate,
    /// First snapshot recorded without notifying
    Primed { id: String },
    Dispatched {
        id: String,
        urgency: Urgency,
        delivery: Delivery,
        sounded: bool,
    },
}

/// A new alert whose notification has not been delivered yet
#[derive(Debug, Clone)]
pub struct PendingAlert {
    pub id: String,
    pub kind: AlertKind,
    pub urgency: Urgency,
    pub notification: Notification,
}

impl PendingAlert {
    /// Deliver the notification (and sound) through `escalation`
    pub async fn deliver(self, escalation: &Escalation) -> AlertOutcome {
        let (delivery, sounded) = escalation.dispatch(&self.notification, self.urgency).await;

        tracing::info!(
            alert_id = %self.id,
            kind = ?self.kind,
            urgency = ?self.urgency,
            ?delivery,
            sounded,
            "New alert escalated"
        );

        AlertOutcome::Dispatched {
            id: self.id,
            urgency: self.urgency,
            delivery,
            sounded,
        }
    }
}

/// What [`AlertEngine::observe`] decided
#[derive(Debug, Clone)]
pub enum Observation {
    /// Nothing to deliver
    Settled(AlertOutcome),
    Notify(PendingAlert),
}

pub struct AlertEngine {
    escalation: Escalation,
    last_seen_alert_id: Option<String>,
    notify_existing_on_start: bool,
    started: bool,
}

impl AlertEngine {
    pub fn new(escalation: Escalation) -> Self {
        Self {
            escalation,
            last_seen_alert_id: None,
            notify_existing_on_start: true,
            started: false,
        }
    }

    /// Whether the latest alert already present in the first snapshot is
    /// notified (default) or only recorded
    pub fn notify_existing_on_start(mut self, notify: bool) -> Self {
        self.notify_existing_on_start = notify;
        self
    }

    /// Seed the last seen id, e.g. from a previous session
    pub fn with_last_seen(mut self, id: Option<String>) -> Self {
        self.last_seen_alert_id = id;
        self
    }

    pub fn last_seen_alert_id(&self) -> Option<&str> {
        self.last_seen_alert_id.as_deref()
    }

    pub fn escalation(&self) -> &Escalation {
        &self.escalation
    }

    /// Record one alerts snapshot, given in collection order (oldest first),
    /// and decide whether its latest alert needs a notification
    pub fn observe(&mut self, alerts: &[Alert]) -> Observation {
        let first_snapshot = !self.started;
        self.started = true;

        let Some(latest) = alerts.last() else {
            return Observation::Settled(AlertOutcome::NoAlerts);
        };

        if self.last_seen_alert_id.as_deref() == Some(latest.id.as_str()) {
            return Observation::Settled(AlertOutcome::Duplicate);
        }

        self.last_seen_alert_id = Some(latest.id.clone());

        if first_snapshot && !self.notify_existing_on_start {
            tracing::debug!(alert_id = %latest.id, "Primed with existing alert");
            return Observation::Settled(AlertOutcome::Primed {
                id: latest.id.clone(),
            });
        }

        let classification = classify(&latest.message);
        let high = classification.urgency == Urgency::High;
        let mut notification =
            Notification::new(classification.title, classification.body, &latest.id)
                .require_interaction(high);
        if high {
            notification = notification.vibrate(&DEFAULT_VIBRATE);
        }

        Observation::Notify(PendingAlert {
            id: latest.id.clone(),
            kind: classification.kind,
            urgency: classification.urgency,
            notification,
        })
    }

    /// Observe a snapshot and deliver inline
    pub async fn handle_alerts(&mut self, alerts: &[Alert]) -> AlertOutcome {
        match self.observe(alerts) {
            Observation::Settled(outcome) => outcome,
            Observation::Notify(pending) => pending.deliver(&self.escalation).await,
        }
    }
}
