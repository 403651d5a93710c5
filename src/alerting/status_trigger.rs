//! Reading status trigger
//!
//! Notifies when the device reports `LEAKAGE_DETECTED` or
//! `WATER_QUALITY_ISSUE`, carrying the live values. Edge-triggered by
//! default: a status fires once when entered and again only after the
//! reading has left it. With edge triggering off, every critical snapshot
//! fires.

use serde::Serialize;

use super::urgency::{LEAK_TITLE, Urgency};
use super::Escalation;
use crate::model::{DeviceStatus, Reading};
use crate::notify::{Delivery, Notification, DEFAULT_VIBRATE};

pub const QUALITY_STATUS_TITLE: &str = "Water Quality Alert";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// Status is not one that notifies
    Idle,
    /// Still in a status that already fired
    Suppressed { status: DeviceStatus },
    Fired {
        status: DeviceStatus,
        delivery: Delivery,
        sounded: bool,
    },
}

/// A critical status notification not yet delivered
#[derive(Debug, Clone)]
pub struct PendingStatus {
    pub status: DeviceStatus,
    pub notification: Notification,
}

impl PendingStatus {
    pub async fn deliver(self, escalation: &Escalation) -> TriggerOutcome {
        let (delivery, sounded) = escalation.dispatch(&self.notification, Urgency::High).await;
        tracing::info!(status = %self.status, ?delivery, sounded, "Critical device status escalated");

        TriggerOutcome::Fired {
            status: self.status,
            delivery,
            sounded,
        }
    }
}

#[derive(Debug, Clone)]
pub enum StatusObservation {
    Settled(TriggerOutcome),
    Fire(PendingStatus),
}

pub struct StatusTrigger {
    escalation: Escalation,
    edge_triggered: bool,
    last_status: Option<DeviceStatus>,
}

impl StatusTrigger {
    pub fn new(escalation: Escalation, edge_triggered: bool) -> Self {
        Self {
            escalation,
            edge_triggered,
            last_status: None,
        }
    }

    /// Notification for a reading, if its status notifies
    pub fn notification_for(reading: &Reading) -> Option<Notification> {
        let notification = match reading.status {
            DeviceStatus::LeakageDetected => Notification::new(
                LEAK_TITLE,
                format!(
                    "Flow rate deviation detected!\nActual: {:.2} L/min\nExpected: {:.2} L/min",
                    reading.flow_rate, reading.expected_flow
                ),
                "leakage-status",
            ),
            DeviceStatus::WaterQualityIssue => Notification::new(
                QUALITY_STATUS_TITLE,
                format!(
                    "TDS level out of range: {:.1} ppm\n\nCheck your water quality immediately.",
                    reading.tds
                ),
                "quality-status",
            ),
            DeviceStatus::Normal | DeviceStatus::DropLeakageDetected => return None,
        };
        Some(notification.require_interaction(true).vibrate(&DEFAULT_VIBRATE))
    }

    /// Record one current-reading snapshot and decide whether it fires
    pub fn observe(&mut self, reading: Option<&Reading>) -> StatusObservation {
        let status = reading.map(|r| r.status);
        let previous = std::mem::replace(&mut self.last_status, status);

        let (Some(reading), Some(status)) = (reading, status) else {
            return StatusObservation::Settled(TriggerOutcome::Idle);
        };
        let Some(notification) = Self::notification_for(reading) else {
            return StatusObservation::Settled(TriggerOutcome::Idle);
        };

        if self.edge_triggered && previous == Some(status) {
            return StatusObservation::Settled(TriggerOutcome::Suppressed { status });
        }

        StatusObservation::Fire(PendingStatus {
            status,
            notification,
        })
    }

    /// Observe a snapshot and deliver inline
    pub async fn handle_reading(&mut self, reading: Option<&Reading>) -> TriggerOutcome {
        match self.observe(reading) {
            StatusObservation::Settled(outcome) => outcome,
            StatusObservation::Fire(pending) => pending.deliver(&self.escalation).await,
        }
    }
}
