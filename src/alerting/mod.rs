//! Alert deduplication and escalation
//!
//! Two independent triggers share one escalation path:
//!
//! - [`AlertEngine`] watches the alert collection and notifies exactly once
//!   per new latest alert id.
//! - [`StatusTrigger`] watches the current reading and notifies when its
//!   device status becomes critical.
//!
//! Both run inside the session's alerting task, so their state is never
//! touched concurrently. Each splits into a synchronous decision and a
//! pending delivery that the session hands to its delivery queue.

mod engine;
mod sound;
mod status_trigger;
mod urgency;

pub use engine::{AlertEngine, AlertOutcome, Observation, PendingAlert};
pub use sound::{play_best_effort, AlertSound, CommandSound, Silent, SoundError, SoundPtr, TerminalBell};
pub use status_trigger::{PendingStatus, StatusObservation, StatusTrigger, TriggerOutcome};
pub use urgency::{classify, AlertKind, Classification, Urgency};

#[cfg(test)]
pub(crate) use sound::testing;

use std::sync::Arc;

use crate::notify::{Delivery, Notification, NotificationPreferences, NotifierPtr};

/// Delivery plus sound, shared by both triggers
#[derive(Clone)]
pub struct Escalation {
    notifier: NotifierPtr,
    sound: SoundPtr,
    preferences: Arc<NotificationPreferences>,
}

impl Escalation {
    pub fn new(
        notifier: NotifierPtr,
        sound: SoundPtr,
        preferences: Arc<NotificationPreferences>,
    ) -> Self {
        Self {
            notifier,
            sound,
            preferences,
        }
    }

    /// Send `notification`, then play the alert sound for high urgency.
    /// Returns the delivery outcome and whether a sound was started.
    pub async fn dispatch(&self, notification: &Notification, urgency: Urgency) -> (Delivery, bool) {
        let delivery = self.notifier.try_send(notification).await;

        let sounded = urgency == Urgency::High
            && self.preferences.sound_enabled()
            && play_best_effort(self.sound.as_ref());

        (delivery, sounded)
    }
}
