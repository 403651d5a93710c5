//! Per-session notification preferences

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Serializable view of the preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesView {
    pub sound_enabled: bool,
}

/// Session-scoped preferences shared by the alerting engine and the API
#[derive(Debug)]
pub struct NotificationPreferences {
    sound_enabled: AtomicBool,
}

impl NotificationPreferences {
    pub fn new(sound_enabled: bool) -> Self {
        Self {
            sound_enabled: AtomicBool::new(sound_enabled),
        }
    }

    pub fn sound_enabled(&self) -> bool {
        self.sound_enabled.load(Ordering::SeqCst)
    }

    pub fn set_sound_enabled(&self, enabled: bool) {
        self.sound_enabled.store(enabled, Ordering::SeqCst);
        tracing::info!(enabled, "Alert sound preference changed");
    }

    pub fn view(&self) -> PreferencesView {
        PreferencesView {
            sound_enabled: self.sound_enabled(),
        }
    }
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self::new(true)
    }
}
