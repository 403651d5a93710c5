//! Alert urgency classification
//!
//! Matches on the message text, case-insensitively. Leak wording wins over
//! quality wording.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Leak,
    Quality,
    General,
}

pub const LEAK_TITLE: &str = "LEAKAGE DETECTED";
pub const QUALITY_TITLE: &str = "Water Quality Issue";
pub const GENERAL_TITLE: &str = "Water Monitor Alert";

/// Title, body and urgency for one alert message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: AlertKind,
    pub urgency: Urgency,
    pub title: &'static str,
    pub body: String,
}

pub fn classify(message: &str) -> Classification {
    let lower = message.to_lowercase();

    if lower.contains("leak") {
        Classification {
            kind: AlertKind::Leak,
            urgency: Urgency::High,
            title: LEAK_TITLE,
            body: format!("{}\n\nImmediate attention required!", message),
        }
    } else if lower.contains("quality") || lower.contains("tds") {
        Classification {
            kind: AlertKind::Quality,
            urgency: Urgency::High,
            title: QUALITY_TITLE,
            body: format!("{}\n\nCheck your water system.", message),
        }
    } else {
        Classification {
            kind: AlertKind::General,
            urgency: Urgency::Normal,
            title: GENERAL_TITLE,
            body: message.to_string(),
        }
    }
}
