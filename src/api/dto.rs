//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use serde::{Deserialize, Serialize};

use crate::alerting::AlertOutcome;
use crate::feeds::{ChartSeries, Trend};
use crate::model::{Alert, ChartPoint, LatestNotification, Reading};
use crate::monitor::FeedHealth;
use crate::notify::{ClickOutcome, Delivery, NotificationStatus, Permission};
use crate::status::HealthReport;

// ============================================
// DASHBOARD DTOs
// ============================================

/// Current reading with its derived health
#[derive(Debug, Serialize)]
pub struct ReadingResponse {
    /// `None` when the device has not written a reading yet
    pub reading: Option<Reading>,
    pub health: Option<HealthReport>,
}

/// Most recent alerts, newest first
#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<Alert>,
    pub total: usize,
}

/// Latest-notification banner
#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub notification: Option<LatestNotification>,
}

/// One chart series with its axis bounds and trend
#[derive(Debug, Serialize)]
pub struct SeriesResponse {
    pub points: Vec<ChartPoint>,
    pub min: f64,
    pub max: f64,
    pub trend: Trend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<f64>,
}

impl From<&ChartSeries> for SeriesResponse {
    fn from(series: &ChartSeries) -> Self {
        let (min, max) = series.bounds();
        Self {
            points: series.points.clone(),
            min,
            max,
            trend: series.trend(),
            latest: series.latest().map(|p| p.value),
        }
    }
}

/// Both history series
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub tds: SeriesResponse,
    pub flow: SeriesResponse,
}

// ============================================
// SETTINGS DTOs
// ============================================

/// Expected flow write
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRequest {
    /// Reference flow in L/min
    pub expected_flow_rate: f64,
}

// ============================================
// NOTIFICATION DTOs
// ============================================

/// Preferences update
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesRequest {
    pub sound_enabled: bool,
}

/// The user's answer to a permission prompt
#[derive(Debug, Deserialize)]
pub struct PermissionRequest {
    pub permission: Permission,
}

/// Result of a permission change
#[derive(Debug, Serialize)]
pub struct PermissionResponse {
    pub permission: Permission,
    pub status: NotificationStatus,
}

/// Result of one delivery
#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub tag: String,
    pub delivery: Delivery,
}

/// Result of a notification click
#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClickResponse {
    Focused { connection_id: String },
    Open { url: String },
}

impl From<ClickOutcome> for ClickResponse {
    fn from(outcome: ClickOutcome) -> Self {
        match outcome {
            ClickOutcome::Focused(connection_id) => ClickResponse::Focused { connection_id },
            ClickOutcome::OpenRequested(url) => ClickResponse::Open { url },
        }
    }
}

// ============================================
// SYNC DTOs
// ============================================

/// Background sync result
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub tag: String,
    pub outcome: AlertOutcome,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: healthy, degraded
    pub status: String,
    pub feeds: Vec<FeedHealth>,
    pub notifications: NotificationStatus,
    pub ws_connections: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
