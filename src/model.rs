//! Core data types for the water monitor
//!
//! These mirror the documents the sensor device and server-side rules write
//! into the realtime database:
//! - `Reading`: the current sensor snapshot (`readings/current`)
//! - `Alert`: an entry in the ordered `alerts` collection
//! - `SystemInfo`: device configuration and liveness (`system`)
//! - `LatestNotification`: the banner pointer (`notifications/latest`)
//! - `ChartPoint`: a projection of the recent reading history

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Status reported by the device alongside each reading
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    Normal,
    WaterQualityIssue,
    LeakageDetected,
    DropLeakageDetected,
}

impl DeviceStatus {
    /// Statuses that drive the reading-status notification trigger
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            DeviceStatus::LeakageDetected | DeviceStatus::WaterQualityIssue
        )
    }

    /// Human-readable label used by dashboards
    pub fn label(&self) -> &'static str {
        match self {
            DeviceStatus::Normal => "System Normal",
            DeviceStatus::WaterQualityIssue => "Water Quality Alert",
            DeviceStatus::LeakageDetected => "Leakage Detected",
            DeviceStatus::DropLeakageDetected => "Drop Leak Detected",
        }
    }
}

impl Default for DeviceStatus {
    fn default() -> Self {
        DeviceStatus::Normal
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeviceStatus::Normal => "NORMAL",
            DeviceStatus::WaterQualityIssue => "WATER_QUALITY_ISSUE",
            DeviceStatus::LeakageDetected => "LEAKAGE_DETECTED",
            DeviceStatus::DropLeakageDetected => "DROP_LEAKAGE_DETECTED",
        };
        f.write_str(name)
    }
}

/// The current sensor reading
///
/// Overwritten wholesale by the device on every push.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// Total dissolved solids in ppm
    #[serde(default)]
    pub tds: f64,
    /// Measured flow in L/min
    #[serde(default)]
    pub flow_rate: f64,
    /// Reference flow in L/min, mirrored from `system.expectedFlowRate`
    #[serde(default)]
    pub expected_flow: f64,
    /// Accumulated volume in litres
    #[serde(default)]
    pub total_volume: f64,
    /// Unix seconds
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: i64,
    #[serde(default)]
    pub status: DeviceStatus,
    /// Physical drop-leak switch
    #[serde(default)]
    pub drop_leakage: bool,
}

/// Alert document as stored under its push key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    #[serde(default)]
    pub message: String,
    /// Unix milliseconds
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_rate: Option<f64>,
}

/// An alert together with its store-assigned key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub message: String,
    /// Unix milliseconds
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_rate: Option<f64>,
}

impl Alert {
    pub fn from_record(id: impl Into<String>, record: AlertRecord) -> Self {
        Self {
            id: id.into(),
            message: record.message,
            timestamp: record.timestamp,
            tds: record.tds,
            flow_rate: record.flow_rate,
        }
    }
}

/// Timestamps written from JavaScript clients may be fractional; truncate
/// them. `null` reads as 0.
fn lenient_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(lenient_timestamp_opt(deserializer)?.unwrap_or(0))
}

fn lenient_timestamp_opt<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<i64>, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.map(|value| value.trunc() as i64))
}

/// Sort alerts most-recent first
pub fn sort_newest_first(alerts: &mut [Alert]) {
    alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

/// `system` document as written by the device and the settings panel
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawSystemInfo {
    #[serde(default)]
    pub expected_flow_rate: Option<f64>,
    /// Unix seconds
    #[serde(default, deserialize_with = "lenient_timestamp_opt")]
    pub last_update: Option<i64>,
    #[serde(default)]
    pub online: Option<bool>,
}

/// System info with liveness derived on the client
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub expected_flow_rate: f64,
    /// Unix seconds
    pub last_update: i64,
    pub online: bool,
}

impl SystemInfo {
    /// Derive liveness from the raw document.
    ///
    /// The device's own `online` flag only counts while `lastUpdate` is
    /// younger than `offline_after_secs`.
    pub fn derive(raw: &RawSystemInfo, now_secs: i64, offline_after_secs: i64) -> Self {
        let last_update = raw.last_update.unwrap_or(0);
        let age = now_secs - last_update;
        Self {
            expected_flow_rate: raw.expected_flow_rate.unwrap_or(0.0),
            last_update,
            online: age < offline_after_secs && raw.online.unwrap_or(false),
        }
    }

    /// Placeholder used when the `system` path does not exist
    pub fn offline() -> Self {
        Self::default()
    }
}

/// `notifications/latest` document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawNotification {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub unread: Option<bool>,
}

/// Latest-notification banner pointer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LatestNotification {
    pub latest: String,
    /// Unix milliseconds
    pub timestamp: i64,
    pub unread: bool,
}

impl LatestNotification {
    pub fn from_raw(raw: RawNotification, received_at_millis: i64) -> Self {
        Self {
            latest: raw.message.unwrap_or_default(),
            timestamp: raw.timestamp.unwrap_or(received_at_millis),
            unread: raw.unread.unwrap_or(false),
        }
    }
}

/// One entry of the `sensorData` history collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    /// Unix seconds
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: i64,
    #[serde(default)]
    pub tds: f64,
    #[serde(default)]
    pub flow_rate: f64,
}

/// A chart point derived from the history window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartPoint {
    /// Display label, `HH:MM` UTC
    pub time: String,
    pub value: f64,
    /// Unix seconds
    pub timestamp: i64,
}

impl ChartPoint {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self {
            time: format_clock_time(timestamp),
            value,
            timestamp,
        }
    }
}

fn format_clock_time(timestamp_secs: i64) -> String {
    Utc.timestamp_opt(timestamp_secs, 0)
        .single()
        .map(|dt| dt.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_deserialize_device_document() {
        let json = r#"{
            "tds": 320.5,
            "flowRate": 7.2,
            "expectedFlow": 7.5,
            "totalVolume": 1042.0,
            "timestamp": 1699000000,
            "status": "WATER_QUALITY_ISSUE",
            "dropLeakage": true
        }"#;
        let reading: Reading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.tds, 320.5);
        assert_eq!(reading.flow_rate, 7.2);
        assert_eq!(reading.status, DeviceStatus::WaterQualityIssue);
        assert!(reading.drop_leakage);
    }

    #[test]
    fn test_fractional_timestamps_truncate() {
        let record: AlertRecord =
            serde_json::from_str(r#"{"message": "Device rebooted", "timestamp": 1000.5}"#).unwrap();
        assert_eq!(record.timestamp, 1000);

        let raw: RawSystemInfo =
            serde_json::from_str(r#"{"lastUpdate": 1699000000.75, "online": true}"#).unwrap();
        assert_eq!(raw.last_update, Some(1_699_000_000));

        let raw: RawSystemInfo = serde_json::from_str(r#"{"lastUpdate": null}"#).unwrap();
        assert_eq!(raw.last_update, None);

        let record: AlertRecord = serde_json::from_str(r#"{"message": "x"}"#).unwrap();
        assert_eq!(record.timestamp, 0);
    }

    #[test]
    fn test_reading_missing_drop_flag_defaults_false() {
        let json = r#"{"tds": 100, "flowRate": 1, "expectedFlow": 1,
            "totalVolume": 0, "timestamp": 1, "status": "NORMAL"}"#;
        let reading: Reading = serde_json::from_str(json).unwrap();
        assert!(!reading.drop_leakage);
    }

    #[test]
    fn test_status_display_matches_wire_name() {
        let json = serde_json::to_string(&DeviceStatus::DropLeakageDetected).unwrap();
        assert_eq!(json, "\"DROP_LEAKAGE_DETECTED\"");
        assert_eq!(
            DeviceStatus::DropLeakageDetected.to_string(),
            "DROP_LEAKAGE_DETECTED"
        );
    }

    #[test]
    fn test_liveness_window() {
        let now = 1_700_000_000;
        let fresh = RawSystemInfo {
            expected_flow_rate: Some(7.5),
            last_update: Some(now - 30),
            online: Some(true),
        };
        assert!(SystemInfo::derive(&fresh, now, 60).online);

        let stale = RawSystemInfo {
            last_update: Some(now - 90),
            ..fresh.clone()
        };
        assert!(!SystemInfo::derive(&stale, now, 60).online);
    }

    #[test]
    fn test_liveness_requires_device_flag() {
        let now = 1_700_000_000;
        let raw = RawSystemInfo {
            expected_flow_rate: None,
            last_update: Some(now - 5),
            online: None,
        };
        let info = SystemInfo::derive(&raw, now, 60);
        assert!(!info.online);
        assert_eq!(info.expected_flow_rate, 0.0);
    }

    #[test]
    fn test_alerts_sorted_newest_first() {
        let mut alerts: Vec<Alert> = [("a", 100), ("b", 300), ("c", 200)]
            .into_iter()
            .map(|(id, ts)| Alert {
                id: id.to_string(),
                message: String::new(),
                timestamp: ts,
                tds: None,
                flow_rate: None,
            })
            .collect();
        sort_newest_first(&mut alerts);
        let order: Vec<i64> = alerts.iter().map(|a| a.timestamp).collect();
        assert_eq!(order, vec![300, 200, 100]);
    }

    #[test]
    fn test_notification_defaults() {
        let n = LatestNotification::from_raw(RawNotification::default(), 42);
        assert_eq!(n.latest, "");
        assert_eq!(n.timestamp, 42);
        assert!(!n.unread);
    }

    #[test]
    fn test_chart_point_time_label() {
        // 2023-11-03 08:26:40 UTC
        let point = ChartPoint::new(1699000000, 3.0);
        assert_eq!(point.time, "08:26");
    }
}
