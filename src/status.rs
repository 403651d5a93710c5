//! Derived status evaluation
//!
//! Pure functions mapping raw sensor values to semantic status buckets.
//! The device computes its own single-valued `status`; the evaluator derives
//! quality, flow and drop-leak independently, and [`HealthReport`] records
//! where the two sides disagree without picking a winner.

use serde::{Deserialize, Serialize};

use crate::model::{DeviceStatus, Reading};

/// Classification thresholds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Thresholds {
    /// Below this TDS (ppm) the water is "too low"
    #[serde(default = "default_tds_min")]
    pub tds_min: f64,
    /// Above this TDS (ppm) the water quality is poor
    #[serde(default = "default_tds_max")]
    pub tds_max: f64,
    /// Flow deviation (%) up to which flow is normal
    #[serde(default = "default_flow_normal_pct")]
    pub flow_normal_pct: f64,
    /// Flow deviation (%) up to which flow is a minor deviation
    #[serde(default = "default_flow_minor_pct")]
    pub flow_minor_pct: f64,
}

fn default_tds_min() -> f64 {
    50.0
}

fn default_tds_max() -> f64 {
    500.0
}

fn default_flow_normal_pct() -> f64 {
    10.0
}

fn default_flow_minor_pct() -> f64 {
    20.0
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            tds_min: default_tds_min(),
            tds_max: default_tds_max(),
            flow_normal_pct: default_flow_normal_pct(),
            flow_minor_pct: default_flow_minor_pct(),
        }
    }
}

/// Water quality bucket derived from TDS
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QualityStatus {
    TooLow,
    Good,
    Poor,
}

impl QualityStatus {
    pub fn label(&self) -> &'static str {
        match self {
            QualityStatus::TooLow => "Too Low",
            QualityStatus::Good => "Good Quality",
            QualityStatus::Poor => "Poor Quality",
        }
    }

    pub fn is_issue(&self) -> bool {
        !matches!(self, QualityStatus::Good)
    }
}

/// Flow bucket derived from actual vs. expected flow
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    /// No expected flow configured, deviation is undefined
    NoReference,
    Normal,
    MinorDeviation,
    PossibleLeak,
}

impl FlowStatus {
    pub fn label(&self) -> &'static str {
        match self {
            FlowStatus::NoReference => "No Reference",
            FlowStatus::Normal => "Normal Flow",
            FlowStatus::MinorDeviation => "Minor Deviation",
            FlowStatus::PossibleLeak => "Possible Leakage",
        }
    }

    pub fn is_leak(&self) -> bool {
        matches!(self, FlowStatus::PossibleLeak)
    }
}

/// Physical drop-leak switch state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DropLeakStatus {
    Detected,
    NotDetected,
}

impl DropLeakStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DropLeakStatus::Detected => "Drop Detected",
            DropLeakStatus::NotDetected => "No Drops",
        }
    }
}

impl Thresholds {
    pub fn classify_quality(&self, tds: f64) -> QualityStatus {
        if tds < self.tds_min {
            QualityStatus::TooLow
        } else if tds <= self.tds_max {
            QualityStatus::Good
        } else {
            QualityStatus::Poor
        }
    }

    pub fn classify_flow(&self, actual: f64, expected: f64) -> FlowStatus {
        match flow_deviation_pct(actual, expected) {
            None => FlowStatus::NoReference,
            Some(dev) if dev <= self.flow_normal_pct => FlowStatus::Normal,
            Some(dev) if dev <= self.flow_minor_pct => FlowStatus::MinorDeviation,
            Some(_) => FlowStatus::PossibleLeak,
        }
    }
}

/// Percentage deviation of `actual` from `expected`.
///
/// `None` when there is no reference flow (`expected == 0`).
pub fn flow_deviation_pct(actual: f64, expected: f64) -> Option<f64> {
    if expected == 0.0 {
        return None;
    }
    // Multiply before dividing so 11 vs 10 lands exactly on 10%.
    Some((actual - expected).abs() * 100.0 / expected)
}

pub fn classify_quality(tds: f64) -> QualityStatus {
    Thresholds::default().classify_quality(tds)
}

pub fn classify_flow(actual: f64, expected: f64) -> FlowStatus {
    Thresholds::default().classify_flow(actual, expected)
}

pub fn classify_drop_leak(detected: bool) -> DropLeakStatus {
    if detected {
        DropLeakStatus::Detected
    } else {
        DropLeakStatus::NotDetected
    }
}

/// Independent condition that both the device and the client can flag
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Quality,
    Flow,
    DropLeak,
}

/// Which side flagged a condition the other side did not
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlaggedBy {
    Device,
    Client,
}

/// A disagreement between device status and client derivation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Divergence {
    pub condition: Condition,
    pub flagged_by: FlaggedBy,
}

/// Full derived view of one reading
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub quality: QualityStatus,
    pub flow: FlowStatus,
    /// `None` when there is no reference flow
    pub flow_deviation_pct: Option<f64>,
    pub drop_leak: DropLeakStatus,
    pub device_status: DeviceStatus,
    #[serde(default)]
    pub divergences: Vec<Divergence>,
}

impl HealthReport {
    pub fn is_divergent(&self) -> bool {
        !self.divergences.is_empty()
    }
}

/// Evaluate a reading and compare against the device's own status.
///
/// A `NoReference` or `MinorDeviation` flow is not a leak for either side,
/// and `TooLow` quality counts as an issue.
pub fn evaluate(reading: &Reading, thresholds: &Thresholds) -> HealthReport {
    let quality = thresholds.classify_quality(reading.tds);
    let flow = thresholds.classify_flow(reading.flow_rate, reading.expected_flow);
    let drop_leak = classify_drop_leak(reading.drop_leakage);

    let client = [
        (Condition::Quality, quality.is_issue()),
        (Condition::Flow, flow.is_leak()),
        (Condition::DropLeak, drop_leak == DropLeakStatus::Detected),
    ];

    let divergences = client
        .into_iter()
        .filter_map(|(condition, by_client)| {
            let by_device = device_flags(reading.status, condition);
            match (by_device, by_client) {
                (true, false) => Some(Divergence {
                    condition,
                    flagged_by: FlaggedBy::Device,
                }),
                (false, true) => Some(Divergence {
                    condition,
                    flagged_by: FlaggedBy::Client,
                }),
                _ => None,
            }
        })
        .collect();

    HealthReport {
        quality,
        flow,
        flow_deviation_pct: flow_deviation_pct(reading.flow_rate, reading.expected_flow),
        drop_leak,
        device_status: reading.status,
        divergences,
    }
}

fn device_flags(status: DeviceStatus, condition: Condition) -> bool {
    matches!(
        (status, condition),
        (DeviceStatus::WaterQualityIssue, Condition::Quality)
            | (DeviceStatus::LeakageDetected, Condition::Flow)
            | (DeviceStatus::DropLeakageDetected, Condition::DropLeak)
    )
}
