//! Reading history feed
//!
//! Projects the bounded `sensorData` window into two chart series (TDS and
//! flow), oldest point first.

use serde::Serialize;

use crate::model::{ChartPoint, HistoryRecord};
use crate::store::{QuerySpec, Snapshot, StorePath, StoreResult};

use super::FeedSpec;

/// Points averaged on each side when computing a trend
const TREND_WINDOW: usize = 5;

/// Relative change below which a series counts as stable
const STABLE_PCT: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trend {
    pub direction: TrendDirection,
    /// Absolute change in percent, 0 when stable
    pub percentage: f64,
}

impl Trend {
    fn stable() -> Self {
        Self {
            direction: TrendDirection::Stable,
            percentage: 0.0,
        }
    }
}

/// One chart series
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartSeries {
    pub points: Vec<ChartPoint>,
}

impl ChartSeries {
    pub fn new(mut points: Vec<ChartPoint>) -> Self {
        points.sort_by_key(|p| p.timestamp);
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<&ChartPoint> {
        self.points.last()
    }

    /// Y-axis bounds: 10% padding (at least 1), never below zero
    pub fn bounds(&self) -> (f64, f64) {
        if self.points.is_empty() {
            return (0.0, 10.0);
        }
        let min = self.points.iter().map(|p| p.value).fold(f64::INFINITY, f64::min);
        let max = self
            .points
            .iter()
            .map(|p| p.value)
            .fold(f64::NEG_INFINITY, f64::max);

        let padding = (max - min) * 0.1;
        let padding = if padding == 0.0 { 1.0 } else { padding };
        ((min - padding).max(0.0), max + padding)
    }

    /// Compare the older and newer halves of the last few points
    pub fn trend(&self) -> Trend {
        if self.points.len() < 2 {
            return Trend::stable();
        }

        let recent = &self.points[self.points.len().saturating_sub(TREND_WINDOW)..];
        let half = recent.len().div_ceil(2);
        let first: f64 = recent[..half].iter().map(|p| p.value).sum::<f64>() / half as f64;
        let last: f64 =
            recent[recent.len() / 2..].iter().map(|p| p.value).sum::<f64>() / half as f64;

        if first == 0.0 {
            return Trend::stable();
        }

        let diff = (last - first) / first * 100.0;
        if diff.abs() < STABLE_PCT {
            return Trend::stable();
        }

        Trend {
            direction: if diff > 0.0 {
                TrendDirection::Up
            } else {
                TrendDirection::Down
            },
            percentage: diff.abs(),
        }
    }
}

/// Both chart series derived from one history snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadingHistory {
    pub tds: ChartSeries,
    pub flow: ChartSeries,
}

impl ReadingHistory {
    pub fn from_records(records: &[HistoryRecord]) -> Self {
        Self {
            tds: ChartSeries::new(
                records
                    .iter()
                    .map(|r| ChartPoint::new(r.timestamp, r.tds))
                    .collect(),
            ),
            flow: ChartSeries::new(
                records
                    .iter()
                    .map(|r| ChartPoint::new(r.timestamp, r.flow_rate))
                    .collect(),
            ),
        }
    }
}

pub struct HistoryFeed {
    path: StorePath,
    limit: usize,
}

impl HistoryFeed {
    pub fn new(path: impl Into<StorePath>, limit: usize) -> Self {
        Self {
            path: path.into(),
            limit,
        }
    }
}

impl FeedSpec for HistoryFeed {
    type Output = ReadingHistory;

    fn name(&self) -> &'static str {
        "history"
    }

    fn path(&self) -> StorePath {
        self.path.clone()
    }

    fn query(&self) -> QuerySpec {
        QuerySpec::all()
            .order_by_child("timestamp")
            .limit_to_last(self.limit)
    }

    fn project(&self, snapshot: &Snapshot) -> StoreResult<Self::Output> {
        let records: Vec<HistoryRecord> = snapshot
            .decode_children::<HistoryRecord>()?
            .into_iter()
            .map(|(_, record)| record)
            .collect();
        Ok(ReadingHistory::from_records(&records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn series(values: &[f64]) -> ChartSeries {
        ChartSeries::new(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| ChartPoint::new(1_700_000_000 + i as i64 * 60, *v))
                .collect(),
        )
    }

    #[test]
    fn test_projects_sorted_series() {
        let feed = HistoryFeed::new("sensorData", 20);
        let snapshot = Snapshot::new(
            StorePath::new("sensorData"),
            feed.query(),
            Some(json!({
                "b": {"timestamp": 1_700_000_120, "tds": 310.0, "flowRate": 5.5},
                "a": {"timestamp": 1_700_000_000, "tds": 300.0, "flowRate": 5.0},
            })),
        );
        let history = feed.project(&snapshot).unwrap();
        assert_eq!(history.tds.points.len(), 2);
        assert_eq!(history.tds.points[0].value, 300.0);
        assert_eq!(history.flow.points[1].value, 5.5);
        assert_eq!(history.tds.points[0].time, "22:13");
    }

    #[test]
    fn test_empty_history() {
        let feed = HistoryFeed::new("sensorData", 20);
        let snapshot = Snapshot::new(StorePath::new("sensorData"), feed.query(), None);
        let history = feed.project(&snapshot).unwrap();
        assert!(history.tds.is_empty());
        assert_eq!(history.flow.bounds(), (0.0, 10.0));
    }

    #[test]
    fn test_bounds_padding() {
        assert_eq!(series(&[10.0, 20.0]).bounds(), (9.0, 21.0));
        // Flat series pads by one.
        assert_eq!(series(&[5.0, 5.0]).bounds(), (4.0, 6.0));
        // Never below zero.
        assert_eq!(series(&[0.5, 0.5]).bounds(), (0.0, 1.5));
    }

    #[test]
    fn test_trend_directions() {
        assert_eq!(series(&[10.0]).trend().direction, TrendDirection::Stable);
        assert_eq!(
            series(&[10.0, 10.0, 10.0, 12.0, 14.0]).trend().direction,
            TrendDirection::Up
        );
        assert_eq!(
            series(&[14.0, 12.0, 10.0, 10.0, 10.0]).trend().direction,
            TrendDirection::Down
        );
        assert_eq!(series(&[100.0, 100.0, 101.0]).trend(), Trend::stable());
    }

    #[test]
    fn test_trend_uses_last_five_points() {
        let trend = series(&[1.0, 1.0, 1.0, 10.0, 10.0, 10.0, 10.0, 10.0]).trend();
        assert_eq!(trend.direction, TrendDirection::Stable);
    }
}
