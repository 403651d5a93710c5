//! Current reading feed

use crate::model::Reading;
use crate::store::{Snapshot, StorePath, StoreResult};

use super::FeedSpec;

/// Single-document subscription to the device's current reading
pub struct ReadingFeed {
    path: StorePath,
}

impl ReadingFeed {
    pub fn new(path: impl Into<StorePath>) -> Self {
        Self { path: path.into() }
    }
}

impl FeedSpec for ReadingFeed {
    type Output = Option<Reading>;

    fn name(&self) -> &'static str {
        "reading"
    }

    fn path(&self) -> StorePath {
        self.path.clone()
    }

    fn project(&self, snapshot: &Snapshot) -> StoreResult<Self::Output> {
        snapshot.decode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeviceStatus;
    use crate::store::QuerySpec;
    use serde_json::json;

    fn snapshot(value: Option<serde_json::Value>) -> Snapshot {
        Snapshot::new(StorePath::new("readings/current"), QuerySpec::all(), value)
    }

    #[test]
    fn test_projects_reading() {
        let feed = ReadingFeed::new("readings/current");
        let reading = feed
            .project(&snapshot(Some(json!({
                "tds": 650.0,
                "flowRate": 4.0,
                "expectedFlow": 5.0,
                "status": "WATER_QUALITY_ISSUE",
                "timestamp": 1_700_000_000
            }))))
            .unwrap()
            .unwrap();
        assert_eq!(reading.status, DeviceStatus::WaterQualityIssue);
        assert_eq!(reading.expected_flow, 5.0);
    }

    #[test]
    fn test_absent_reading_is_none() {
        let feed = ReadingFeed::new("readings/current");
        assert_eq!(feed.project(&snapshot(None)).unwrap(), None);
    }

    #[test]
    fn test_wrong_shape_is_error() {
        let feed = ReadingFeed::new("readings/current");
        assert!(feed.project(&snapshot(Some(json!({"tds": "high"})))).is_err());
    }
}
