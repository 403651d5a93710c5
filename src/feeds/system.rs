//! System info feed

use std::sync::Arc;

use crate::clock::Clock;
use crate::model::{RawSystemInfo, SystemInfo};
use crate::store::{Snapshot, StorePath, StoreResult};

use super::FeedSpec;

/// System document with liveness recomputed on every snapshot
pub struct SystemFeed {
    path: StorePath,
    clock: Arc<dyn Clock>,
    offline_after_secs: i64,
}

impl SystemFeed {
    pub fn new(path: impl Into<StorePath>, clock: Arc<dyn Clock>, offline_after_secs: i64) -> Self {
        Self {
            path: path.into(),
            clock,
            offline_after_secs,
        }
    }
}

impl FeedSpec for SystemFeed {
    type Output = SystemInfo;

    fn name(&self) -> &'static str {
        "system"
    }

    fn path(&self) -> StorePath {
        self.path.clone()
    }

    fn project(&self, snapshot: &Snapshot) -> StoreResult<Self::Output> {
        match snapshot.decode::<RawSystemInfo>()? {
            Some(raw) => Ok(SystemInfo::derive(
                &raw,
                self.clock.now_secs(),
                self.offline_after_secs,
            )),
            None => Ok(SystemInfo::offline()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::QuerySpec;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn project_at(value: serde_json::Value) -> SystemInfo {
        let feed = SystemFeed::new("system", Arc::new(ManualClock::at_secs(NOW)), 60);
        let snapshot = Snapshot::new(StorePath::new("system"), QuerySpec::all(), Some(value));
        feed.project(&snapshot).unwrap()
    }

    #[test]
    fn test_recent_update_is_online() {
        let info = project_at(json!({"online": true, "lastUpdate": NOW - 30, "expectedFlowRate": 5.0}));
        assert!(info.online);
        assert_eq!(info.expected_flow_rate, 5.0);
    }

    #[test]
    fn test_stale_update_is_offline() {
        let info = project_at(json!({"online": true, "lastUpdate": NOW - 90}));
        assert!(!info.online);
    }

    #[test]
    fn test_device_flag_still_required() {
        let info = project_at(json!({"online": false, "lastUpdate": NOW - 5}));
        assert!(!info.online);
    }

    #[test]
    fn test_absent_system_is_offline() {
        let feed = SystemFeed::new("system", Arc::new(ManualClock::at_secs(NOW)), 60);
        let snapshot = Snapshot::new(StorePath::new("system"), QuerySpec::all(), None);
        assert_eq!(feed.project(&snapshot).unwrap(), SystemInfo::offline());
    }
}
