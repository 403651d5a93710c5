//! Alerts feed
//!
//! The store only orders ascending, so the most recent `limit` alerts are
//! fetched by timestamp and re-sorted newest first here.

use tracing::warn;

use crate::model::{sort_newest_first, Alert, AlertRecord};
use crate::store::{QuerySpec, Snapshot, StorePath, StoreResult};

use super::FeedSpec;

pub struct AlertsFeed {
    path: StorePath,
    limit: usize,
}

impl AlertsFeed {
    pub fn new(path: impl Into<StorePath>, limit: usize) -> Self {
        Self {
            path: path.into(),
            limit,
        }
    }

    /// Query used by both the feed and the alerting engine
    pub fn query_for(limit: usize) -> QuerySpec {
        QuerySpec::all()
            .order_by_child("timestamp")
            .limit_to_last(limit)
    }
}

/// Alerts in collection order (oldest first). Children that do not decode
/// are skipped so one bad entry cannot hide the ones after it.
pub fn alerts_in_collection_order(snapshot: &Snapshot) -> Vec<Alert> {
    snapshot
        .ordered_children()
        .into_iter()
        .filter_map(|(id, value)| {
            match serde_json::from_value::<AlertRecord>(value.clone()) {
                Ok(record) => Some(Alert::from_record(id, record)),
                Err(e) => {
                    warn!(alert_id = id, error = %e, "Skipping malformed alert");
                    None
                }
            }
        })
        .collect()
}

impl FeedSpec for AlertsFeed {
    type Output = Vec<Alert>;

    fn name(&self) -> &'static str {
        "alerts"
    }

    fn path(&self) -> StorePath {
        self.path.clone()
    }

    fn query(&self) -> QuerySpec {
        Self::query_for(self.limit)
    }

    fn project(&self, snapshot: &Snapshot) -> StoreResult<Self::Output> {
        let mut alerts = alerts_in_collection_order(snapshot);
        sort_newest_first(&mut alerts);
        Ok(alerts)
    }
}
