//! Latest-notification feed

use std::sync::Arc;

use crate::clock::Clock;
use crate::model::{LatestNotification, RawNotification};
use crate::store::{Snapshot, StorePath, StoreResult};

use super::FeedSpec;

pub struct NotificationFeed {
    path: StorePath,
    clock: Arc<dyn Clock>,
}

impl NotificationFeed {
    pub fn new(path: impl Into<StorePath>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
        }
    }
}

impl FeedSpec for NotificationFeed {
    type Output = Option<LatestNotification>;

    fn name(&self) -> &'static str {
        "notification"
    }

    fn path(&self) -> StorePath {
        self.path.clone()
    }

    fn project(&self, snapshot: &Snapshot) -> StoreResult<Self::Output> {
        Ok(snapshot
            .decode::<RawNotification>()?
            .map(|raw| LatestNotification::from_raw(raw, self.clock.now_millis())))
    }
}
