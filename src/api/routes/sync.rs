//! Sync Routes
//!
//! Deferred background sync, keyed by tag.
//!
//! - POST /api/v1/sync/:tag - Run the sync registered under `tag`

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::SyncResponse;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::monitor::SYNC_ALERTS_TAG;

/// POST /api/v1/sync/:tag
///
/// `sync-alerts` re-reads the alert collection once through the engine, so
/// an alert missed while disconnected is notified at most once.
pub async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    Path(tag): Path<String>,
) -> ApiResult<Json<SyncResponse>> {
    if tag != SYNC_ALERTS_TAG {
        return Err(ApiError::NotFound(format!("Unknown sync tag '{}'", tag)));
    }

    let outcome = state.session.resync_alerts().await?;
    tracing::info!(tag = %tag, ?outcome, "Background sync completed");

    Ok(Json(SyncResponse { tag, outcome }))
}
