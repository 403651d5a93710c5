//! Settings Routes
//!
//! - PUT /api/v1/settings - Write the expected flow rate

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::dto::SettingsRequest;
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::settings::SettingsUpdate;

/// PUT /api/v1/settings
///
/// Writes `expectedFlowRate` (rounded to two decimals) and a fresh
/// `lastUpdate` in one update.
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SettingsRequest>,
) -> ApiResult<Json<SettingsUpdate>> {
    let update = state.settings.set_expected_flow(req.expected_flow_rate).await?;
    Ok(Json(update))
}
